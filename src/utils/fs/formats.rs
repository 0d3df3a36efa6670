//! Reading and writing text and JSON files.
//!
//! JSON is written the way the ledger and cache files have always looked:
//! keys in sorted order (callers pass `BTreeMap`s) and a four-space indent,
//! so regenerated files produce minimal diffs.

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::ser::{PrettyFormatter, Serializer};
use std::fs;
use std::path::Path;

/// Overwrite `path` with `content`, creating parent directories.
pub fn write_text_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    fs::write(path, content).with_context(|| format!("Failed to write file: {}", path.display()))
}

/// Serialize `data` as pretty JSON with a four-space indent.
pub fn to_json_string<T: Serialize + ?Sized>(data: &T) -> Result<String> {
    let mut buffer = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut serializer = Serializer::with_formatter(&mut buffer, formatter);
    data.serialize(&mut serializer).context("Failed to serialize JSON")?;
    String::from_utf8(buffer).context("Serialized JSON is not valid UTF-8")
}

/// Write `data` as pretty JSON, overwriting the file.
pub fn write_json_file<T: Serialize + ?Sized>(path: &Path, data: &T) -> Result<()> {
    let json = to_json_string(data)?;
    write_text_file(path, &json)
        .with_context(|| format!("Failed to write JSON file: {}", path.display()))
}

/// Read and deserialize a JSON file.
pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read JSON file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse JSON file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_json_uses_four_space_indent_and_sorted_keys() {
        let mut data = BTreeMap::new();
        data.insert("zeta", 1);
        data.insert("alpha", 2);

        let json = to_json_string(&data).unwrap();
        assert_eq!(json, "{\n    \"alpha\": 2,\n    \"zeta\": 1\n}");
    }

    #[test]
    fn test_json_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deprecated.json");

        let mut data = BTreeMap::new();
        data.insert("old".to_string(), "new".to_string());
        write_json_file(&path, &data).unwrap();

        let back: BTreeMap<String, String> = read_json_file(&path).unwrap();
        assert_eq!(back, data);
    }
}
