//! Plugin list rewriting and the deprecation ledger.
//!
//! After every update the plugin list is written back sorted
//! case-insensitively, with lines for moved repositories replaced by their
//! new location. When a move also changes the published attribute name, the
//! old name is recorded in the deprecation ledger so users of the old name
//! can be warned.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::constants::VERSION_DATE_FORMAT;
use crate::github::RedirectMap;
use crate::spec::PluginSpec;
use crate::utils::fs::{read_json_file, safe_write, write_json_file};

/// Replacement recorded for a retired attribute name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeprecationEntry {
    /// Day the rename was noticed, `YYYY-MM-DD`
    pub date: String,
    /// Attribute name to use instead
    pub new: String,
}

/// Old attribute name → replacement, kept sorted on disk.
pub type DeprecationLedger = BTreeMap<String, DeprecationEntry>;

/// Apply `redirects` and `append` to the plugin list at `input` and write
/// it back sorted. Renames are recorded in the ledger at `ledger_path`.
pub fn rewrite_input(
    input: &Path,
    redirects: &RedirectMap,
    append: &[String],
    ledger_path: &Path,
    today: NaiveDate,
) -> Result<()> {
    let content = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read plugin list {}", input.display()))?;

    let lines = rewrite_lines(&content, redirects, append);
    let mut output = lines.join("\n");
    output.push('\n');
    safe_write(input, &output)?;
    tracing::debug!("Rewrote {} with {} entries", input.display(), lines.len());

    if !redirects.is_empty() {
        record_deprecations(ledger_path, redirects, today)?;
    }
    Ok(())
}

/// The list as it should be written: trimmed, blank lines dropped,
/// redirected lines replaced, sorted case-insensitively.
///
/// Lines are matched on their canonical form, so `owner/repo@master` is
/// still found by a redirect keyed `owner/repo`.
pub fn rewrite_lines(content: &str, redirects: &RedirectMap, append: &[String]) -> Vec<String> {
    let mut lines: Vec<String> = content
        .lines()
        .chain(append.iter().map(String::as_str))
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            PluginSpec::parse(line)
                .ok()
                .and_then(|spec| redirects.get(&spec.to_string()))
                .cloned()
                .unwrap_or_else(|| line.to_string())
        })
        .collect();

    lines.sort_by_cached_key(|line| line.to_lowercase());
    lines
}

/// Add an entry for every redirect whose attribute name changed.
///
/// Both names derive from the alias or repository name alone, so they are
/// computed from the lines without contacting the repositories.
pub fn record_deprecations(ledger_path: &Path, redirects: &RedirectMap, today: NaiveDate) -> Result<()> {
    let mut ledger = load_ledger(ledger_path)?;
    let date = today.format(VERSION_DATE_FORMAT).to_string();
    let mut added = 0usize;

    for (old_line, new_line) in redirects {
        let old = PluginSpec::parse(old_line)
            .with_context(|| format!("Invalid redirect source '{old_line}'"))?;
        let new = PluginSpec::parse(new_line)
            .with_context(|| format!("Invalid redirect target '{new_line}'"))?;

        let (old_name, new_name) = (old.normalized_name(), new.normalized_name());
        if old_name != new_name {
            tracing::info!("Deprecating {} in favour of {}", old_name, new_name);
            ledger.insert(
                old_name,
                DeprecationEntry {
                    date: date.clone(),
                    new: new_name,
                },
            );
            added += 1;
        }
    }

    if added > 0 {
        write_json_file(ledger_path, &ledger)?;
    }
    Ok(())
}

/// Read the ledger; a missing file is an empty ledger.
pub fn load_ledger(path: &Path) -> Result<DeprecationLedger> {
    if !path.exists() {
        return Ok(DeprecationLedger::new());
    }
    read_json_file(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 7, 14).unwrap()
    }

    fn redirects(pairs: &[(&str, &str)]) -> RedirectMap {
        pairs.iter().map(|(a, b)| (a.to_string(), b.to_string())).collect()
    }

    #[test]
    fn test_sorts_case_insensitively() {
        let lines = rewrite_lines("zz/last\nAa/First\nbb/middle\n", &RedirectMap::new(), &[]);
        assert_eq!(lines, vec!["Aa/First", "bb/middle", "zz/last"]);
    }

    #[test]
    fn test_sorted_list_is_unchanged() {
        let content = "Aa/First\nbb/middle@dev as m\nzz/last\n";
        let lines = rewrite_lines(content, &RedirectMap::new(), &[]);
        assert_eq!(lines.join("\n") + "\n", content);
    }

    #[test]
    fn test_redirect_matches_canonical_form_and_keeps_alias() {
        let map = redirects(&[("old/name as n", "new/name as n"), ("x/y", "z/y")]);
        let lines = rewrite_lines("old/name@master   as n\nx/y\nkeep/me\n", &map, &[]);
        assert_eq!(lines, vec!["keep/me", "new/name as n", "z/y"]);
    }

    #[test]
    fn test_append_is_sorted_in() {
        let lines = rewrite_lines("a/a\nc/c\n", &RedirectMap::new(), &["b/b".to_string()]);
        assert_eq!(lines, vec!["a/a", "b/b", "c/c"]);
    }

    #[test]
    fn test_rewrite_input_without_redirects_leaves_ledger_alone() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("vim-plugin-names");
        let ledger = temp.path().join("deprecated.json");
        std::fs::write(&input, "b/b\n\nA/a\n").unwrap();

        rewrite_input(&input, &RedirectMap::new(), &[], &ledger, today()).unwrap();

        assert_eq!(std::fs::read_to_string(&input).unwrap(), "A/a\nb/b\n");
        assert!(!ledger.exists());
    }

    #[test]
    fn test_renames_are_recorded_in_ledger() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("vim-plugin-names");
        let ledger = temp.path().join("deprecated.json");
        std::fs::write(&input, "old/plugin.vim\nsame/name\n").unwrap();
        std::fs::write(&ledger, r#"{"gone": {"new": "here", "date": "2020-01-01"}}"#).unwrap();

        let map = redirects(&[("old/plugin.vim", "new/plugin-nvim"), ("same/name", "moved/name")]);
        rewrite_input(&input, &map, &[], &ledger, today()).unwrap();

        assert_eq!(std::fs::read_to_string(&input).unwrap(), "moved/name\nnew/plugin-nvim\n");

        let recorded = load_ledger(&ledger).unwrap();
        assert_eq!(recorded.len(), 2);
        assert_eq!(
            recorded.get("plugin-vim"),
            Some(&DeprecationEntry {
                date: "2021-07-14".to_string(),
                new: "plugin-nvim".to_string(),
            })
        );
        assert!(recorded.contains_key("gone"));

        let raw = std::fs::read_to_string(&ledger).unwrap();
        assert!(raw.starts_with("{\n    \"gone\": {\n        \"date\": \"2020-01-01\""));
    }

    #[test]
    fn test_alias_keeps_name_stable() {
        let temp = TempDir::new().unwrap();
        let ledger = temp.path().join("deprecated.json");
        let map = redirects(&[("old/repo as keep", "new/other as keep")]);

        record_deprecations(&ledger, &map, today()).unwrap();
        assert!(!ledger.exists());
    }
}
