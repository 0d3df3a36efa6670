//! Reading the registry that is currently checked in.
//!
//! Every entry of the existing generated file already carries a revision and
//! checksum, so evaluating it seeds the artifact cache and an update only
//! downloads what actually moved. Evaluation goes through `nix eval` in an
//! isolated environment: `<localpkgs>` points at the nixpkgs checkout and
//! the user's nixpkgs config is replaced by an empty one.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::models::Artifact;
use crate::utils::command::ToolCommand;

/// Environment overrides for one `nix eval` child process.
///
/// The empty config file lives as long as this value and is deleted when it
/// is dropped, whichever way the evaluation ends.
pub struct NixEvalEnv {
    nix_path: String,
    empty_config: NamedTempFile,
}

impl NixEvalEnv {
    /// Environment resolving `<localpkgs>` to `nixpkgs_root`.
    pub fn new(nixpkgs_root: &Path) -> Result<Self> {
        let mut empty_config = NamedTempFile::new().context("Failed to create empty nixpkgs config")?;
        empty_config.write_all(b"{}").context("Failed to write empty nixpkgs config")?;
        empty_config.flush().context("Failed to write empty nixpkgs config")?;

        Ok(Self {
            nix_path: format!("localpkgs={}", nixpkgs_root.display()),
            empty_config,
        })
    }

    /// Path of the temporary `{}` config.
    pub fn config_path(&self) -> &Path {
        self.empty_config.path()
    }

    /// Apply the overrides to `command`; the parent environment is left
    /// untouched.
    pub fn apply(&self, command: ToolCommand) -> ToolCommand {
        command
            .env("NIX_PATH", &self.nix_path)
            .env("NIXPKGS_CONFIG", self.config_path().display().to_string())
    }
}

/// Nix expression listing `{rev, sha256, submodules}` for every entry of
/// `generated` that has a fixed-output source.
pub fn current_plugins_expr(generated: &Path, builder: &str) -> String {
    format!(
        r#"(with import <localpkgs> {{}};
let
  inherit (vimUtils.override {{inherit vim;}}) {builder};
  generated = callPackage {generated} {{
    inherit {builder};
  }};
  hasChecksum = value: lib.isAttrs value && lib.hasAttrByPath ["src" "outputHash"] value;
  getChecksum = name: value:
    if hasChecksum value then {{
      submodules = value.src.fetchSubmodules or false;
      sha256 = value.src.outputHash;
      rev = value.src.rev;
    }} else null;
  checksums = lib.mapAttrs getChecksum generated;
in lib.filterAttrs (n: v: v != null) checksums)"#,
        generated = generated.display(),
        builder = builder,
    )
}

#[derive(Debug, Deserialize)]
struct CurrentEntry {
    rev: String,
    sha256: String,
    #[serde(default)]
    submodules: bool,
}

/// Turn the JSON printed by `nix eval` into artifacts named after their
/// attribute.
pub fn parse_current_plugins(json: &str) -> Result<Vec<Artifact>> {
    let entries: BTreeMap<String, CurrentEntry> =
        serde_json::from_str(json).context("Failed to parse current plugin checksums")?;

    Ok(entries
        .into_iter()
        .map(|(name, entry)| Artifact {
            revision_id: entry.rev,
            has_submodules: entry.submodules,
            display_name: name,
            checksum: entry.sha256,
            timestamp: None,
        })
        .collect())
}

/// Where and how to evaluate the current registry.
#[derive(Debug, Clone)]
pub struct LiveRegistry {
    /// nixpkgs checkout `<localpkgs>` resolves to
    pub nixpkgs_root: PathBuf,
    /// Generated file to evaluate
    pub generated: PathBuf,
    /// Builder function the file expects
    pub builder: String,
}

impl LiveRegistry {
    /// Evaluate the generated file and return its entries.
    pub async fn fetch(&self) -> Result<Vec<Artifact>> {
        let generated = std::fs::canonicalize(&self.generated)
            .with_context(|| format!("Registry {} not found", self.generated.display()))?;
        let env = NixEvalEnv::new(&self.nixpkgs_root)?;
        let expr = current_plugins_expr(&generated, &self.builder);

        let stdout = env
            .apply(ToolCommand::new("nix"))
            .args(["eval", "--impure", "--json", "--expr", expr.as_str()])
            .with_context("live registry")
            .execute_stdout()
            .await
            .context("Failed to evaluate the current registry")?;

        let plugins = parse_current_plugins(&stdout)?;
        tracing::debug!(target: "cache", "Live registry lists {} plugins", plugins.len());
        Ok(plugins)
    }

    /// [`fetch`](Self::fetch), degrading to an empty seed with a warning.
    pub async fn seed(&self) -> Vec<Artifact> {
        match self.fetch().await {
            Ok(plugins) => plugins,
            Err(e) => {
                tracing::warn!("Could not read the current registry, starting from the cache file only: {:#}", e);
                Vec::new()
            }
        }
    }
}
