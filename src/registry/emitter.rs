//! Rendering of the generated registry file.
//!
//! The layout lives in `templates/generated.nix.tera` and is compiled into
//! the binary. Entries are listed case-insensitively by display name so the
//! file is stable across runs.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use tera::{Context as TeraContext, Tera};

use crate::constants::{DEFAULT_BUILDER, DEFAULT_HEADER, GITHUB_BASE_URL};
use crate::core::PlugregError;
use crate::orchestrator::{FetchedPlugin, sort_plugins};
use crate::utils::fs::safe_write;

const TEMPLATE_NAME: &str = "generated.nix";
const TEMPLATE: &str = include_str!("../../templates/generated.nix.tera");

/// One entry as the template sees it.
#[derive(Debug, Serialize)]
struct RegistryEntry {
    name: String,
    version: String,
    owner: String,
    repo: String,
    rev: String,
    sha256: String,
    fetch_submodules: bool,
    homepage: String,
}

impl RegistryEntry {
    fn from_plugin(plugin: &FetchedPlugin, base_url: &str) -> Result<Self> {
        let spec = &plugin.spec;
        let artifact = &plugin.artifact;
        Ok(Self {
            name: artifact.normalized_name(),
            version: artifact.version()?,
            owner: spec.owner.clone(),
            repo: spec.repo.clone(),
            rev: artifact.revision_id.clone(),
            sha256: artifact.checksum.clone(),
            fetch_submodules: artifact.has_submodules,
            homepage: format!("{}/{}/{}/", base_url, spec.owner, spec.repo),
        })
    }
}

/// Renders and writes the registry file.
pub struct RegistryEmitter {
    tera: Tera,
    builder: String,
    header: String,
    base_url: String,
}

impl RegistryEmitter {
    /// `builder` is the function every entry is built with, `header` the
    /// comment line at the top of the file.
    pub fn new(builder: impl Into<String>, header: impl Into<String>) -> Result<Self, PlugregError> {
        let mut tera = Tera::default();
        tera.add_raw_template(TEMPLATE_NAME, TEMPLATE).map_err(|e| PlugregError::TemplateError {
            reason: e.to_string(),
        })?;
        Ok(Self {
            tera,
            builder: builder.into(),
            header: header.into(),
            base_url: GITHUB_BASE_URL.to_string(),
        })
    }

    /// Host the homepage links point at.
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Emitter producing the stock vim plugin registry.
    pub fn vim_plugins() -> Result<Self, PlugregError> {
        Self::new(DEFAULT_BUILDER, DEFAULT_HEADER)
    }

    /// Render the registry for `plugins` in listing order.
    pub fn render(&self, plugins: &[FetchedPlugin]) -> Result<String> {
        let mut sorted = plugins.to_vec();
        sort_plugins(&mut sorted);

        let entries = sorted
            .iter()
            .map(|plugin| RegistryEntry::from_plugin(plugin, &self.base_url))
            .collect::<Result<Vec<_>>>()?;

        let mut context = TeraContext::new();
        context.insert("header", &self.header);
        context.insert("builder", &self.builder);
        context.insert("plugins", &entries);

        let rendered = self.tera.render(TEMPLATE_NAME, &context).map_err(|e| PlugregError::TemplateError {
            reason: format!("{e:?}"),
        })?;
        Ok(rendered)
    }

    /// Render and replace `out` atomically.
    pub fn write(&self, plugins: &[FetchedPlugin], out: &Path) -> Result<()> {
        let rendered = self.render(plugins)?;
        safe_write(out, &rendered).with_context(|| format!("Failed to write registry {}", out.display()))?;
        tracing::info!("updated {}", out.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Artifact;
    use crate::spec::PluginSpec;
    use chrono::{TimeZone, Utc};

    fn plugin(line: &str, rev: &str, submodules: bool) -> FetchedPlugin {
        let spec = PluginSpec::parse(line).unwrap();
        FetchedPlugin {
            artifact: Artifact {
                revision_id: rev.to_string(),
                has_submodules: submodules,
                display_name: spec.display_name().to_string(),
                checksum: format!("sha-{rev}"),
                timestamp: Some(Utc.with_ymd_and_hms(2021, 2, 3, 4, 5, 6).unwrap()),
            },
            spec,
            redirect: None,
        }
    }

    #[test]
    fn test_render_exact_layout() {
        let emitter = RegistryEmitter::vim_plugins().unwrap();
        let rendered = emitter.render(&[plugin("tpope/vim-fugitive", "abc", false)]).unwrap();

        let expected = r#"# This file has been generated by ./pkgs/misc/vim-plugins/update.py. Do not edit!
{ lib, buildVimPluginFrom2Nix, fetchFromGitHub, overrides ? (final: prev: {}) }:
let
  packages = ( final:
{
  vim-fugitive = buildVimPluginFrom2Nix {
    pname = "vim-fugitive";
    version = "2021-02-03";
    src = fetchFromGitHub {
      owner = "tpope";
      repo = "vim-fugitive";
      rev = "abc";
      sha256 = "sha-abc";
    };
    meta.homepage = "https://github.com/tpope/vim-fugitive/";
  };

});
in lib.fix' (lib.extends overrides packages)
"#;
        assert_eq!(rendered, expected);
    }

    #[test]
    fn test_entries_sorted_and_submodules_flagged() {
        let emitter = RegistryEmitter::vim_plugins().unwrap();
        let rendered = emitter
            .render(&[
                plugin("b/zeta", "1", false),
                plugin("a/Beta.nvim", "2", true),
                plugin("c/alpha", "3", false),
            ])
            .unwrap();

        let alpha = rendered.find("  alpha = ").unwrap();
        let beta = rendered.find("  Beta-nvim = ").unwrap();
        let zeta = rendered.find("  zeta = ").unwrap();
        assert!(alpha < beta && beta < zeta);

        assert!(rendered.contains("sha256 = \"sha-2\";\n      fetchSubmodules = true;\n    };"));
        assert_eq!(rendered.matches("fetchSubmodules").count(), 1);
        assert!(rendered.contains("  };\n\n  Beta-nvim = "));
    }

    #[test]
    fn test_custom_builder_and_header() {
        let emitter = RegistryEmitter::new("buildKakounePlugin", "# generated").unwrap();
        let rendered = emitter.render(&[plugin("a/b", "1", false)]).unwrap();
        assert!(rendered.starts_with("# generated\n{ lib, buildKakounePlugin, fetchFromGitHub"));
        assert!(rendered.contains("  b = buildKakounePlugin {"));
    }

    #[test]
    fn test_homepage_follows_base_url() {
        let emitter = RegistryEmitter::vim_plugins().unwrap().with_base_url("https://git.example.org/");
        let rendered = emitter.render(&[plugin("tpope/vim-fugitive", "1", false)]).unwrap();
        assert!(rendered.contains("meta.homepage = \"https://git.example.org/tpope/vim-fugitive/\";"));
        assert!(!rendered.contains("github.com"));
    }

    #[test]
    fn test_missing_date_fails_render() {
        let mut entry = plugin("a/b", "1", false);
        entry.artifact.timestamp = None;
        assert!(RegistryEmitter::vim_plugins().unwrap().render(&[entry]).is_err());
    }

    #[test]
    fn test_write_replaces_file() {
        let temp = tempfile::tempdir().unwrap();
        let out = temp.path().join("generated.nix");
        std::fs::write(&out, "old").unwrap();

        RegistryEmitter::vim_plugins().unwrap().write(&[plugin("a/b", "1", false)], &out).unwrap();
        let content = std::fs::read_to_string(&out).unwrap();
        assert!(content.contains("rev = \"1\";"));
        assert!(!temp.path().join("generated.tmp").exists());
    }
}
