//! Checksum fetcher.
//!
//! Downloads a plugin revision through the nix prefetch tools and reports the
//! content checksum of the fetched tree:
//!
//! - revisions with submodules are cloned with `nix-prefetch-git
//!   --fetch-submodules`, which prints a JSON document carrying `sha256`
//! - everything else is fetched as a tarball with `nix-prefetch-url
//!   --unpack`, which prints the bare checksum
//!
//! Subprocesses run without a timeout; a stuck prefetch holds its worker.

use anyhow::Result;
use serde::Deserialize;
use std::future::Future;
use thiserror::Error;

use crate::constants::GITHUB_BASE_URL;
use crate::spec::PluginSpec;
use crate::utils::command::{CommandError, ToolCommand};

const PREFETCH_GIT: &str = "nix-prefetch-git";
const PREFETCH_URL: &str = "nix-prefetch-url";

/// Per-plugin prefetch failures.
#[derive(Error, Debug)]
pub enum PrefetchError {
    /// The prefetch tool is missing or could not be started.
    #[error("Could not start {tool}")]
    Spawn {
        /// Tool name
        tool: String,
        #[source]
        source: CommandError,
    },

    /// The tool ran and failed.
    #[error("{tool} failed for {repo}")]
    CommandFailed {
        /// Tool name
        tool: String,
        /// `owner/repo`
        repo: String,
        #[source]
        source: CommandError,
    },

    /// The tool succeeded but its output carries no checksum.
    #[error("{tool} returned no usable checksum for {repo}: {reason}")]
    InvalidOutput {
        /// Tool name
        tool: String,
        /// `owner/repo`
        repo: String,
        /// What was wrong with the output
        reason: String,
    },
}

impl PrefetchError {
    fn from_command(tool: &str, repo: &str, source: CommandError) -> Self {
        match source {
            CommandError::NotFound { .. } | CommandError::Spawn { .. } => Self::Spawn {
                tool: tool.to_string(),
                source,
            },
            CommandError::Failed { .. } | CommandError::TimedOut { .. } => Self::CommandFailed {
                tool: tool.to_string(),
                repo: repo.to_string(),
                source,
            },
        }
    }
}

/// Computes the content checksum of a plugin revision.
pub trait ChecksumFetcher: Send + Sync + 'static {
    /// Checksum of `revision_id`, fetched with submodules when asked.
    fn fetch_checksum(
        &self,
        spec: &PluginSpec,
        revision_id: &str,
        has_submodules: bool,
    ) -> impl Future<Output = Result<String>> + Send;
}

/// `nix-prefetch-git --fetch-submodules` output; other fields are ignored.
#[derive(Debug, Deserialize)]
struct PrefetchGitOutput {
    sha256: Option<String>,
}

/// Extract the checksum from `nix-prefetch-git` JSON output.
pub fn parse_prefetch_git_output(repo: &str, stdout: &str) -> Result<String, PrefetchError> {
    let invalid = |reason: String| PrefetchError::InvalidOutput {
        tool: PREFETCH_GIT.to_string(),
        repo: repo.to_string(),
        reason,
    };

    let parsed: PrefetchGitOutput =
        serde_json::from_str(stdout).map_err(|e| invalid(format!("not valid JSON: {e}")))?;
    match parsed.sha256 {
        Some(sha) if !sha.trim().is_empty() => Ok(sha.trim().to_string()),
        _ => Err(invalid("missing 'sha256' field".to_string())),
    }
}

/// Extract the checksum from `nix-prefetch-url` output.
///
/// The tool prints progress on stderr and the checksum as the last stdout
/// line.
pub fn parse_prefetch_url_output(repo: &str, stdout: &str) -> Result<String, PrefetchError> {
    stdout
        .lines()
        .map(str::trim)
        .rfind(|line| !line.is_empty())
        .map(str::to_string)
        .ok_or_else(|| PrefetchError::InvalidOutput {
            tool: PREFETCH_URL.to_string(),
            repo: repo.to_string(),
            reason: "empty output".to_string(),
        })
}

/// [`ChecksumFetcher`] running the nix prefetch tools.
#[derive(Debug, Clone)]
pub struct NixPrefetcher {
    base_url: String,
}

impl Default for NixPrefetcher {
    fn default() -> Self {
        Self::new(GITHUB_BASE_URL)
    }
}

impl NixPrefetcher {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Clone URL, with the trailing slash the prefetch tools have always
    /// been given.
    pub fn clone_url(&self, spec: &PluginSpec) -> String {
        format!("{}/{}/{}/", self.base_url, spec.owner, spec.repo)
    }

    /// Tarball URL of one revision.
    pub fn archive_url(&self, spec: &PluginSpec, revision_id: &str) -> String {
        format!("{}archive/{}.tar.gz", self.clone_url(spec), revision_id)
    }

    async fn prefetch_git(&self, spec: &PluginSpec, revision_id: &str) -> Result<String, PrefetchError> {
        let repo = spec.full_name();
        let stdout = ToolCommand::new(PREFETCH_GIT)
            .args(["--fetch-submodules".to_string(), self.clone_url(spec), revision_id.to_string()])
            .with_context(&repo)
            .execute_stdout()
            .await
            .map_err(|e| PrefetchError::from_command(PREFETCH_GIT, &repo, e))?;
        parse_prefetch_git_output(&repo, &stdout)
    }

    async fn prefetch_archive(&self, spec: &PluginSpec, revision_id: &str) -> Result<String, PrefetchError> {
        let repo = spec.full_name();
        let stdout = ToolCommand::new(PREFETCH_URL)
            .args(["--unpack".to_string(), self.archive_url(spec, revision_id)])
            .with_context(&repo)
            .execute_stdout()
            .await
            .map_err(|e| PrefetchError::from_command(PREFETCH_URL, &repo, e))?;
        parse_prefetch_url_output(&repo, &stdout)
    }
}

impl ChecksumFetcher for NixPrefetcher {
    async fn fetch_checksum(&self, spec: &PluginSpec, revision_id: &str, has_submodules: bool) -> Result<String> {
        tracing::info!(target: "prefetch", "prefetch {}", spec.full_name());
        let checksum = if has_submodules {
            self.prefetch_git(spec, revision_id).await?
        } else {
            self.prefetch_archive(spec, revision_id).await?
        };
        tracing::debug!(target: "prefetch", "{} @ {} -> {}", spec.full_name(), revision_id, checksum);
        Ok(checksum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let prefetcher = NixPrefetcher::default();
        let spec = PluginSpec::new("tpope", "vim-fugitive");
        assert_eq!(prefetcher.clone_url(&spec), "https://github.com/tpope/vim-fugitive/");
        assert_eq!(
            prefetcher.archive_url(&spec, "abc123"),
            "https://github.com/tpope/vim-fugitive/archive/abc123.tar.gz"
        );
    }

    #[test]
    fn test_parse_prefetch_git_output() {
        let stdout = r#"{
  "url": "https://github.com/a/b/",
  "rev": "abc123",
  "date": "2021-01-01T00:00:00+00:00",
  "sha256": "1m1yq8sql4r9yqvy0gfwcdxyn4yzcgc2zqkkl3f7bzcpz2plzlfj",
  "fetchSubmodules": true
}"#;
        assert_eq!(
            parse_prefetch_git_output("a/b", stdout).unwrap(),
            "1m1yq8sql4r9yqvy0gfwcdxyn4yzcgc2zqkkl3f7bzcpz2plzlfj"
        );
    }

    #[test]
    fn test_parse_prefetch_git_output_without_sha() {
        let err = parse_prefetch_git_output("a/b", r#"{"rev": "abc"}"#).unwrap_err();
        assert!(matches!(err, PrefetchError::InvalidOutput { .. }));
        assert!(err.to_string().contains("sha256"));

        let err = parse_prefetch_git_output("a/b", "path is /nix/store/...").unwrap_err();
        assert!(matches!(err, PrefetchError::InvalidOutput { .. }));
    }

    #[test]
    fn test_parse_prefetch_url_output() {
        assert_eq!(parse_prefetch_url_output("a/b", "0abc\n").unwrap(), "0abc");
        assert_eq!(parse_prefetch_url_output("a/b", "noise\n  0abc  \n\n").unwrap(), "0abc");
        assert!(matches!(
            parse_prefetch_url_output("a/b", " \n"),
            Err(PrefetchError::InvalidOutput { .. })
        ));
    }

    #[test]
    fn test_command_errors_are_classified() {
        let missing = PrefetchError::from_command(
            PREFETCH_URL,
            "a/b",
            CommandError::NotFound {
                program: PREFETCH_URL.to_string(),
            },
        );
        assert!(matches!(missing, PrefetchError::Spawn { .. }));

        let failed = PrefetchError::from_command(
            PREFETCH_URL,
            "a/b",
            CommandError::Failed {
                program: PREFETCH_URL.to_string(),
                args: "--unpack x".to_string(),
                code: Some(1),
                stderr: "error: unable to download".to_string(),
            },
        );
        assert!(matches!(failed, PrefetchError::CommandFailed { .. }));
    }
}
