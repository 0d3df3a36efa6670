//! Commit wrapper around the system `git` binary.
//!
//! Updates are committed to the repository that contains the plugin list.
//! Only the files an update step touched are staged; when staging them
//! changes nothing, the step is reported and skipped instead of producing an
//! empty commit.

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::core::PlugregError;
use crate::utils::command::{CommandError, ToolCommand};

/// Result of [`GitRepo::commit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// A commit was created
    Committed,
    /// The files were unchanged
    NothingToCommit,
}

/// A working tree located by [`GitRepo::discover`].
#[derive(Debug, Clone)]
pub struct GitRepo {
    root: PathBuf,
}

fn git_error(operation: &str, error: CommandError) -> PlugregError {
    match error {
        CommandError::NotFound { .. } => PlugregError::GitNotFound,
        CommandError::Failed {
            stderr,
            ..
        } => PlugregError::GitCommandError {
            operation: operation.to_string(),
            stderr: stderr.trim().to_string(),
        },
        other => PlugregError::GitCommandError {
            operation: operation.to_string(),
            stderr: other.to_string(),
        },
    }
}

impl GitRepo {
    /// Find the repository containing `start`, searching parent
    /// directories.
    pub async fn discover(start: &Path) -> Result<Self, PlugregError> {
        let toplevel = ToolCommand::new("git")
            .args(["rev-parse", "--show-toplevel"])
            .current_dir(start)
            .with_context("git")
            .execute_stdout()
            .await
            .map_err(|e| match e {
                CommandError::NotFound { .. } => PlugregError::GitNotFound,
                _ => PlugregError::NotAGitRepo {
                    path: start.display().to_string(),
                },
            })?;

        tracing::debug!(target: "git", "Repository root: {}", toplevel);
        Ok(Self {
            root: PathBuf::from(toplevel),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn git(&self) -> ToolCommand {
        ToolCommand::new("git").current_dir(&self.root).with_context("git")
    }

    /// Stage `files` and commit them with `message`.
    ///
    /// Files that do not exist are skipped, so an optional file such as the
    /// deprecation ledger can be listed before it has been created.
    pub async fn commit(&self, message: &str, files: &[PathBuf]) -> Result<CommitOutcome, PlugregError> {
        let paths: Vec<String> = files
            .iter()
            .filter_map(|f| std::fs::canonicalize(f).ok())
            .map(|f| f.display().to_string())
            .collect();

        if paths.is_empty() {
            tracing::info!(target: "git", "no changes in working tree to commit");
            return Ok(CommitOutcome::NothingToCommit);
        }

        self.git()
            .args(["add", "--"])
            .args(paths.iter().cloned())
            .execute()
            .await
            .map_err(|e| git_error("add", e))?;

        let staged = self
            .git()
            .args(["diff", "--cached", "--name-only", "--"])
            .args(paths)
            .execute_stdout()
            .await
            .map_err(|e| git_error("diff", e))?;

        if staged.is_empty() {
            tracing::info!(target: "git", "no changes in working tree to commit");
            return Ok(CommitOutcome::NothingToCommit);
        }

        tracing::info!(target: "git", "committing to nixpkgs \"{}\"", message);
        self.git()
            .args(["commit", "-q", "-m", message])
            .execute()
            .await
            .map_err(|e| git_error("commit", e))?;
        tracing::debug!(target: "git", "Committed: {}", message);
        Ok(CommitOutcome::Committed)
    }
}

/// Commit messages used by the update workflow.
pub mod messages {
    /// After a regular update.
    pub fn update(package_set: &str) -> String {
        format!("{package_set}: update")
    }

    /// After rewriting moved repositories.
    pub fn redirects(package_set: &str) -> String {
        format!("{package_set}: resolve github repository redirects")
    }

    /// After adding a plugin.
    pub fn init(package_set: &str, name: &str, version: &str) -> String {
        format!("{package_set}.{name}: init at {version}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestGit;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, TestGit) {
        let temp = TempDir::new().unwrap();
        let git = TestGit::new(temp.path());
        git.init().unwrap();
        std::fs::write(temp.path().join("README"), "fixture\n").unwrap();
        git.add_all().unwrap();
        git.commit("initial").unwrap();
        (temp, git)
    }

    #[test]
    fn test_messages() {
        assert_eq!(messages::update("vimPlugins"), "vimPlugins: update");
        assert_eq!(messages::redirects("vimPlugins"), "vimPlugins: resolve github repository redirects");
        assert_eq!(messages::init("vimPlugins", "vim-fugitive", "2021-01-01"), "vimPlugins.vim-fugitive: init at 2021-01-01");
    }

    #[tokio::test]
    async fn test_discover_from_subdirectory() {
        let (temp, _git) = fixture();
        let nested = temp.path().join("pkgs").join("misc");
        std::fs::create_dir_all(&nested).unwrap();

        let repo = GitRepo::discover(&nested).await.unwrap();
        assert_eq!(
            std::fs::canonicalize(repo.root()).unwrap(),
            std::fs::canonicalize(temp.path()).unwrap()
        );
    }

    #[tokio::test]
    async fn test_discover_outside_repository() {
        let temp = TempDir::new().unwrap();
        let err = GitRepo::discover(temp.path()).await.unwrap_err();
        assert!(matches!(err, PlugregError::NotAGitRepo { .. }));
    }

    #[tokio::test]
    async fn test_commit_changed_file() {
        let (temp, git) = fixture();
        let out = temp.path().join("generated.nix");
        std::fs::write(&out, "{ }\n").unwrap();

        let repo = GitRepo::discover(temp.path()).await.unwrap();
        let outcome = repo.commit("vimPlugins: update", &[out]).await.unwrap();

        assert_eq!(outcome, CommitOutcome::Committed);
        assert_eq!(git.log_subjects().unwrap()[0], "vimPlugins: update");
    }

    #[tokio::test]
    async fn test_unchanged_files_are_not_committed() {
        let (temp, git) = fixture();
        let repo = GitRepo::discover(temp.path()).await.unwrap();

        let outcome = repo.commit("vimPlugins: update", &[temp.path().join("README")]).await.unwrap();

        assert_eq!(outcome, CommitOutcome::NothingToCommit);
        assert_eq!(git.log_subjects().unwrap(), vec!["initial".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_files_are_skipped() {
        let (temp, git) = fixture();
        let out = temp.path().join("generated.nix");
        std::fs::write(&out, "{ }\n").unwrap();

        let repo = GitRepo::discover(temp.path()).await.unwrap();
        let outcome = repo
            .commit("vimPlugins: update", &[out, temp.path().join("deprecated.json")])
            .await
            .unwrap();

        assert_eq!(outcome, CommitOutcome::Committed);
        assert_eq!(git.log_subjects().unwrap()[0], "vimPlugins: update");
    }

    #[tokio::test]
    async fn test_only_missing_files_is_nothing_to_commit() {
        let (temp, git) = fixture();
        let repo = GitRepo::discover(temp.path()).await.unwrap();

        let outcome = repo.commit("vimPlugins: update", &[temp.path().join("absent.json")]).await.unwrap();

        assert_eq!(outcome, CommitOutcome::NothingToCommit);
        assert_eq!(git.log_subjects().unwrap(), vec!["initial".to_string()]);
    }
}
