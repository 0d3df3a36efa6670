//! Test utilities shared by unit and integration tests.
//!
//! Available under `cfg(test)` and, for integration tests, with the
//! `test-utils` feature.

use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// With `Some(level)` that level is used; otherwise `RUST_LOG` is honoured
/// and nothing is installed when it is unset. Safe to call from every test.
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}

/// Minimal git driver for building fixture repositories.
pub struct TestGit {
    repo_path: PathBuf,
}

impl TestGit {
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
        }
    }

    fn run(&self, args: &[&str], action: &str) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_path)
            .output()
            .with_context(|| action.to_string())?;

        if !output.status.success() {
            bail!("{} failed: {}", action, String::from_utf8_lossy(&output.stderr));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// `git init` plus a local identity so commits work on bare CI hosts.
    pub fn init(&self) -> Result<()> {
        self.run(&["init", "-q"], "Failed to initialize git repository")?;
        self.run(&["config", "user.email", "test@plugreg.example"], "Failed to configure git user email")?;
        self.run(&["config", "user.name", "Test User"], "Failed to configure git user name")?;
        self.run(&["config", "commit.gpgsign", "false"], "Failed to disable commit signing")?;
        Ok(())
    }

    pub fn add_all(&self) -> Result<()> {
        self.run(&["add", "."], "Failed to add files to git")?;
        Ok(())
    }

    pub fn commit(&self, message: &str) -> Result<()> {
        self.run(&["commit", "-q", "-m", message], "Failed to create git commit")?;
        Ok(())
    }

    /// Commit subjects, newest first.
    pub fn log_subjects(&self) -> Result<Vec<String>> {
        let out = self.run(&["log", "--format=%s"], "Failed to read git log")?;
        Ok(out.lines().map(str::to_string).collect())
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }
}
