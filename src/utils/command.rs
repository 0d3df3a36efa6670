//! Builder for external tool invocations.
//!
//! Every subprocess plugreg runs (`nix-prefetch-git`, `nix-prefetch-url`,
//! `nix eval`, `git`) goes through [`ToolCommand`], which gives them the same
//! logging, output capture, optional timeout and error shape.
//!
//! ```rust,no_run
//! use plugreg_cli::utils::command::ToolCommand;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let sha = ToolCommand::new("nix-prefetch-url")
//!     .args(["--unpack", "https://github.com/a/b/archive/abc.tar.gz"])
//!     .with_context("a/b")
//!     .execute_stdout()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;

/// Why a tool invocation failed.
#[derive(Error, Debug)]
pub enum CommandError {
    /// The executable is not on PATH.
    #[error("{program} is not installed or not found in PATH")]
    NotFound {
        /// Program name
        program: String,
    },

    /// The process could not be started.
    #[error("Failed to run {program}")]
    Spawn {
        /// Program name
        program: String,
        /// OS error
        #[source]
        source: std::io::Error,
    },

    /// The process exited unsuccessfully.
    #[error("{program} {args} exited with {}: {}", exit_code_label(.code), .stderr.trim())]
    Failed {
        /// Program name
        program: String,
        /// Arguments, space separated
        args: String,
        /// Exit code, absent when killed by a signal
        code: Option<i32>,
        /// Captured standard error
        stderr: String,
    },

    /// The process did not finish in time.
    #[error("{program} timed out after {} seconds", .after.as_secs())]
    TimedOut {
        /// Program name
        program: String,
        /// Configured limit
        after: Duration,
    },
}

fn exit_code_label(code: &Option<i32>) -> String {
    code.map_or_else(|| "signal".to_string(), |c| format!("status {c}"))
}

/// Captured output of a successful invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
}

/// Fluent builder for running an external tool.
///
/// Defaults: no timeout, output captured, environment inherited.
pub struct ToolCommand {
    program: String,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    env_vars: Vec<(String, String)>,
    timeout_duration: Option<Duration>,
    context: Option<String>,
}

impl ToolCommand {
    /// Start building an invocation of `program`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            env_vars: Vec::new(),
            timeout_duration: None,
            context: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run the tool from `dir` instead of the process working directory.
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Set an environment variable for the child only.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    /// Kill the child if it runs longer than `duration`.
    pub const fn with_timeout(mut self, duration: Option<Duration>) -> Self {
        self.timeout_duration = duration;
        self
    }

    /// Label log lines with `context` (typically the plugin being fetched).
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Run the command and capture its output; non-zero exit is an error.
    pub async fn execute(self) -> Result<CommandOutput, CommandError> {
        let start = Instant::now();
        let prefix = self.context.as_deref().map(|c| format!("({c}) ")).unwrap_or_default();
        let joined_args = self.args.join(" ");

        if which::which(&self.program).is_err() {
            return Err(CommandError::NotFound {
                program: self.program,
            });
        }

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).stdout(Stdio::piped()).stderr(Stdio::piped()).kill_on_drop(true);
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.env_vars {
            tracing::trace!(target: "command", "{}Setting env var: {}={}", prefix, key, value);
            cmd.env(key, value);
        }

        tracing::debug!(target: "command", "{}Executing command: {} {}", prefix, self.program, joined_args);

        let output_future = cmd.output();
        let output = match self.timeout_duration {
            Some(duration) => match timeout(duration, output_future).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(
                        target: "command",
                        "{}Command timed out after {} seconds: {} {}",
                        prefix,
                        duration.as_secs(),
                        self.program,
                        joined_args
                    );
                    return Err(CommandError::TimedOut {
                        program: self.program,
                        after: duration,
                    });
                }
            },
            None => output_future.await,
        }
        .map_err(|source| CommandError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            tracing::debug!(
                target: "command",
                "{}Command failed with exit code: {:?}",
                prefix,
                output.status.code()
            );
            return Err(CommandError::Failed {
                program: self.program,
                args: joined_args,
                code: output.status.code(),
                stderr: if stderr.trim().is_empty() { stdout } else { stderr },
            });
        }

        let elapsed = start.elapsed();
        if elapsed.as_secs() > 1 {
            tracing::info!(
                target: "command::perf",
                "{}{} took {:.2}s",
                prefix,
                self.program,
                elapsed.as_secs_f64()
            );
        }

        Ok(CommandOutput {
            stdout,
            stderr,
        })
    }

    /// Run the command and return stdout, trimmed.
    pub async fn execute_stdout(self) -> Result<String, CommandError> {
        let output = self.execute().await?;
        Ok(output.stdout.trim().to_string())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stdout_is_captured_and_trimmed() {
        let out = ToolCommand::new("sh").args(["-c", "echo '  0abc  '"]).execute_stdout().await.unwrap();
        assert_eq!(out, "0abc");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_failed() {
        let err = ToolCommand::new("sh").args(["-c", "echo boom >&2; exit 3"]).execute().await.unwrap_err();
        match err {
            CommandError::Failed {
                code,
                stderr,
                ..
            } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr.trim(), "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_not_found() {
        let err = ToolCommand::new("plugreg-definitely-missing-tool").execute().await.unwrap_err();
        assert!(matches!(err, CommandError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_env_is_passed_to_child() {
        let out = ToolCommand::new("sh")
            .args(["-c", "printf %s \"$PLUGREG_TEST_VALUE\""])
            .env("PLUGREG_TEST_VALUE", "scoped")
            .execute_stdout()
            .await
            .unwrap();
        assert_eq!(out, "scoped");
    }

    #[tokio::test]
    async fn test_timeout() {
        let err = ToolCommand::new("sleep")
            .arg("5")
            .with_timeout(Some(Duration::from_millis(50)))
            .execute()
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::TimedOut { .. }));
    }
}
