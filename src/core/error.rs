//! Error handling for plugreg
//!
//! Whole-run failures are described by [`PlugregError`]. Per-plugin failures
//! (locator, prefetch) have their own error enums next to the code that
//! raises them and travel as [`anyhow::Error`] chains inside the orchestrator
//! until they are reported in aggregate.
//!
//! For CLI display, any [`anyhow::Error`] is turned into an [`ErrorContext`]
//! by [`user_friendly_error`], which adds details and an actionable
//! suggestion where one is known.
//!
//! ```rust,no_run
//! use plugreg_cli::core::{PlugregError, user_friendly_error};
//!
//! let error = anyhow::Error::from(PlugregError::GitNotFound);
//! user_friendly_error(error).display();
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The main error type for whole-run failures.
///
/// A single plugin that cannot be resolved or prefetched is not a
/// `PlugregError` on its own; it becomes one ([`PlugregError::FetchFailed`])
/// once every worker has finished and the failures are counted.
#[derive(Error, Debug, Clone)]
pub enum PlugregError {
    /// A line of the plugin list could not be parsed.
    ///
    /// Raised before any network activity starts.
    #[error("Invalid repository '{line}' on line {line_number}: {reason}")]
    InvalidPluginLine {
        /// The offending line, trimmed
        line: String,
        /// 1-based line number in the input file
        line_number: usize,
        /// Why the line was rejected
        reason: String,
    },

    /// At least one plugin failed to resolve or prefetch.
    #[error("{failed} of {total} plugin(s) could not be downloaded")]
    FetchFailed {
        /// Number of failed plugins
        failed: usize,
        /// Number of plugins in the run
        total: usize,
    },

    /// The generated registry could not be rendered.
    #[error("Failed to render registry template: {reason}")]
    TemplateError {
        /// Rendering failure reported by the template engine
        reason: String,
    },

    /// Configuration file missing, unreadable or invalid.
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the problem
        message: String,
    },

    /// A file could not be read or written.
    #[error("File system error: {operation}")]
    FileSystemError {
        /// What was being attempted
        operation: String,
        /// Path involved
        path: String,
    },

    /// Git is not installed or not on PATH.
    #[error("Git is not installed or not found in PATH")]
    GitNotFound,

    /// The plugin directory is not inside a git working tree.
    #[error("Not inside a git working tree: {path}")]
    NotAGitRepo {
        /// Directory that was searched from
        path: String,
    },

    /// A git command exited unsuccessfully.
    #[error("Git operation failed: {operation}")]
    GitCommandError {
        /// The git subcommand
        operation: String,
        /// Captured standard error
        stderr: String,
    },

    /// Generic error with a message.
    #[error("{message}")]
    Other {
        /// Error message
        message: String,
    },
}

/// Error wrapper carrying user-facing details and a suggestion.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: PlugregError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context with no suggestion or details.
    #[must_use]
    pub const fn new(error: PlugregError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add additional details explaining the error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error to stderr: error in red, details in yellow,
    /// suggestion in green.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error to a user-friendly [`ErrorContext`].
///
/// Recognizes [`PlugregError`] (tailored suggestions), [`std::io::Error`]
/// and [`toml::de::Error`]; everything else is shown with its full cause
/// chain.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(plugreg_error) = error.downcast_ref::<PlugregError>() {
        return create_error_context(plugreg_error.clone());
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        match io_error.kind() {
            std::io::ErrorKind::PermissionDenied => {
                return ErrorContext::new(PlugregError::FileSystemError {
                    operation: io_error.to_string(),
                    path: "unknown".to_string(),
                })
                .with_suggestion("Check file ownership and permissions of the plugin directory and cache directory")
                .with_details(format_error_chain(&error));
            }
            std::io::ErrorKind::NotFound => {
                return ErrorContext::new(PlugregError::FileSystemError {
                    operation: io_error.to_string(),
                    path: "unknown".to_string(),
                })
                .with_suggestion("Check that the file or directory exists and the path is correct")
                .with_details(format_error_chain(&error));
            }
            _ => {}
        }
    }

    if let Some(toml_error) = error.downcast_ref::<toml::de::Error>() {
        return ErrorContext::new(PlugregError::ConfigError {
            message: toml_error.to_string(),
        })
        .with_suggestion("Check the TOML syntax of your plugreg configuration file");
    }

    ErrorContext::new(PlugregError::Other {
        message: format_error_chain(&error),
    })
}

/// Render an error and its causes, one numbered cause per line.
#[must_use]
pub fn format_error_chain(error: &anyhow::Error) -> String {
    let mut message = error.to_string();
    let chain: Vec<String> =
        error.chain().skip(1).map(std::string::ToString::to_string).collect();

    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }

    message
}

fn create_error_context(error: PlugregError) -> ErrorContext {
    match &error {
        PlugregError::InvalidPluginLine { .. } => ErrorContext::new(error)
            .with_suggestion("Each line must be in the format owner/repo[@branch][ as alias]")
            .with_details("The plugin list is validated before any repository is contacted"),

        PlugregError::FetchFailed { .. } => ErrorContext::new(error)
            .with_suggestion("Fix or remove the failing plugins listed above and run the update again")
            .with_details("The registry file is only written when every plugin resolves"),

        PlugregError::TemplateError { .. } => ErrorContext::new(error)
            .with_details("The registry template failed to render; the output file was not modified"),

        PlugregError::ConfigError { .. } => ErrorContext::new(error)
            .with_suggestion("Check the configuration file passed with --config or PLUGREG_CONFIG"),

        PlugregError::GitNotFound => ErrorContext::new(error)
            .with_suggestion("Install git or run with --no-commit to skip committing the result")
            .with_details("plugreg commits the regenerated files to the surrounding git working tree"),

        PlugregError::NotAGitRepo { .. } => ErrorContext::new(error)
            .with_suggestion("Run plugreg from inside a checkout, or pass --no-commit"),

        PlugregError::GitCommandError { stderr, .. } => {
            let details = stderr.trim().to_string();
            ErrorContext::new(error)
                .with_suggestion("Check the state of the working tree and try the git command manually")
                .with_details(details)
        }

        PlugregError::FileSystemError { .. } | PlugregError::Other { .. } => {
            ErrorContext::new(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_error_display() {
        let error = PlugregError::GitNotFound;
        assert_eq!(error.to_string(), "Git is not installed or not found in PATH");

        let error = PlugregError::FetchFailed {
            failed: 2,
            total: 10,
        };
        assert_eq!(error.to_string(), "2 of 10 plugin(s) could not be downloaded");

        let error = PlugregError::InvalidPluginLine {
            line: "foobar".to_string(),
            line_number: 3,
            reason: "missing '/'".to_string(),
        };
        assert_eq!(error.to_string(), "Invalid repository 'foobar' on line 3: missing '/'");
    }

    #[test]
    fn test_error_context_display() {
        let ctx = ErrorContext::new(PlugregError::GitNotFound).with_suggestion("Install git");

        let display = format!("{ctx}");
        assert!(display.contains("Git is not installed"));
        assert!(display.contains("Suggestion: Install git"));
        assert!(!display.contains("Details:"));
    }

    #[test]
    fn test_user_friendly_error_recognizes_plugreg_error() {
        let ctx = user_friendly_error(anyhow::Error::from(PlugregError::FetchFailed {
            failed: 1,
            total: 1,
        }));
        assert!(matches!(ctx.error, PlugregError::FetchFailed { .. }));
        assert!(ctx.suggestion.is_some());
    }

    #[test]
    fn test_user_friendly_error_keeps_cause_chain() {
        let error = Err::<(), _>(anyhow::anyhow!("connection reset"))
            .context("fetching commit feed")
            .unwrap_err();

        let ctx = user_friendly_error(error);
        let message = ctx.error.to_string();
        assert!(message.starts_with("fetching commit feed"));
        assert!(message.contains("1: connection reset"));
    }
}
