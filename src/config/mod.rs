//! Updater configuration.
//!
//! Settings come from, in increasing precedence: built-in defaults, a TOML
//! file, and command-line flags. The file is looked up at
//!
//! 1. the `--config` flag
//! 2. the `PLUGREG_CONFIG` environment variable
//! 3. `<config dir>/plugreg/config.toml` (only if it exists)
//!
//! ```toml
//! root = "pkgs/misc/vim-plugins"
//! parallel = 16
//! token_env = "GITHUB_API_TOKEN"
//!
//! [retry]
//! attempts = 4
//! delay_secs = 3
//! factor = 2
//! ```
//!
//! Relative file paths are resolved against `root`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::default_cache_path;
use crate::constants::{
    CONFIG_ENV, DEFAULT_BUILDER, DEFAULT_CACHE_FILE, DEFAULT_DEPRECATED_FILE, DEFAULT_HEADER,
    DEFAULT_INPUT_FILE, DEFAULT_NIXPKGS_ROOT, DEFAULT_OUTPUT_FILE, DEFAULT_PACKAGE_SET,
    DEFAULT_PARALLELISM, DEFAULT_TOKEN_ENV, GITHUB_BASE_URL, HTTP_TIMEOUT, RETRY_ATTEMPTS,
    RETRY_BACKOFF_FACTOR, RETRY_BASE_DELAY,
};
use crate::core::PlugregError;
use crate::github::LocatorOptions;
use crate::utils::RetryPolicy;

/// Retry settings as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    /// Total attempts per request
    pub attempts: u32,
    /// Seconds before the first retry
    pub delay_secs: u64,
    /// Delay multiplier
    pub factor: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: RETRY_ATTEMPTS,
            delay_secs: RETRY_BASE_DELAY.as_secs(),
            factor: RETRY_BACKOFF_FACTOR,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.attempts.max(1),
            base_delay: Duration::from_secs(self.delay_secs),
            factor: self.factor.max(1),
        }
    }
}

/// Everything an update run needs to know.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpdaterConfig {
    /// Plugin directory; relative paths below are resolved against it
    pub root: PathBuf,
    /// Plugin list
    pub input: PathBuf,
    /// Generated registry
    pub output: PathBuf,
    /// Deprecation ledger
    pub deprecated: PathBuf,
    /// Explicit cache file; defaults to the user cache directory
    pub cache_file: Option<PathBuf>,
    /// Fetch workers
    pub parallel: usize,
    /// Environment variable holding the API token
    pub token_env: String,
    /// Attribute set named in commit messages
    pub package_set: String,
    /// Builder function in the generated file
    pub builder: String,
    /// First line of the generated file
    pub header: String,
    /// Root URL of the repository host
    pub base_url: String,
    /// Per-request timeout
    pub http_timeout_secs: u64,
    pub retry: RetrySettings,
    /// nixpkgs checkout used to evaluate the current registry
    pub nixpkgs_root: PathBuf,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            input: PathBuf::from(DEFAULT_INPUT_FILE),
            output: PathBuf::from(DEFAULT_OUTPUT_FILE),
            deprecated: PathBuf::from(DEFAULT_DEPRECATED_FILE),
            cache_file: None,
            parallel: DEFAULT_PARALLELISM,
            token_env: DEFAULT_TOKEN_ENV.to_string(),
            package_set: DEFAULT_PACKAGE_SET.to_string(),
            builder: DEFAULT_BUILDER.to_string(),
            header: DEFAULT_HEADER.to_string(),
            base_url: GITHUB_BASE_URL.to_string(),
            http_timeout_secs: HTTP_TIMEOUT.as_secs(),
            retry: RetrySettings::default(),
            nixpkgs_root: PathBuf::from(DEFAULT_NIXPKGS_ROOT),
        }
    }
}

impl UpdaterConfig {
    /// `<config dir>/plugreg/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("plugreg").join("config.toml"))
    }

    /// Load from `explicit`, else `PLUGREG_CONFIG`, else the default path.
    ///
    /// A file named explicitly or through the environment must exist; the
    /// default file is optional.
    pub async fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path).await;
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
            return Self::load_from(Path::new(&path)).await;
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path).await,
            _ => Ok(Self::default()),
        }
    }

    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let config: Self = toml::from_str(&content).map_err(|e| PlugregError::ConfigError {
            message: format!("{}: {}", path.display(), e.message()),
        })?;
        config.validate()?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PlugregError> {
        if self.parallel == 0 {
            return Err(PlugregError::ConfigError {
                message: "parallel must be at least 1".to_string(),
            });
        }
        if self.http_timeout_secs == 0 {
            return Err(PlugregError::ConfigError {
                message: "http_timeout_secs must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// `path` as-is when absolute, else below `root`.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() { path.to_path_buf() } else { self.root.join(path) }
    }

    pub fn input_path(&self) -> PathBuf {
        self.resolve(&self.input)
    }

    pub fn output_path(&self) -> PathBuf {
        self.resolve(&self.output)
    }

    pub fn deprecated_path(&self) -> PathBuf {
        self.resolve(&self.deprecated)
    }

    pub fn nixpkgs_root_path(&self) -> PathBuf {
        self.resolve(&self.nixpkgs_root)
    }

    /// Cache file location; `None` disables persistence.
    pub fn cache_path(&self) -> Option<PathBuf> {
        self.cache_file.clone().or_else(|| default_cache_path(DEFAULT_CACHE_FILE))
    }

    /// Token read from the configured variable; blank counts as unset.
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env).ok().filter(|t| !t.trim().is_empty())
    }

    pub fn locator_options(&self) -> LocatorOptions {
        LocatorOptions {
            base_url: self.base_url.clone(),
            timeout: Duration::from_secs(self.http_timeout_secs),
            token: self.token(),
            retry: self.retry.policy(),
        }
    }
}
