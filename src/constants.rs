//! Global constants used throughout the plugreg codebase.
//!
//! This module contains timeouts, retry parameters, default file names and
//! environment variable names that are used across multiple modules.

use std::time::Duration;

/// Base URL every tracked plugin repository lives under.
pub const GITHUB_BASE_URL: &str = "https://github.com";

/// Branch used when a plugin line carries no `@branch` suffix.
pub const DEFAULT_BRANCH: &str = "master";

/// Timeout applied to every HTTP request made by the locator (10 seconds).
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Total number of attempts (not retries) for a transient network failure.
pub const RETRY_ATTEMPTS: u32 = 4;

/// Delay before the first retry (3 seconds).
pub const RETRY_BASE_DELAY: Duration = Duration::from_secs(3);

/// Multiplier applied to the retry delay after every failed attempt.
pub const RETRY_BACKOFF_FACTOR: u32 = 2;

/// Default width of the fetch worker pool.
///
/// The work is dominated by network and subprocess latency, so the pool is
/// much wider than the CPU count.
pub const DEFAULT_PARALLELISM: usize = 30;

/// Environment variable holding an optional GitHub token for rate-limit relief.
pub const DEFAULT_TOKEN_ENV: &str = "GITHUB_API_TOKEN";

/// Environment variable pointing at a configuration file.
pub const CONFIG_ENV: &str = "PLUGREG_CONFIG";

/// Environment variable disabling progress bars when set.
pub const NO_PROGRESS_ENV: &str = "PLUGREG_NO_PROGRESS";

/// Default plugin list file name, relative to the plugin directory.
pub const DEFAULT_INPUT_FILE: &str = "vim-plugin-names";

/// Default generated registry file name, relative to the plugin directory.
pub const DEFAULT_OUTPUT_FILE: &str = "generated.nix";

/// Default deprecation ledger file name, relative to the plugin directory.
pub const DEFAULT_DEPRECATED_FILE: &str = "deprecated.json";

/// File name of the persisted artifact cache inside the user cache directory.
pub const DEFAULT_CACHE_FILE: &str = "vim-plugin-cache.json";

/// Attribute set name used in commit messages.
pub const DEFAULT_PACKAGE_SET: &str = "vimPlugins";

/// Builder function called for every generated entry.
pub const DEFAULT_BUILDER: &str = "buildVimPluginFrom2Nix";

/// First line of the generated registry file.
pub const DEFAULT_HEADER: &str =
    "# This file has been generated by ./pkgs/misc/vim-plugins/update.py. Do not edit!";

/// Location of the nixpkgs checkout relative to the plugin directory.
pub const DEFAULT_NIXPKGS_ROOT: &str = "../../..";

/// Timestamp format used by the commit feed.
pub const FEED_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Date format used for versions and deprecation dates.
pub const VERSION_DATE_FORMAT: &str = "%Y-%m-%d";
