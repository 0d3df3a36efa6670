//! Command-line interface for plugreg.
//!
//! plugreg has a single job and therefore no subcommands: every invocation
//! refreshes the plugin registry, optionally adding new plugins on the way.
//!
//! ```bash
//! # Refresh everything listed in ./vim-plugin-names
//! plugreg
//!
//! # Add two plugins, with 8 concurrent fetches
//! plugreg --add tpope/vim-fugitive --add "neoclide/coc.nvim@release as coc" -p 8
//!
//! # Use another list and output, without committing
//! plugreg -i my-plugins -o my-generated.nix --no-commit
//! ```
//!
//! # Global Options
//!
//! - `--verbose` / `-v`: debug logging
//! - `--quiet` / `-q`: errors only, no progress bar
//! - `--config` / `-c`: configuration file (also `PLUGREG_CONFIG`)
//! - `--no-progress`: never draw a progress bar
//!
//! `RUST_LOG` overrides the log level chosen by the flags.

mod update;

pub use update::{UpdateOptions, Updater};

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::config::UpdaterConfig;
use crate::git::GitRepo;
use crate::spec::{PluginSpec, load_plugin_spec};

/// Runtime settings derived from the global flags.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Log level when `RUST_LOG` is unset
    pub log_level: Option<String>,
    pub no_progress: bool,
    pub config_path: Option<PathBuf>,
}

impl CliConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the global tracing subscriber, writing to stderr.
    ///
    /// Calling this twice is harmless; the second call is ignored.
    pub fn init_logging(&self) {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(self.log_level.as_deref().unwrap_or("error"))
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    }
}

fn parse_plugin_arg(value: &str) -> Result<PluginSpec, String> {
    PluginSpec::parse(value).map_err(|e| format!("invalid plugin '{value}': {e}"))
}

/// Updates nix derivations for vim plugins.
#[derive(Parser, Debug)]
#[command(
    name = "plugreg",
    about = "Updates nix derivations for vim plugins",
    version,
    long_about = "Resolves the latest revision of every plugin listed in the input file, \
                  prefetches its sources and regenerates the nix registry."
)]
pub struct Cli {
    /// Plugin to add from GitHub in the form owner/repo[@branch][ as alias]
    #[arg(long = "add", value_name = "PLUGIN", value_parser = parse_plugin_arg)]
    add: Vec<PluginSpec>,

    /// A list of plugins in the form owner/repo
    #[arg(short = 'i', long = "input-names", value_name = "FILE")]
    input_names: Option<PathBuf>,

    /// Filename to save generated nix code
    #[arg(short = 'o', long = "out", value_name = "FILE")]
    out: Option<PathBuf>,

    /// Number of concurrent fetches [default: 30]
    #[arg(short = 'p', long = "proc", value_name = "N")]
    proc: Option<usize>,

    /// Deprecation ledger to record renamed plugins in
    #[arg(long, value_name = "FILE")]
    deprecated: Option<PathBuf>,

    /// Artifact cache file [default: $XDG_CACHE_HOME/vim-plugin-cache.json]
    #[arg(long, value_name = "FILE")]
    cache_file: Option<PathBuf>,

    /// Rewrite files but do not commit them
    #[arg(long)]
    no_commit: bool,

    /// Enable verbose output
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only print errors
    #[arg(short, long)]
    quiet: bool,

    /// Path to a configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Disable progress bars
    #[arg(long)]
    no_progress: bool,
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        self.execute_with_config(config).await
    }

    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            Some("debug".to_string())
        } else if self.quiet {
            Some("error".to_string())
        } else {
            Some("info".to_string())
        };

        CliConfig {
            log_level,
            no_progress: self.no_progress || self.quiet,
            config_path: self.config.clone(),
        }
    }

    /// Fold the file-related flags into `config`.
    pub fn apply_overrides(&self, config: &mut UpdaterConfig) {
        if let Some(input) = &self.input_names {
            config.input.clone_from(input);
        }
        if let Some(out) = &self.out {
            config.output.clone_from(out);
        }
        if let Some(deprecated) = &self.deprecated {
            config.deprecated.clone_from(deprecated);
        }
        if let Some(cache_file) = &self.cache_file {
            config.cache_file = Some(cache_file.clone());
        }
        if let Some(proc) = self.proc {
            config.parallel = proc;
        }
    }

    pub async fn execute_with_config(self, cli_config: CliConfig) -> Result<()> {
        cli_config.init_logging();

        let mut config = UpdaterConfig::load(cli_config.config_path.as_deref()).await?;
        self.apply_overrides(&mut config);
        config.validate()?;

        // A malformed list must fail before anything is evaluated or fetched.
        load_plugin_spec(&config.input_path())?;

        let repo = if self.no_commit {
            None
        } else {
            Some(GitRepo::discover(&config.root).await?)
        };

        let options = UpdateOptions {
            commit: !self.no_commit,
            show_progress: !cli_config.no_progress,
        };
        let updater = Updater::from_config(config, options).await?;
        updater.run(repo.as_ref(), &self.add).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["plugreg"]).unwrap();
        assert!(cli.add.is_empty());
        assert!(!cli.no_commit);

        let config = cli.build_config();
        assert_eq!(config.log_level.as_deref(), Some("info"));
        assert!(!config.no_progress);
    }

    #[test]
    fn test_original_flags() {
        let cli = Cli::try_parse_from([
            "plugreg",
            "--add",
            "tpope/vim-fugitive",
            "--add",
            "neoclide/coc.nvim@release as coc",
            "-i",
            "names",
            "-o",
            "out.nix",
            "-p",
            "4",
        ])
        .unwrap();

        assert_eq!(cli.add.len(), 2);
        assert_eq!(cli.add[1].branch, "release");
        assert_eq!(cli.add[1].alias.as_deref(), Some("coc"));

        let mut config = UpdaterConfig::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.input, PathBuf::from("names"));
        assert_eq!(config.output, PathBuf::from("out.nix"));
        assert_eq!(config.parallel, 4);
        assert_eq!(config.deprecated, PathBuf::from("deprecated.json"));
    }

    #[test]
    fn test_invalid_add_is_rejected_by_parser() {
        assert!(Cli::try_parse_from(["plugreg", "--add", "not-a-plugin"]).is_err());
    }

    #[test]
    fn test_quiet_disables_progress() {
        let cli = Cli::try_parse_from(["plugreg", "-q"]).unwrap();
        let config = cli.build_config();
        assert_eq!(config.log_level.as_deref(), Some("error"));
        assert!(config.no_progress);
    }

    #[test]
    fn test_verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["plugreg", "-v", "-q"]).is_err());
    }
}
