//! The update workflow.
//!
//! One invocation runs up to three kinds of steps, each followed by a
//! commit of the files it touched:
//!
//! 1. refresh every plugin, re-sort the plugin list (`<set>: update`)
//! 2. if repositories moved, rewrite their lines, refresh again and record
//!    renamed attributes (`<set>: resolve github repository redirects`)
//! 3. for each `--add`, append it, refresh, and commit the new entry
//!    (`<set>.<name>: init at <version>`)
//!
//! A refresh writes the registry only when every plugin resolved.

use anyhow::Result;
use chrono::{Local, NaiveDate};
use std::path::PathBuf;
use std::sync::Arc;

use crate::cache::Cache;
use crate::config::UpdaterConfig;
use crate::git::{GitRepo, messages};
use crate::github::{GithubLocator, RedirectMap, RepositoryLocator};
use crate::orchestrator::Orchestrator;
use crate::prefetch::{ChecksumFetcher, NixPrefetcher};
use crate::registry::{LiveRegistry, RegistryEmitter};
use crate::rewriter::rewrite_input;
use crate::spec::{PluginSpec, load_plugin_spec};
use crate::utils::ProgressBar;

/// Switches that do not belong in the config file.
#[derive(Debug, Clone, Copy)]
pub struct UpdateOptions {
    /// Commit after each step
    pub commit: bool,
    /// Draw a progress bar while fetching
    pub show_progress: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            commit: true,
            show_progress: true,
        }
    }
}

/// Runs the update workflow over one plugin directory.
pub struct Updater<L, F> {
    config: UpdaterConfig,
    orchestrator: Orchestrator<L, F>,
    emitter: RegistryEmitter,
    options: UpdateOptions,
}

impl Updater<GithubLocator, NixPrefetcher> {
    /// Wire up the real locator and prefetcher, seeding the cache from the
    /// registry that is currently checked in.
    pub async fn from_config(config: UpdaterConfig, options: UpdateOptions) -> Result<Self> {
        let locator = GithubLocator::new(config.locator_options())?;
        let prefetcher = NixPrefetcher::new(config.base_url.clone());

        let live = LiveRegistry {
            nixpkgs_root: config.nixpkgs_root_path(),
            generated: config.output_path(),
            builder: config.builder.clone(),
        };
        let cache = Cache::new(live.seed().await, config.cache_path());

        let orchestrator = Orchestrator::new(Arc::new(locator), Arc::new(prefetcher), Arc::new(cache));
        Self::new(config, orchestrator, options)
    }
}

impl<L: RepositoryLocator, F: ChecksumFetcher> Updater<L, F> {
    pub fn new(config: UpdaterConfig, orchestrator: Orchestrator<L, F>, options: UpdateOptions) -> Result<Self> {
        let emitter = RegistryEmitter::new(config.builder.clone(), config.header.clone())?.with_base_url(&config.base_url);
        Ok(Self {
            config,
            orchestrator,
            emitter,
            options,
        })
    }

    /// Refresh every listed plugin and rewrite the registry.
    ///
    /// Returns the redirects noticed along the way.
    pub async fn update(&self) -> Result<RedirectMap> {
        let specs = load_plugin_spec(&self.config.input_path())?;
        let progress = if self.options.show_progress {
            ProgressBar::new(specs.len() as u64)
        } else {
            ProgressBar::hidden()
        };

        let (plugins, redirects) = self.orchestrator.fetch_all(specs, self.config.parallel, progress).await?;
        self.emitter.write(&plugins, &self.config.output_path())?;
        Ok(redirects)
    }

    /// Run the whole workflow, adding `add` at the end.
    pub async fn run(&self, repo: Option<&GitRepo>, add: &[PluginSpec]) -> Result<()> {
        self.run_on(repo, add, Local::now().date_naive()).await
    }

    async fn run_on(&self, repo: Option<&GitRepo>, add: &[PluginSpec], today: NaiveDate) -> Result<()> {
        let input = self.config.input_path();
        let output = self.config.output_path();
        let ledger = self.config.deprecated_path();
        let set = &self.config.package_set;

        let redirects = self.update().await?;
        rewrite_input(&input, &redirects, &[], &ledger, today)?;
        self.commit(repo, &messages::update(set), &[output.clone()]).await?;

        if !redirects.is_empty() {
            tracing::info!("{} repositories moved, updating again", redirects.len());
            self.update().await?;
            self.commit(repo, &messages::redirects(set), &[output.clone(), input.clone(), ledger.clone()])
                .await?;
        }

        for spec in add {
            rewrite_input(&input, &RedirectMap::new(), &[spec.to_string()], &ledger, today)?;
            self.update().await?;

            let plugin = self.orchestrator.prefetch_plugin(spec).await?;
            let message = messages::init(set, &plugin.artifact.normalized_name(), &plugin.artifact.version()?);
            self.commit(repo, &message, &[output.clone(), input.clone()]).await?;
        }
        Ok(())
    }

    async fn commit(&self, repo: Option<&GitRepo>, message: &str, files: &[PathBuf]) -> Result<()> {
        match repo {
            Some(repo) if self.options.commit => {
                repo.commit(message, files).await?;
            }
            _ => tracing::debug!("Not committing \"{}\"", message),
        }
        Ok(())
    }
}
