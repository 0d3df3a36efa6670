//! Fetch orchestrator.
//!
//! Turns plugin specs into checksummed artifacts. Every spec is handled by
//! one worker of a [`WorkerPool`]:
//!
//! 1. resolve the latest revision of the tracked branch (noting redirects)
//! 2. on a cache hit, reuse the stored checksum
//! 3. otherwise probe for submodules, prefetch the revision and remember
//!    the result in the cache; specs missing on the same revision at once
//!    share one prefetch
//!
//! A failure is captured in that spec's [`FetchOutcome`] and never affects
//! its siblings. Once all workers are done the cache is persisted, and
//! [`check_results`] decides whether the run as a whole succeeded.

pub mod pool;

use anyhow::{Context, Result};
use std::sync::Arc;

pub use pool::WorkerPool;

use crate::cache::Cache;
use crate::core::{PlugregError, format_error_chain};
use crate::github::{Redirect, RedirectMap, RepositoryLocator};
use crate::models::Artifact;
use crate::prefetch::ChecksumFetcher;
use crate::spec::PluginSpec;
use crate::utils::ProgressBar;

/// A successfully resolved plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPlugin {
    /// Spec as listed in the input file
    pub spec: PluginSpec,
    /// Revision, checksum and commit date
    pub artifact: Artifact,
    /// Relocation observed while resolving, if any
    pub redirect: Option<Redirect>,
}

/// What happened to one spec.
#[derive(Debug)]
pub struct FetchOutcome {
    pub spec: PluginSpec,
    pub result: Result<FetchedPlugin>,
}

/// Drives locator, fetcher and cache for a list of specs.
pub struct Orchestrator<L, F> {
    locator: Arc<L>,
    fetcher: Arc<F>,
    cache: Arc<Cache>,
}

impl<L, F> Clone for Orchestrator<L, F> {
    fn clone(&self) -> Self {
        Self {
            locator: Arc::clone(&self.locator),
            fetcher: Arc::clone(&self.fetcher),
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<L: RepositoryLocator, F: ChecksumFetcher> Orchestrator<L, F> {
    pub fn new(locator: Arc<L>, fetcher: Arc<F>, cache: Arc<Cache>) -> Self {
        Self {
            locator,
            fetcher,
            cache,
        }
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// Resolve one spec to an artifact, consulting the cache first.
    pub async fn prefetch_plugin(&self, spec: &PluginSpec) -> Result<FetchedPlugin> {
        let located = self.locator.resolve_latest(spec).await?;
        let revision = located.revision;

        if let Some(artifact) = self.cache.get_for(&revision.revision_id, spec, revision.timestamp) {
            tracing::debug!(target: "cache", "{} @ {} is cached", spec.full_name(), revision.revision_id);
            return Ok(FetchedPlugin {
                spec: spec.clone(),
                artifact,
                redirect: located.redirect,
            });
        }

        let artifact = self
            .cache
            .get_or_fetch(&revision.revision_id, || async {
                let has_submodules = self.locator.has_submodules(spec).await?;
                let checksum = self.fetcher.fetch_checksum(spec, &revision.revision_id, has_submodules).await?;
                Ok(Artifact {
                    revision_id: revision.revision_id.clone(),
                    has_submodules,
                    display_name: spec.display_name().to_string(),
                    checksum,
                    timestamp: Some(revision.timestamp),
                })
            })
            .await?;

        // Another spec on the same revision may have done the fetch.
        Ok(FetchedPlugin {
            spec: spec.clone(),
            artifact: Artifact {
                display_name: spec.display_name().to_string(),
                timestamp: Some(revision.timestamp),
                ..artifact
            },
            redirect: located.redirect,
        })
    }

    /// Handle every spec with at most `concurrency` in flight.
    ///
    /// Outcomes are returned in input order.
    pub async fn run(&self, specs: Vec<PluginSpec>, concurrency: usize, progress: ProgressBar) -> Result<Vec<FetchOutcome>> {
        let this = self.clone();
        WorkerPool::new(concurrency)
            .run(specs, move |spec| {
                let this = this.clone();
                let progress = progress.clone();
                async move {
                    progress.set_message(spec.full_name());
                    let result = this
                        .prefetch_plugin(&spec)
                        .await
                        .with_context(|| format!("Failed to update {}", spec.full_name()));
                    progress.inc(1);
                    FetchOutcome {
                        spec,
                        result,
                    }
                }
            })
            .await
    }

    /// [`run`](Self::run), persist the cache, then [`check_results`].
    ///
    /// The cache is stored before the verdict so work done for the
    /// successful plugins survives a failed run.
    pub async fn fetch_all(
        &self,
        specs: Vec<PluginSpec>,
        concurrency: usize,
        progress: ProgressBar,
    ) -> Result<(Vec<FetchedPlugin>, RedirectMap)> {
        let outcomes = self.run(specs, concurrency, progress.clone()).await;
        progress.finish_and_clear();

        if let Err(e) = self.cache.store() {
            tracing::warn!(target: "cache", "{:#}", e);
        }

        Ok(check_results(outcomes?)?)
    }
}

/// Split outcomes into plugins and redirects, or fail the run.
///
/// Logs `N plugins were checked`; when anything failed, prints the summary
/// with the name and full error chain of every failure on stderr.
pub fn check_results(outcomes: Vec<FetchOutcome>) -> Result<(Vec<FetchedPlugin>, RedirectMap), PlugregError> {
    let total = outcomes.len();
    let mut plugins = Vec::with_capacity(total);
    let mut failures = Vec::new();
    let mut redirects = RedirectMap::new();

    for outcome in outcomes {
        match outcome.result {
            Ok(plugin) => {
                if let Some(redirect) = &plugin.redirect {
                    redirects.insert(redirect.old_line.clone(), redirect.new_line.clone());
                }
                plugins.push(plugin);
            }
            Err(e) => failures.push((outcome.spec, e)),
        }
    }

    if failures.is_empty() {
        tracing::info!("{} plugins were checked", plugins.len());
        return Ok((plugins, redirects));
    }

    eprintln!(
        "{} plugins were checked, {} plugin(s) could not be downloaded:\n",
        plugins.len(),
        failures.len()
    );
    for (spec, error) in &failures {
        eprintln!("{}: {}\n", spec.repo, format_error_chain(error));
    }

    Err(PlugregError::FetchFailed {
        failed: failures.len(),
        total,
    })
}

/// Order plugins the way the registry lists them: case-insensitively by
/// display name.
pub fn sort_plugins(plugins: &mut [FetchedPlugin]) {
    plugins.sort_by_cached_key(|p| p.artifact.display_name.to_lowercase());
}
