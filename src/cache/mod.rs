//! Artifact cache keyed by revision id.
//!
//! A revision id names an immutable tree, so once its checksum is known it
//! never has to be downloaded again. The cache is seeded from the registry
//! that is currently checked in, overlaid with the file persisted by earlier
//! runs, shared by all fetch workers during a run and written back once at
//! the end.
//!
//! The file lives at `$XDG_CACHE_HOME/<file>` (falling back to
//! `$HOME/.cache/<file>`) and is a plain JSON object:
//!
//! ```json
//! {
//!     "3e4cfc8...": {
//!         "commit": "3e4cfc8...",
//!         "has_submodules": false,
//!         "name": "vim-fugitive",
//!         "sha256": "1m1yq8sql4r9..."
//!     }
//! }
//! ```
//!
//! The cache is never the source of truth: a file that cannot be parsed is
//! reported and ignored.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::models::Artifact;
use crate::spec::PluginSpec;
use crate::utils::fs::write_json_file;

/// Where the cache file lives given an environment lookup.
///
/// `XDG_CACHE_HOME` wins; otherwise `HOME/.cache`. `None` when neither is
/// set, which disables persistence.
pub fn resolve_cache_path<F>(lookup: F, file_name: &str) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    let cache_dir = match lookup("XDG_CACHE_HOME") {
        Some(dir) => PathBuf::from(dir),
        None => PathBuf::from(lookup("HOME")?).join(".cache"),
    };
    Some(cache_dir.join(file_name))
}

/// [`resolve_cache_path`] against the process environment.
pub fn default_cache_path(file_name: &str) -> Option<PathBuf> {
    resolve_cache_path(|key| std::env::var(key).ok(), file_name)
}

/// Revision id → artifact map shared by the fetch workers.
#[derive(Debug)]
pub struct Cache {
    downloads: DashMap<String, Artifact>,
    /// Fetches currently running, so concurrent misses on one revision share
    /// a single download
    pending: DashMap<String, Arc<OnceCell<Artifact>>>,
    path: Option<PathBuf>,
}

impl Cache {
    /// Build the cache from `seed` (the live registry), then overlay
    /// whatever is persisted at `path`.
    pub fn new(seed: Vec<Artifact>, path: Option<PathBuf>) -> Self {
        let cache = Self {
            downloads: DashMap::new(),
            pending: DashMap::new(),
            path,
        };
        let seeded = seed.len();
        for artifact in seed {
            cache.downloads.insert(artifact.revision_id.clone(), artifact);
        }

        let persisted = cache.load();
        let loaded = persisted.len();
        for (revision_id, artifact) in persisted {
            cache.downloads.insert(revision_id, artifact);
        }

        tracing::debug!(
            target: "cache",
            "Cache ready: {} entries from registry, {} from {}",
            seeded,
            loaded,
            cache.path.as_deref().map_or_else(|| "<none>".to_string(), |p| p.display().to_string())
        );
        cache
    }

    /// A cache that is never read from or written to disk.
    pub fn in_memory() -> Self {
        Self::new(Vec::new(), None)
    }

    /// Location of the persisted file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Read the persisted entries, re-keyed by their revision id.
    pub fn load(&self) -> HashMap<String, Artifact> {
        let Some(path) = self.path.as_deref() else {
            return HashMap::new();
        };
        if !path.exists() {
            tracing::debug!(target: "cache", "No cache file at {}", path.display());
            return HashMap::new();
        }

        match read_entries(path) {
            Ok(entries) => entries
                .into_values()
                .map(|artifact| (artifact.revision_id.clone(), artifact))
                .collect(),
            Err(e) => {
                tracing::warn!(target: "cache", "Ignoring unreadable cache file: {:#}", e);
                HashMap::new()
            }
        }
    }

    /// Write every entry back, sorted by revision id.
    ///
    /// A no-op when persistence is disabled.
    pub fn store(&self) -> Result<()> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };

        let entries: BTreeMap<String, Artifact> = self
            .downloads
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        write_json_file(path, &entries)
            .with_context(|| format!("Failed to store plugin cache at {}", path.display()))?;
        tracing::debug!(target: "cache", "Stored {} entries to {}", entries.len(), path.display());
        Ok(())
    }

    pub fn get(&self, revision_id: &str) -> Option<Artifact> {
        self.downloads.get(revision_id).map(|entry| entry.value().clone())
    }

    /// Look up `revision_id` for `spec`.
    ///
    /// The cached name may stem from an earlier alias, so a hit is returned
    /// with the plugin's current display name and this run's commit time.
    pub fn get_for(&self, revision_id: &str, spec: &PluginSpec, timestamp: DateTime<Utc>) -> Option<Artifact> {
        self.get(revision_id).map(|mut artifact| {
            artifact.display_name = spec.display_name().to_string();
            artifact.timestamp = Some(timestamp);
            artifact
        })
    }

    /// Insert or replace the entry for `revision_id`.
    pub fn put(&self, revision_id: impl Into<String>, artifact: Artifact) {
        self.downloads.insert(revision_id.into(), artifact);
    }

    /// Cached artifact for `revision_id`, running `fetch` on a miss.
    ///
    /// Callers missing on the same revision at the same time wait for one
    /// `fetch` instead of starting their own. A failed fetch is not
    /// remembered; the next caller tries again.
    pub async fn get_or_fetch<Fut>(&self, revision_id: &str, fetch: impl FnOnce() -> Fut) -> Result<Artifact>
    where
        Fut: Future<Output = Result<Artifact>>,
    {
        if let Some(artifact) = self.get(revision_id) {
            return Ok(artifact);
        }

        let cell = Arc::clone(&self.pending.entry(revision_id.to_string()).or_default());
        let result = cell
            .get_or_try_init(|| async {
                if let Some(artifact) = self.get(revision_id) {
                    return Ok(artifact);
                }
                let artifact = fetch().await?;
                self.put(revision_id, artifact.clone());
                Ok::<_, anyhow::Error>(artifact)
            })
            .await
            .cloned();

        self.pending.remove_if(revision_id, |_, pending| Arc::ptr_eq(pending, &cell));
        result
    }

    pub fn len(&self) -> usize {
        self.downloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.downloads.is_empty()
    }
}

fn read_entries(path: &Path) -> Result<HashMap<String, Artifact>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read cache file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse cache file {}", path.display()))
}
