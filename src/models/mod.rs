//! Data records produced by the fetch pipeline.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::VERSION_DATE_FORMAT;
use crate::spec::normalize_name;

/// Latest revision of a branch as reported by the commit feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRevision {
    /// Commit identifier taken from the feed entry link
    pub revision_id: String,
    /// Commit timestamp taken from the feed entry
    pub timestamp: DateTime<Utc>,
}

/// A plugin revision together with the checksum needed to fetch it
/// reproducibly.
///
/// Fields are declared in key order so serialized records come out sorted.
/// The on-disk form (cache file, live registry) never carries the timestamp:
/// entries are addressed by revision, and the date is re-read from the feed
/// on every run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Immutable revision identifier
    #[serde(rename = "commit")]
    pub revision_id: String,
    /// Whether the revision must be fetched with its submodules
    pub has_submodules: bool,
    /// Published name: alias if present, else repository name
    #[serde(rename = "name")]
    pub display_name: String,
    /// Content checksum of the fetched tree
    #[serde(rename = "sha256")]
    pub checksum: String,
    /// Commit timestamp, present once resolved in the current run
    #[serde(skip)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Artifact {
    /// Attribute name in the generated registry.
    pub fn normalized_name(&self) -> String {
        normalize_name(&self.display_name)
    }

    /// Version string (`YYYY-MM-DD` of the commit timestamp).
    pub fn version(&self) -> Result<String> {
        self.timestamp
            .map(|ts| ts.format(VERSION_DATE_FORMAT).to_string())
            .ok_or_else(|| anyhow!("Plugin '{}' has no resolved commit date", self.display_name))
    }
}
