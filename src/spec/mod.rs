//! Plugin specification lines.
//!
//! Every tracked plugin is one line of the plugin list:
//!
//! ```text
//! owner/repo[@branch][ as alias]
//! ```
//!
//! Lines are parsed into [`PluginSpec`] values before any network activity so
//! that a single malformed line stops the run early.

use anyhow::{Context, Result};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use crate::constants::DEFAULT_BRANCH;
use crate::core::PlugregError;

/// Reasons a plugin line can be rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpecError {
    /// No `/` between owner and repository.
    #[error("missing '/' between owner and repository, must be in the format owner/repo[@branch][ as alias]")]
    MissingSeparator,

    /// More than one `/` in the line.
    #[error("too many '/' separators, must be in the format owner/repo[@branch][ as alias]")]
    TooManySeparators,

    /// Owner part is blank.
    #[error("owner must not be empty")]
    EmptyOwner,

    /// Repository part is blank.
    #[error("repository name must not be empty")]
    EmptyRepo,

    /// `@` present but nothing after it.
    #[error("branch must not be empty")]
    EmptyBranch,

    /// Owner or repository contains whitespace.
    #[error("'{0}' contains whitespace")]
    Whitespace(String),
}

/// One tracked plugin: where it lives and what to call it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PluginSpec {
    /// Repository owner (user or organization)
    pub owner: String,
    /// Repository name
    pub repo: String,
    /// Branch whose tip is tracked
    pub branch: String,
    /// Name to publish the plugin under instead of the repository name
    pub alias: Option<String>,
}

impl PluginSpec {
    /// Create a spec tracking the default branch.
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            branch: DEFAULT_BRANCH.to_string(),
            alias: None,
        }
    }

    /// Track a specific branch.
    #[must_use]
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    /// Publish under an alias.
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Parse a single plugin line.
    ///
    /// Surrounding whitespace is ignored. The branch defaults to
    /// [`DEFAULT_BRANCH`] and the alias to none.
    pub fn parse(line: &str) -> Result<Self, SpecError> {
        let line = line.trim();
        let (owner, rest) = line.split_once('/').ok_or(SpecError::MissingSeparator)?;
        if rest.contains('/') {
            return Err(SpecError::TooManySeparators);
        }

        let (rest, alias) = match rest.split_once(" as ") {
            Some((rest, alias)) => (rest, Some(alias.trim().to_string())),
            None => (rest, None),
        };

        let (repo, branch) = match rest.split_once('@') {
            Some((repo, branch)) => {
                let branch = branch.trim();
                if branch.is_empty() {
                    return Err(SpecError::EmptyBranch);
                }
                (repo, branch)
            }
            None => (rest, DEFAULT_BRANCH),
        };

        let owner = owner.trim();
        if owner.is_empty() {
            return Err(SpecError::EmptyOwner);
        }
        let repo = repo.trim();
        if repo.is_empty() {
            return Err(SpecError::EmptyRepo);
        }
        if let Some(name) = [owner, repo].into_iter().find(|s| s.contains(char::is_whitespace)) {
            return Err(SpecError::Whitespace(name.to_string()));
        }

        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            branch: branch.to_string(),
            alias,
        })
    }

    /// Name the plugin is published under: the alias if present, else the
    /// repository name.
    pub fn display_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.repo)
    }

    /// Attribute name derived from [`display_name`](Self::display_name).
    pub fn normalized_name(&self) -> String {
        normalize_name(self.display_name())
    }

    /// Same spec pointing at a different owner/repository, keeping the
    /// branch and alias.
    #[must_use]
    pub fn relocated(&self, owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            branch: self.branch.clone(),
            alias: self.alias.clone(),
        }
    }

    /// `owner/repo`, used to identify the plugin in logs and reports.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

/// Canonical line form: `@branch` only for non-default branches.
impl fmt::Display for PluginSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)?;
        if self.branch != DEFAULT_BRANCH {
            write!(f, "@{}", self.branch)?;
        }
        if let Some(alias) = &self.alias {
            write!(f, " as {alias}")?;
        }
        Ok(())
    }
}

impl FromStr for PluginSpec {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Replace `.` with `-` so the name is a valid attribute name.
pub fn normalize_name(name: &str) -> String {
    name.replace('.', "-")
}

/// Parse every non-blank line of `content`.
///
/// The first malformed line aborts with [`PlugregError::InvalidPluginLine`].
pub fn parse_plugin_list(content: &str) -> Result<Vec<PluginSpec>, PlugregError> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            PluginSpec::parse(line).map_err(|e| PlugregError::InvalidPluginLine {
                line: line.trim().to_string(),
                line_number: index + 1,
                reason: e.to_string(),
            })
        })
        .collect()
}

/// Read and parse the plugin list file.
pub fn load_plugin_spec(path: &Path) -> Result<Vec<PluginSpec>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read plugin list {}", path.display()))?;
    let specs = parse_plugin_list(&content)?;
    tracing::debug!("Loaded {} plugin specs from {}", specs.len(), path.display());
    Ok(specs)
}
