//! Repository locator.
//!
//! Finds the latest revision of a tracked branch through the repository's
//! commit feed, notices when the repository has moved, and probes for a
//! `.gitmodules` file to decide how the revision must be prefetched.
//!
//! All requests share one [`reqwest::Client`] with a per-request timeout and
//! an optional bearer token. Transient failures (connection errors,
//! timeouts, 429 and 5xx answers) are retried with the configured
//! [`RetryPolicy`]; everything else fails the plugin immediately.

pub mod feed;
pub mod redirect;

use anyhow::Result;
use reqwest::{StatusCode, Url};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

pub use redirect::{Redirect, RedirectMap, detect_redirect};

use crate::constants::{GITHUB_BASE_URL, HTTP_TIMEOUT};
use crate::models::ResolvedRevision;
use crate::spec::PluginSpec;
use crate::utils::RetryPolicy;

/// Per-plugin locator failures.
#[derive(Error, Debug)]
pub enum LocatorError {
    /// The feed was empty or an entry lacked a link or timestamp.
    #[error("Cannot resolve latest commit of {repo}: {reason}")]
    Resolution {
        /// `owner/repo`
        repo: String,
        /// What was missing
        reason: String,
    },

    /// The server answered with an unexpected status.
    #[error("HTTP {status} for {url}")]
    Http {
        /// Requested URL
        url: String,
        /// Status received
        status: StatusCode,
    },

    /// The request never produced a response.
    #[error("Request to {url} failed")]
    Transport {
        /// Requested URL
        url: String,
        /// Underlying client error
        #[source]
        source: reqwest::Error,
    },

    /// The repository moved somewhere that is not an owner/name pair on the
    /// same host.
    #[error("Repository {repo} redirected to unsupported location {location}")]
    UnsupportedRedirect {
        /// `owner/repo` as requested
        repo: String,
        /// Final URL reached
        location: String,
    },

    /// An URL could not be built for the plugin.
    #[error("Invalid URL for {repo}: {reason}")]
    InvalidUrl {
        /// `owner/repo`
        repo: String,
        /// Parser message
        reason: String,
    },
}

impl LocatorError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport {
                source,
                ..
            } => source.is_timeout() || source.is_connect() || source.is_request() || source.is_body(),
            Self::Http {
                status,
                ..
            } => status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS,
            Self::Resolution { .. } | Self::UnsupportedRedirect { .. } | Self::InvalidUrl { .. } => {
                false
            }
        }
    }
}

/// Latest revision of a spec plus the relocation observed on the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedRevision {
    /// Revision id and commit time
    pub revision: ResolvedRevision,
    /// Set when the repository answered from a new location
    pub redirect: Option<Redirect>,
}

/// Resolves plugin specs against their upstream hosting.
pub trait RepositoryLocator: Send + Sync + 'static {
    /// Latest revision of the plugin's branch.
    fn resolve_latest(&self, spec: &PluginSpec) -> impl Future<Output = Result<LocatedRevision>> + Send;

    /// Whether the branch tip declares submodules.
    fn has_submodules(&self, spec: &PluginSpec) -> impl Future<Output = Result<bool>> + Send;
}

/// Settings for [`GithubLocator`].
#[derive(Debug, Clone)]
pub struct LocatorOptions {
    /// Root URL repositories live under
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Optional token sent as a bearer credential
    pub token: Option<String>,
    /// Retry policy for transient failures
    pub retry: RetryPolicy,
}

impl Default for LocatorOptions {
    fn default() -> Self {
        Self {
            base_url: GITHUB_BASE_URL.to_string(),
            timeout: HTTP_TIMEOUT,
            token: None,
            retry: RetryPolicy::default(),
        }
    }
}

/// [`RepositoryLocator`] talking to GitHub's web endpoints.
pub struct GithubLocator {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    retry: RetryPolicy,
}

impl GithubLocator {
    /// Build a locator and its HTTP client.
    pub fn new(options: LocatorOptions) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("plugreg/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::limited(10))
            .timeout(options.timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {e}"))?;

        Ok(Self {
            client,
            base_url: options.base_url.trim_end_matches('/').to_string(),
            token: options.token,
            retry: options.retry,
        })
    }

    /// `<base>/<owner>/<repo>/<path>`
    pub fn repo_url(&self, spec: &PluginSpec, path: &str) -> Result<Url, LocatorError> {
        let raw = format!("{}/{}/{}/{}", self.base_url, spec.owner, spec.repo, path);
        Url::parse(&raw).map_err(|e| LocatorError::InvalidUrl {
            repo: spec.full_name(),
            reason: e.to_string(),
        })
    }

    async fn send(&self, url: &Url) -> Result<reqwest::Response, LocatorError> {
        let mut request = self.client.get(url.clone());
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        tracing::debug!(target: "github", "GET {}", url);
        request.send().await.map_err(|source| LocatorError::Transport {
            url: url.to_string(),
            source,
        })
    }

    /// One attempt at the commit feed: final URL and body.
    async fn fetch_feed(&self, url: &Url) -> Result<(Url, String), LocatorError> {
        let response = self.send(url).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LocatorError::Http {
                url: url.to_string(),
                status,
            });
        }
        let final_url = response.url().clone();
        let body = response.text().await.map_err(|source| LocatorError::Transport {
            url: url.to_string(),
            source,
        })?;
        Ok((final_url, body))
    }

    /// One attempt at the submodule probe.
    async fn probe_gitmodules(&self, url: &Url) -> Result<bool, LocatorError> {
        let response = self.send(url).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(LocatorError::Http {
                url: url.to_string(),
                status,
            }),
        }
    }
}

impl RepositoryLocator for GithubLocator {
    async fn resolve_latest(&self, spec: &PluginSpec) -> Result<LocatedRevision> {
        let url = self.repo_url(spec, &format!("commits/{}.atom", spec.branch))?;
        let label = spec.full_name();

        let (final_url, body) = {
            let url = &url;
            self.retry
                .run(&label, move || async move { self.fetch_feed(url).await }, LocatorError::is_transient)
                .await?
        };

        let redirect = detect_redirect(spec, &url, &final_url)?;
        let revision = feed::parse_latest_entry(&label, &body)?;
        tracing::debug!(
            target: "github",
            "{} @ {} -> {} ({})",
            label,
            spec.branch,
            revision.revision_id,
            revision.timestamp
        );

        Ok(LocatedRevision {
            revision,
            redirect,
        })
    }

    async fn has_submodules(&self, spec: &PluginSpec) -> Result<bool> {
        let url = self.repo_url(spec, &format!("blob/{}/.gitmodules", spec.branch))?;
        let label = spec.full_name();
        let url = &url;

        let found = self
            .retry
            .run(&label, move || async move { self.probe_gitmodules(url).await }, LocatorError::is_transient)
            .await?;
        Ok(found)
    }
}
