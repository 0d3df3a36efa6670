//! Detection of moved or renamed upstream repositories.
//!
//! GitHub answers requests for a renamed repository with an HTTP redirect to
//! the new location. When the feed request ends up at a different URL, the
//! first two path segments of the final URL are the new owner and name, and
//! the plugin line is rewritten to point there.

use reqwest::Url;
use std::collections::BTreeMap;

use super::LocatorError;
use crate::spec::PluginSpec;

/// Old plugin line → new plugin line, both in canonical form.
pub type RedirectMap = BTreeMap<String, String>;

/// A single observed relocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    /// Canonical line of the plugin as requested
    pub old_line: String,
    /// Canonical line pointing at the new location, alias and branch kept
    pub new_line: String,
}

/// Compare the requested and final URL of a request for `spec`.
///
/// Returns `Ok(None)` when nothing moved. A final URL on another host or
/// with fewer than two path segments cannot be mapped back to an
/// owner/name pair and is rejected with
/// [`LocatorError::UnsupportedRedirect`].
pub fn detect_redirect(
    spec: &PluginSpec,
    requested: &Url,
    final_url: &Url,
) -> Result<Option<Redirect>, LocatorError> {
    if requested == final_url {
        return Ok(None);
    }

    let unsupported = || LocatorError::UnsupportedRedirect {
        repo: spec.full_name(),
        location: final_url.to_string(),
    };

    if requested.host_str() != final_url.host_str() {
        return Err(unsupported());
    }

    let mut segments = final_url
        .path_segments()
        .ok_or_else(unsupported)?
        .filter(|segment| !segment.is_empty());
    let (Some(owner), Some(name)) = (segments.next(), segments.next()) else {
        return Err(unsupported());
    };

    if owner == spec.owner && name == spec.repo {
        return Ok(None);
    }

    let moved = spec.relocated(owner, name);
    tracing::info!(
        target: "github",
        "Repository {} moved to {}",
        spec.full_name(),
        moved.full_name()
    );

    Ok(Some(Redirect {
        old_line: spec.to_string(),
        new_line: moved.to_string(),
    }))
}
