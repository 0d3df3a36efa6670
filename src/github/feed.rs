//! Commit feed parsing.
//!
//! The feed is a small Atom document; only the first `<entry>` is of
//! interest. Its `<link href>` ends in the commit identifier and its
//! `<updated>` element carries the commit time.

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use reqwest::Url;
use std::sync::LazyLock;

use super::LocatorError;
use crate::constants::FEED_TIMESTAMP_FORMAT;
use crate::models::ResolvedRevision;

static ENTRY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<entry\b[^>]*>(.*?)</entry>").expect("valid entry regex"));
static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<link\b[^>]*?\bhref\s*=\s*["']([^"']+)["']"#).expect("valid link regex"));
static UPDATED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<updated\b[^>]*>\s*(.*?)\s*</updated>").expect("valid updated regex")
});

/// Extract the latest revision from a commit feed.
///
/// `repo` only labels errors.
pub fn parse_latest_entry(repo: &str, xml: &str) -> Result<ResolvedRevision, LocatorError> {
    let entry = ENTRY_RE
        .captures(xml)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| LocatorError::Resolution {
            repo: repo.to_string(),
            reason: "no commits found in feed".to_string(),
        })?;

    let href = LINK_RE.captures(entry).and_then(|c| c.get(1)).map(|m| m.as_str()).ok_or_else(
        || LocatorError::Resolution {
            repo: repo.to_string(),
            reason: "no link tag found in feed entry".to_string(),
        },
    )?;

    let revision_id = revision_from_link(href).ok_or_else(|| LocatorError::Resolution {
        repo: repo.to_string(),
        reason: format!("feed entry link '{href}' does not name a commit"),
    })?;

    let updated = UPDATED_RE
        .captures(entry)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| LocatorError::Resolution {
            repo: repo.to_string(),
            reason: "no updated tag found in feed entry".to_string(),
        })?;

    let timestamp = parse_timestamp(updated).ok_or_else(|| LocatorError::Resolution {
        repo: repo.to_string(),
        reason: format!("unparsable updated timestamp '{updated}'"),
    })?;

    Ok(ResolvedRevision {
        revision_id,
        timestamp,
    })
}

/// Last path segment of the entry link.
fn revision_from_link(href: &str) -> Option<String> {
    let path = match Url::parse(href) {
        Ok(url) => url.path().to_string(),
        Err(_) => href.split(['?', '#']).next().unwrap_or_default().to_string(),
    };
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

/// Parse `%Y-%m-%dT%H:%M:%SZ` as UTC; offsets in RFC 3339 form are accepted
/// and converted.
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, FEED_TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .or_else(|_| DateTime::parse_from_rfc3339(value).map(|dt| dt.with_timezone(&Utc)))
        .ok()
}
