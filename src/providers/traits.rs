//! Provider traits and shared parsing helpers

use crate::error::Result;
use crate::network::{HttpRequest, HttpResponse};
use crate::query::{Query, RecencyWindow};
use crate::results::SourceRecord;
use crate::scheduler::RunContext;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;
use url::Url;

/// Parameters for building a provider request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderParams {
    /// Search query string
    pub query: String,
    /// Recency filter
    pub recency: Option<RecencyWindow>,
    /// Result-count hint
    pub count: usize,
}

impl ProviderParams {
    pub fn from_query(query: &Query) -> Self {
        Self {
            query: query.text().to_string(),
            recency: query.recency_window(),
            count: query.max_results(),
        }
    }
}

/// Wire-format adapter for one search backend
///
/// Adapters only build requests and parse responses; transport, rate
/// limiting and timeouts belong to [`super::ProviderClient`].
pub trait ProviderAdapter: Send + Sync {
    /// Provider name
    fn name(&self) -> &str;

    /// Timeout used when the configuration does not set one
    fn default_timeout(&self) -> Duration {
        Duration::from_secs(2)
    }

    /// Build the HTTP request for a search
    fn request(&self, params: &ProviderParams) -> Result<HttpRequest>;

    /// Parse the HTTP response into unscored records
    fn response(&self, response: HttpResponse) -> Result<Vec<SourceRecord>>;
}

/// A search backend as seen by the orchestrator
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Provider name, used in records, logs and metrics
    fn name(&self) -> &str;

    /// Search within the run's deadline; never panics
    async fn search(&self, query: &Query, ctx: &RunContext) -> Result<Vec<SourceRecord>>;
}

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid tag pattern"));

/// Strip markup some backends embed in snippets and collapse whitespace
pub fn clean_text(raw: &str) -> String {
    let text = TAG_RE.replace_all(raw, " ");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse the date formats providers are seen to emit
pub fn parse_published(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.and_utc());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Build a record from provider fields, skipping unusable entries
pub fn build_record(
    provider: &str,
    title: &str,
    url: &str,
    snippet: &str,
    published: Option<&str>,
) -> Option<SourceRecord> {
    let title = clean_text(title);
    if title.is_empty() {
        return None;
    }
    let parsed = Url::parse(url.trim()).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    Some(
        SourceRecord::new(parsed.to_string(), title, provider)
            .with_snippet(clean_text(snippet))
            .with_published_at(published.and_then(parse_published)),
    )
}
