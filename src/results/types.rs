//! Result type definitions

use crate::error::ErrorKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// A single candidate document
///
/// Created by the orchestrator from provider output. The ranking engine
/// fills in the score fields and, once the order is final, the `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SourceRecord {
    /// Rank-order id ("1", "2", ...); empty until the ranked set is frozen
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    pub provider_name: String,
    #[serde(default)]
    pub lexical_score: f64,
    #[serde(default)]
    pub semantic_score: f64,
    #[serde(default)]
    pub composite_score: f64,
}

impl SourceRecord {
    /// Create a new unscored record
    pub fn new(
        url: impl Into<String>,
        title: impl Into<String>,
        provider_name: impl Into<String>,
    ) -> Self {
        Self {
            id: String::new(),
            title: title.into(),
            url: url.into(),
            snippet: String::new(),
            published_at: None,
            provider_name: provider_name.into(),
            lexical_score: 0.0,
            semantic_score: 0.0,
            composite_score: 0.0,
        }
    }

    /// Add a snippet to the record
    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = snippet.into();
        self
    }

    /// Add a publication time
    pub fn with_published_at(mut self, published_at: Option<DateTime<Utc>>) -> Self {
        self.published_at = published_at;
        self
    }

    /// Text that ranking and citation verification look at
    pub fn scoring_text(&self) -> String {
        if self.snippet.is_empty() {
            self.title.clone()
        } else {
            format!("{} {}", self.title, self.snippet)
        }
    }

    /// Get the hostname from the URL
    pub fn hostname(&self) -> Option<String> {
        Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
    }
}

/// Ranked, id-frozen result set
///
/// `composite_score` is non-increasing across the sequence and ids run
/// `1..=len()`. There is no API to reorder or rescore once built.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct RankedResultSet {
    records: Vec<SourceRecord>,
}

impl RankedResultSet {
    /// Sort by composite score (stable, ties keep input order), truncate and assign ids.
    pub fn freeze(mut records: Vec<SourceRecord>, max_results: usize) -> Self {
        records.sort_by(|a, b| b.composite_score.total_cmp(&a.composite_score));
        records.truncate(max_results);
        for (index, record) in records.iter_mut().enumerate() {
            record.id = (index + 1).to_string();
        }
        Self { records }
    }

    /// Look up a record by its citation id
    pub fn get(&self, id: &str) -> Option<&SourceRecord> {
        let index: usize = id.parse().ok()?;
        self.by_index(index)
    }

    /// Look up a record by its 1-based rank
    pub fn by_index(&self, index: usize) -> Option<&SourceRecord> {
        index.checked_sub(1).and_then(|i| self.records.get(i))
    }

    pub fn records(&self) -> &[SourceRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SourceRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<SourceRecord> {
        self.records
    }
}

impl<'a> IntoIterator for &'a RankedResultSet {
    type Item = &'a SourceRecord;
    type IntoIter = std::slice::Iter<'a, SourceRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Confidence annotation for one cited source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    pub citation_id: String,
    /// Jaccard overlap between the citing sentence and the source, in [0, 1]
    pub overlap_ratio: f64,
    /// Low-confidence marker; advisory only
    pub flagged: bool,
}

impl Citation {
    /// A citation that has not been checked against its source
    pub fn unverified(citation_id: impl Into<String>) -> Self {
        Self {
            citation_id: citation_id.into(),
            overlap_ratio: 0.0,
            flagged: false,
        }
    }
}

/// Location of a `[n]` marker inside a text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CitationMarker {
    pub citation_id: String,
    /// Byte offset of `[`
    pub start: usize,
    /// Byte offset one past `]`
    pub end: usize,
}

/// Output of one provider call; lives for one orchestration round
#[derive(Debug, Clone)]
pub struct ProviderCallResult {
    pub provider_name: String,
    pub results: Vec<SourceRecord>,
    pub elapsed_ms: u64,
    pub error: Option<ErrorKind>,
}

impl ProviderCallResult {
    /// Summary kept after the records have been merged
    pub fn attempt(&self) -> ProviderAttempt {
        ProviderAttempt {
            provider_name: self.provider_name.clone(),
            result_count: self.results.len(),
            elapsed_ms: self.elapsed_ms,
            error: self.error,
        }
    }
}

/// Provider call summary carried with the raw result set
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderAttempt {
    pub provider_name: String,
    pub result_count: usize,
    pub elapsed_ms: u64,
    pub error: Option<ErrorKind>,
}

/// Deduplicated provider output, in provider order
#[derive(Debug, Clone, Default)]
pub struct RawResultSet {
    pub records: Vec<SourceRecord>,
    pub attempts: Vec<ProviderAttempt>,
    /// Fewer unique results than the confidence floor
    pub low_confidence: bool,
}

impl RawResultSet {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(title: &str, score: f64) -> SourceRecord {
        let mut record = SourceRecord::new(
            format!("https://example.com/{title}"),
            title,
            "test",
        );
        record.composite_score = score;
        record
    }

    #[test]
    fn test_freeze_orders_and_assigns_ids() {
        let ranked = RankedResultSet::freeze(
            vec![scored("a", 0.2), scored("b", 0.9), scored("c", 0.5)],
            10,
        );
        let titles: Vec<_> = ranked.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["b", "c", "a"]);
        let ids: Vec<_> = ranked.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_freeze_ties_keep_input_order() {
        let ranked = RankedResultSet::freeze(
            vec![scored("first", 0.5), scored("second", 0.5), scored("third", 0.5)],
            2,
        );
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked.get("1").unwrap().title, "first");
        assert_eq!(ranked.get("2").unwrap().title, "second");
    }

    #[test]
    fn test_lookup_out_of_range() {
        let ranked = RankedResultSet::freeze(vec![scored("a", 1.0)], 5);
        assert!(ranked.get("0").is_none());
        assert!(ranked.get("2").is_none());
        assert!(ranked.get("x").is_none());
        assert_eq!(ranked.by_index(1).unwrap().title, "a");
    }

    #[test]
    fn test_serializes_camel_case() {
        let record = SourceRecord::new("https://a.com", "A", "brave").with_snippet("s");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["providerName"], "brave");
        assert!(json.get("id").is_none());
        assert!(json.get("publishedAt").is_none());
    }

    #[test]
    fn test_hostname() {
        let record = SourceRecord::new("https://www.reuters.com/x", "A", "brave");
        assert_eq!(record.hostname().as_deref(), Some("www.reuters.com"));
    }
}
