//! Pipeline request and response models

use crate::cache::CachedPayload;
use crate::error::{ErrorKind, SearchError};
use crate::query::RecencyWindow;
use crate::results::{Citation, ProviderAttempt, RankedResultSet};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// One call into the pipeline
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    /// Raw query text; `!day`-style bangs are honoured
    pub query: String,
    /// Overrides any recency bang in the text
    pub recency: Option<RecencyWindow>,
    /// Falls back to `pipeline.default_max_results`
    pub max_results: Option<usize>,
    pub synthesize: bool,
    /// Earlier conversation turns; part of the cache key
    pub context: Option<String>,
    /// Falls back to `pipeline.budget_ms`
    pub budget: Option<Duration>,
    /// Caller-owned token; cancelling it aborts the run
    pub cancel: Option<CancellationToken>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_recency(mut self, recency: RecencyWindow) -> Self {
        self.recency = Some(recency);
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = Some(max_results);
        self
    }

    /// Ask for a synthesized, cited answer
    pub fn with_synthesis(mut self) -> Self {
        self.synthesize = true;
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Pipeline output; always produced, errors included
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: RankedResultSet,
    pub answer: Option<String>,
    /// `answer` with citation markers rendered as `<sup>` elements
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer_markup: Option<String>,
    pub citations: Vec<Citation>,
    pub cached: bool,
    pub elapsed_ms: u64,
    pub low_confidence: bool,
    pub semantic_degraded: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub providers: Vec<ProviderAttempt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl SearchResponse {
    /// Empty response describing why nothing was found
    pub fn failed(err: &SearchError, elapsed_ms: u64) -> Self {
        Self {
            elapsed_ms,
            error: Some(err.kind()),
            reason: Some(err.to_string()),
            low_confidence: true,
            ..Default::default()
        }
    }

    pub fn from_payload(payload: CachedPayload, cached: bool, elapsed_ms: u64) -> Self {
        Self {
            results: payload.results,
            answer: payload.answer,
            citations: payload.citations,
            cached,
            elapsed_ms,
            low_confidence: payload.low_confidence,
            semantic_degraded: payload.semantic_degraded,
            ..Default::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = SearchRequest::new("tesla earnings")
            .with_recency(RecencyWindow::Week)
            .with_max_results(3)
            .with_synthesis()
            .with_budget(Duration::from_secs(2));

        assert_eq!(request.query, "tesla earnings");
        assert_eq!(request.recency, Some(RecencyWindow::Week));
        assert_eq!(request.max_results, Some(3));
        assert!(request.synthesize);
        assert!(request.cancel.is_none());
    }

    #[test]
    fn test_failed_response_serializes_error() {
        let response = SearchResponse::failed(
            &SearchError::NoProvidersAvailable("brave: unavailable".into()),
            12,
        );
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["error"], "no_providers_available");
        assert_eq!(json["elapsedMs"], 12);
        assert_eq!(json["results"], serde_json::json!([]));
        assert!(json["answer"].is_null());
        assert!(json.as_object().unwrap().contains_key("answer"));
        assert!(!response.is_ok());
    }
}
