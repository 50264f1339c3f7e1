//! Error types for the retrieval pipeline
//!
//! Messages are stable and never include API keys or raw query text.

use serde::{Deserialize, Serialize};

/// Errors produced by providers, the ranking/synthesis collaborators and the pipeline.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SearchError {
    /// The provider's rate limiter would not admit a request before the deadline.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Network failure, non-success status or timeout.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// The response body did not have the expected shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Every provider in the chain failed.
    #[error("no providers available: {0}")]
    NoProvidersAvailable(String),

    /// Answer synthesis did not finish inside its budget.
    #[error("synthesis timed out after {0}ms")]
    SynthesisTimeout(u64),

    /// The embedding service failed or returned mismatched vectors.
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// The run's cancellation token fired.
    #[error("cancelled")]
    Cancelled,

    /// Invalid configuration.
    #[error("config error: {0}")]
    Config(String),
}

impl SearchError {
    /// Classification used in transient records and responses
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RateLimited(_) => ErrorKind::RateLimited,
            Self::Unavailable(_) => ErrorKind::Unavailable,
            Self::MalformedResponse(_) => ErrorKind::MalformedResponse,
            Self::NoProvidersAvailable(_) => ErrorKind::NoProvidersAvailable,
            Self::SynthesisTimeout(_) => ErrorKind::SynthesisTimeout,
            Self::EmbeddingUnavailable(_) => ErrorKind::EmbeddingUnavailable,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Whether another attempt against the same collaborator could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<reqwest::Error> for SearchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Unavailable("request timed out".to_string())
        } else if err.is_decode() {
            Self::MalformedResponse(err.to_string())
        } else {
            Self::Unavailable(err.without_url().to_string())
        }
    }
}

/// Error classification carried in serializable records
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RateLimited,
    Unavailable,
    MalformedResponse,
    NoProvidersAvailable,
    SynthesisTimeout,
    EmbeddingUnavailable,
    Cancelled,
    Config,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimited => write!(f, "Rate limited"),
            Self::Unavailable => write!(f, "Unavailable"),
            Self::MalformedResponse => write!(f, "Malformed response"),
            Self::NoProvidersAvailable => write!(f, "No providers available"),
            Self::SynthesisTimeout => write!(f, "Synthesis timed out"),
            Self::EmbeddingUnavailable => write!(f, "Embedding unavailable"),
            Self::Cancelled => write!(f, "Cancelled"),
            Self::Config => write!(f, "Configuration error"),
        }
    }
}

/// Convenience alias for pipeline results
pub type Result<T> = std::result::Result<T, SearchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            SearchError::NoProvidersAvailable("primary: timeout".into()).to_string(),
            "no providers available: primary: timeout"
        );
        assert_eq!(
            SearchError::SynthesisTimeout(2500).to_string(),
            "synthesis timed out after 2500ms"
        );
        assert_eq!(SearchError::Cancelled.to_string(), "cancelled");
    }

    #[test]
    fn kind_mapping() {
        assert_eq!(
            SearchError::RateLimited("brave".into()).kind(),
            ErrorKind::RateLimited
        );
        assert_eq!(
            SearchError::EmbeddingUnavailable("x".into()).kind(),
            ErrorKind::EmbeddingUnavailable
        );
    }

    #[test]
    fn only_unavailable_is_retryable() {
        assert!(SearchError::Unavailable("reset".into()).is_retryable());
        assert!(!SearchError::MalformedResponse("x".into()).is_retryable());
        assert!(!SearchError::RateLimited("x".into()).is_retryable());
    }

    #[test]
    fn error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::NoProvidersAvailable).unwrap();
        assert_eq!(json, "\"no_providers_available\"");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SearchError>();
    }
}
