//! Embedding-based semantic similarity

use crate::config::EmbeddingSettings;
use crate::error::{Result, SearchError};
use crate::network::HttpRequest;
use crate::scheduler::{run_with_policy, CallPolicy, RunContext};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Produces one embedding vector per input text
#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    /// Embed `texts`, returning vectors in input order
    async fn embed(&self, texts: &[String], ctx: &RunContext) -> Result<Vec<Vec<f32>>>;
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EmbeddingResponse {
    Bare(Vec<Vec<f32>>),
    Wrapped { embeddings: Vec<Vec<f32>> },
    Data { data: Vec<EmbeddingDatum> },
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

impl EmbeddingResponse {
    fn into_vectors(self) -> Vec<Vec<f32>> {
        match self {
            Self::Bare(vectors) | Self::Wrapped { embeddings: vectors } => vectors,
            Self::Data { data } => data.into_iter().map(|d| d.embedding).collect(),
        }
    }
}

fn embedding_timeout(label: &str, timeout: Duration) -> SearchError {
    SearchError::EmbeddingUnavailable(format!(
        "{label}: timed out after {}ms",
        timeout.as_millis()
    ))
}

/// Embedding service reached over HTTP
pub struct HttpEmbedder {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    policy: CallPolicy,
}

impl HttpEmbedder {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: None,
            policy: CallPolicy::new(Duration::from_secs(2)).on_timeout(embedding_timeout),
        }
    }

    pub fn from_settings(settings: &EmbeddingSettings, timeout: Duration) -> Self {
        Self::new(&settings.endpoint, &settings.model)
            .with_api_key(settings.api_key.clone())
            .with_timeout(timeout)
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.policy.timeout = timeout;
        self
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn name(&self) -> &str {
        "embedding"
    }

    async fn embed(&self, texts: &[String], ctx: &RunContext) -> Result<Vec<Vec<f32>>> {
        let request = HttpRequest::post(&self.endpoint)
            .bearer(self.api_key.as_deref())
            .json(json!({ "model": self.model, "input": texts }));

        let vectors = run_with_policy(ctx, &self.policy, self.name(), |timeout| {
            let request = request.clone();
            async move {
                let response = ctx.lease().execute_with_timeout(request, timeout).await?;
                response.error_for_status("embedding")?;
                let parsed: EmbeddingResponse = response.json()?;
                Ok(parsed.into_vectors())
            }
        })
        .await
        .map_err(|e| match e {
            SearchError::Cancelled | SearchError::EmbeddingUnavailable(_) => e,
            other => SearchError::EmbeddingUnavailable(other.to_string()),
        })?;

        validate_vectors(&vectors, texts.len())?;
        debug!("Embedded {} texts", texts.len());
        Ok(vectors)
    }
}

/// Vector count must match the inputs, every vector must share one dimension
/// and every component must be finite
pub fn validate_vectors(vectors: &[Vec<f32>], expected: usize) -> Result<()> {
    if vectors.len() != expected {
        return Err(SearchError::EmbeddingUnavailable(format!(
            "expected {expected} vectors, got {}",
            vectors.len()
        )));
    }
    if let Some(first) = vectors.first() {
        let dim = first.len();
        if dim == 0 || vectors.iter().any(|v| v.len() != dim) {
            return Err(SearchError::EmbeddingUnavailable(
                "embedding dimensions disagree".into(),
            ));
        }
    }
    if vectors.iter().flatten().any(|x| !x.is_finite()) {
        return Err(SearchError::EmbeddingUnavailable(
            "embedding has non-finite components".into(),
        ));
    }
    Ok(())
}

/// Cosine similarity; zero vectors are orthogonal to everything
pub fn cosine(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let similarity = dot / (norm_a.sqrt() * norm_b.sqrt());
    if similarity.is_finite() {
        similarity
    } else {
        0.0
    }
}

/// Cosine mapped from [-1, 1] onto [0, 1]
pub fn similarity_score(a: &[f32], b: &[f32]) -> f64 {
    ((cosine(a, b) + 1.0) / 2.0).clamp(0.0, 1.0)
}
