//! Composite ranking: lexical and semantic passes joined under one cap

use super::lexical::Bm25;
use super::semantic::{similarity_score, Embedder};
use crate::config::{RankingSettings, RankingWeights};
use crate::error::{Result, SearchError};
use crate::metrics::Metrics;
use crate::query::Query;
use crate::results::{RankedResultSet, RawResultSet, SourceRecord};
use crate::scheduler::RunContext;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Ranked set plus whether the semantic pass had to be skipped
#[derive(Debug, Clone)]
pub struct RankOutcome {
    pub ranked: RankedResultSet,
    pub semantic_degraded: bool,
}

/// Scores a window of candidates and freezes the final order
pub struct RankingEngine {
    settings: RankingSettings,
    bm25: Bm25,
    embedder: Option<Arc<dyn Embedder>>,
    metrics: Arc<Metrics>,
}

impl RankingEngine {
    pub fn new(
        settings: RankingSettings,
        embedder: Option<Arc<dyn Embedder>>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            bm25: Bm25::from_settings(&settings),
            settings,
            embedder,
            metrics,
        }
    }

    pub fn settings(&self) -> &RankingSettings {
        &self.settings
    }

    /// Rank `raw` for `query`, keeping at most `query.max_results()` records
    pub async fn rank(&self, query: &Query, raw: &RawResultSet, ctx: &RunContext) -> RankOutcome {
        let mut records = raw.records.clone();
        let window = self.settings.window.min(records.len());
        let texts: Vec<String> = records[..window].iter().map(SourceRecord::scoring_text).collect();

        let started = Instant::now();
        let (lexical, semantic) = tokio::join!(
            async { self.bm25.score(query.text(), &texts) },
            self.semantic_pass(query.text(), &texts, ctx)
        );
        debug!("Ranking passes joined in {:?}", started.elapsed());

        let (semantic, degraded) = match semantic {
            Ok(scores) => (scores, false),
            Err(err) => {
                if self.embedder.is_some() {
                    warn!("Semantic scoring degraded: {}", err);
                    self.metrics.record_semantic_degraded();
                } else {
                    debug!("No embedder configured; ranking lexically");
                }
                (vec![self.settings.neutral_semantic; window], true)
            }
        };

        let weights = if degraded {
            RankingWeights {
                lexical: 1.0,
                semantic: 0.0,
            }
        } else {
            self.settings.weights
        };

        for (index, record) in records.iter_mut().enumerate() {
            if index < window {
                record.lexical_score = lexical[index];
                record.semantic_score = semantic[index];
                record.composite_score =
                    weights.lexical * record.lexical_score + weights.semantic * record.semantic_score;
            } else {
                record.lexical_score = 0.0;
                record.semantic_score = 0.0;
                record.composite_score = 0.0;
            }
        }

        let ranked = RankedResultSet::freeze(records, query.max_results());
        info!(
            "Ranked {} of {} candidates (semantic degraded: {})",
            ranked.len(),
            raw.len(),
            degraded
        );

        RankOutcome {
            ranked,
            semantic_degraded: degraded,
        }
    }

    /// Semantic scores for `texts`, bounded by its own timeout and the join cap
    async fn semantic_pass(
        &self,
        query: &str,
        texts: &[String],
        ctx: &RunContext,
    ) -> Result<Vec<f64>> {
        let embedder = self
            .embedder
            .as_ref()
            .ok_or_else(|| SearchError::EmbeddingUnavailable("no embedder configured".into()))?;
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let budget = Duration::from_millis(self.settings.semantic_timeout_ms).min(self.settings.join_cap());
        let scoped = ctx.child(budget);

        let mut inputs = Vec::with_capacity(texts.len() + 1);
        inputs.push(query.to_string());
        inputs.extend(texts.iter().cloned());

        let vectors = tokio::select! {
            biased;
            _ = scoped.cancel_token().cancelled() => return Err(SearchError::Cancelled),
            outcome = tokio::time::timeout_at(scoped.deadline(), embedder.embed(&inputs, &scoped)) => {
                outcome.map_err(|_| {
                    SearchError::EmbeddingUnavailable(format!("timed out after {}ms", budget.as_millis()))
                })??
            }
        };

        super::semantic::validate_vectors(&vectors, inputs.len())?;
        let (query_vector, doc_vectors) = vectors
            .split_first()
            .ok_or_else(|| SearchError::EmbeddingUnavailable("empty embedding response".into()))?;

        Ok(doc_vectors
            .iter()
            .map(|v| similarity_score(query_vector, v))
            .collect())
    }
}
