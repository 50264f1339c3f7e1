//! Pipeline entry point: cache → orchestrate → rank → synthesize → verify

use super::models::{SearchRequest, SearchResponse};
use super::orchestrator::Orchestrator;
use crate::cache::{CachedPayload, Fingerprint, ResultCache};
use crate::citation::CitationEngine;
use crate::config::{PipelineSettings, Settings};
use crate::error::{Result, SearchError};
use crate::metrics::Metrics;
use crate::network::{ConnectionPool, ShutdownReport};
use crate::providers::{ProviderLoader, ProviderRegistry};
use crate::query::Query;
use crate::ranking::{Embedder, HttpEmbedder, RankingEngine};
use crate::results::ProviderAttempt;
use crate::scheduler::RunContext;
use crate::synthesis::{CompletionClient, HttpCompletionClient, Synthesizer};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// The retrieval-and-ranking pipeline
///
/// One instance serves any number of concurrent `search` calls; each run
/// holds a lease on the shared connection pool until it finishes.
pub struct SearchPipeline {
    settings: PipelineSettings,
    pool: ConnectionPool,
    orchestrator: Orchestrator,
    ranker: RankingEngine,
    citations: CitationEngine,
    synthesizer: Option<Synthesizer>,
    cache: ResultCache,
    metrics: Arc<Metrics>,
}

impl SearchPipeline {
    /// Assemble a pipeline from explicit collaborators
    pub fn new(
        settings: &Settings,
        providers: ProviderRegistry,
        embedder: Option<Arc<dyn Embedder>>,
        completion: Option<Arc<dyn CompletionClient>>,
    ) -> Result<Self> {
        let pool = ConnectionPool::with_settings(&settings.outgoing)?;
        let metrics = Arc::new(Metrics::new());

        let synthesizer = completion.map(|client| {
            Synthesizer::new(client, settings.synthesis.clone().unwrap_or_default())
        });

        Ok(Self {
            settings: settings.pipeline.clone(),
            pool,
            orchestrator: Orchestrator::from_settings(providers, &settings.pipeline, metrics.clone()),
            ranker: RankingEngine::new(settings.ranking.clone(), embedder, metrics.clone()),
            citations: CitationEngine::new(&settings.citation),
            synthesizer,
            cache: ResultCache::new(&settings.cache),
            metrics,
        })
    }

    /// Build HTTP providers, embedder and completion client from settings
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        settings.validate()?;
        let providers = ProviderLoader::load(settings)?;

        let embedder = settings.embedding.as_ref().map(|e| {
            let timeout = Duration::from_millis(settings.ranking.semantic_timeout_ms);
            Arc::new(HttpEmbedder::from_settings(e, timeout)) as Arc<dyn Embedder>
        });
        let completion = settings
            .synthesis
            .as_ref()
            .map(|s| Arc::new(HttpCompletionClient::from_settings(s)) as Arc<dyn CompletionClient>);

        info!(
            "{} ready: providers {:?}, embedder {}, synthesis {}",
            settings.general.instance_name,
            providers.names(),
            embedder.is_some(),
            completion.is_some()
        );
        Self::new(settings, providers, embedder, completion)
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn providers(&self) -> &ProviderRegistry {
        self.orchestrator.registry()
    }

    /// Run one query end to end. Never fails: problems are reported in
    /// the response's `error` and `reason`.
    pub async fn search(&self, request: SearchRequest) -> SearchResponse {
        let started = Instant::now();
        self.metrics.inc_run();

        let max_results = request
            .max_results
            .unwrap_or(self.settings.default_max_results);
        let query = Query::parse(&request.query, max_results).with_recency(request.recency);
        if query.is_empty() {
            return SearchResponse {
                reason: Some("empty query".into()),
                ..Default::default()
            };
        }
        debug!("Search for {:?} ({:?})", query.text(), query.filters());

        let fingerprint = Fingerprint::new(query.text(), request.context.as_deref(), query.filters());
        if let Some(payload) = self.lookup(&fingerprint, request.synthesize).await {
            self.metrics.record_cache(true);
            info!("Serving cached response for {}", fingerprint);
            let mut response = SearchResponse::from_payload(payload, true, elapsed_ms(started));
            response.answer_markup = self.markup(&response);
            return response;
        }
        // An answer was asked for but none is cached: reuse ranked results
        // from an earlier run instead of going back to the providers.
        let reused = if request.synthesize {
            self.cache.get_results(&fingerprint).await
        } else {
            None
        };
        self.metrics.record_cache(reused.is_some());

        let lease = match self.pool.acquire() {
            Ok(lease) => lease,
            Err(err) => {
                warn!("Cannot start run: {}", err);
                return SearchResponse::failed(&err, elapsed_ms(started));
            }
        };
        let budget = request.budget.unwrap_or_else(|| self.settings.budget());
        let cancel = request.cancel.clone().unwrap_or_default();
        let ctx = RunContext::new(lease, budget, cancel);

        let response = self
            .run(&query, &request, fingerprint, reused, &ctx, started)
            .await;

        ctx.lease().release();
        info!(
            "Run {} finished in {}ms with {} results",
            ctx.run_id(),
            response.elapsed_ms,
            response.results.len()
        );
        response
    }

    async fn lookup(&self, fingerprint: &Fingerprint, synthesize: bool) -> Option<CachedPayload> {
        if synthesize {
            return self.cache.get_answer(fingerprint).await;
        }
        if let Some(payload) = self.cache.get_results(fingerprint).await {
            return Some(payload);
        }
        self.cache.get_answer(fingerprint).await.map(|payload| CachedPayload {
            answer: None,
            citations: Vec::new(),
            ..payload
        })
    }

    async fn run(
        &self,
        query: &Query,
        request: &SearchRequest,
        fingerprint: Fingerprint,
        reused: Option<CachedPayload>,
        ctx: &RunContext,
        started: Instant,
    ) -> SearchResponse {
        let (mut payload, attempts, cached) = match reused {
            Some(payload) => {
                debug!("Run {} reuses cached results for {}", ctx.run_id(), fingerprint);
                (payload, Vec::new(), true)
            }
            None => match self.retrieve(query, &fingerprint, ctx).await {
                Ok((payload, attempts)) => (payload, attempts, false),
                Err(err) => {
                    warn!("Run {} retrieved nothing: {}", ctx.run_id(), err);
                    return SearchResponse::failed(&err, elapsed_ms(started));
                }
            },
        };

        let mut failure: Option<SearchError> = None;
        if request.synthesize {
            match self.synthesize(query, &payload, request.context.as_deref(), ctx).await {
                Ok(answer) => {
                    payload.citations = self.citations.verify(&answer, &payload.results);
                    payload.answer = Some(answer);
                    self.cache.put_answer(fingerprint, &payload).await;
                }
                Err(err) => {
                    warn!("Run {} has no answer: {}", ctx.run_id(), err);
                    self.metrics.record_synthesis_failure();
                    failure = Some(err);
                }
            }
        }

        let mut response = SearchResponse::from_payload(payload, cached, elapsed_ms(started));
        response.answer_markup = self.markup(&response);
        response.providers = attempts;
        if let Some(err) = failure {
            response.error = Some(err.kind());
            response.reason = Some(err.to_string());
        }
        response
    }

    /// Orchestrate and rank, caching non-empty results
    async fn retrieve(
        &self,
        query: &Query,
        fingerprint: &Fingerprint,
        ctx: &RunContext,
    ) -> Result<(CachedPayload, Vec<ProviderAttempt>)> {
        let raw = self.orchestrator.orchestrate(query, ctx).await?;

        let outcome = self.ranker.rank(query, &raw, ctx).await;
        if ctx.is_cancelled() {
            return Err(SearchError::Cancelled);
        }

        let payload = CachedPayload {
            results: outcome.ranked,
            low_confidence: raw.low_confidence,
            semantic_degraded: outcome.semantic_degraded,
            ..Default::default()
        };
        if !payload.results.is_empty() {
            self.cache.put_results(fingerprint.clone(), &payload).await;
        }
        Ok((payload, raw.attempts))
    }

    async fn synthesize(
        &self,
        query: &Query,
        payload: &CachedPayload,
        context: Option<&str>,
        ctx: &RunContext,
    ) -> Result<String> {
        let synthesizer = self
            .synthesizer
            .as_ref()
            .ok_or_else(|| SearchError::Unavailable("answer synthesis is not configured".into()))?;
        synthesizer
            .synthesize(query, &payload.results, context, ctx)
            .await
    }

    fn markup(&self, response: &SearchResponse) -> Option<String> {
        response
            .answer
            .as_ref()
            .map(|answer| self.citations.render(answer, &response.results))
    }

    /// Drain and close the shared connection pool. Later calls are no-ops.
    pub async fn shutdown(&self) -> ShutdownReport {
        self.pool.shutdown(self.pool.drain_timeout()).await
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
