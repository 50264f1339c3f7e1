//! Provider orchestration: primary → fallback under one wall-clock budget

use crate::config::{PipelineSettings, ProviderPolicy};
use crate::error::{Result, SearchError};
use crate::metrics::Metrics;
use crate::providers::{ProviderRegistry, SearchProvider};
use crate::query::Query;
use crate::results::{ProviderCallResult, RawResultSet, ResultContainer};
use crate::scheduler::RunContext;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Search orchestrator that walks the provider chain for one query
pub struct Orchestrator {
    registry: ProviderRegistry,
    policy: ProviderPolicy,
    budget: Duration,
    min_confident_results: usize,
    metrics: Arc<Metrics>,
}

impl Orchestrator {
    /// Create an orchestrator with default pipeline settings
    pub fn new(registry: ProviderRegistry, metrics: Arc<Metrics>) -> Self {
        Self::from_settings(registry, &PipelineSettings::default(), metrics)
    }

    pub fn from_settings(
        registry: ProviderRegistry,
        settings: &PipelineSettings,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            registry,
            policy: settings.policy,
            budget: settings.orchestrator_budget(),
            min_confident_results: settings.min_confident_results,
            metrics,
        }
    }

    /// Set provider policy
    pub fn with_policy(mut self, policy: ProviderPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the orchestration budget
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Fetch and deduplicate candidates for `query`.
    ///
    /// Only fails with `NoProvidersAvailable` (every provider failed) or
    /// `Cancelled`; a budget exhausted mid-chain returns what was collected.
    pub async fn orchestrate(&self, query: &Query, ctx: &RunContext) -> Result<RawResultSet> {
        if self.registry.is_empty() {
            return Err(SearchError::NoProvidersAvailable(
                "no providers registered".into(),
            ));
        }

        let round = ctx.child(self.budget);
        let mut container = ResultContainer::new();

        info!(
            "Orchestrating run {} over {} providers ({:?})",
            round.run_id(),
            self.registry.len(),
            self.policy
        );

        match self.policy {
            ProviderPolicy::Fallback => self.run_fallback(query, &round, &mut container).await,
            ProviderPolicy::Merge => self.run_merge(query, &round, &mut container).await,
        }

        if container.result_count() == 0 {
            if ctx.is_cancelled() {
                return Err(SearchError::Cancelled);
            }
            if !container.has_success() {
                let summary = container
                    .attempts()
                    .iter()
                    .map(|a| match a.error {
                        Some(kind) => format!("{}: {}", a.provider_name, kind),
                        None => format!("{}: ok", a.provider_name),
                    })
                    .collect::<Vec<_>>()
                    .join("; ");
                let summary = if summary.is_empty() {
                    "budget exhausted before any provider was called".to_string()
                } else {
                    summary
                };
                return Err(SearchError::NoProvidersAvailable(summary));
            }
        }

        let raw = container.into_raw(self.min_confident_results);
        if raw.low_confidence {
            debug!("Run {} is low confidence ({} results)", round.run_id(), raw.len());
        }
        Ok(raw)
    }

    /// Primary first; the next provider only when the previous one came back empty-handed
    async fn run_fallback(&self, query: &Query, round: &RunContext, container: &mut ResultContainer) {
        for (position, provider) in self.registry.chain().iter().enumerate() {
            if round.is_cancelled() {
                break;
            }
            if round.is_expired() {
                warn!(
                    "Orchestration budget exhausted before {}; returning partial results",
                    provider.name()
                );
                break;
            }
            if position > 0 {
                info!("Falling back to provider {}", provider.name());
            }

            let call = self.call(provider.as_ref(), query, round).await;
            let satisfied = call.error.is_none() && !call.results.is_empty();
            container.add_call(call);
            if satisfied {
                break;
            }
        }
    }

    /// Every provider at once, merged in priority order
    async fn run_merge(&self, query: &Query, round: &RunContext, container: &mut ResultContainer) {
        let calls = join_all(
            self.registry
                .chain()
                .iter()
                .map(|provider| self.call(provider.as_ref(), query, round)),
        )
        .await;

        for call in calls {
            container.add_call(call);
        }
    }

    /// Call one provider, bounded by the round deadline whatever the provider does
    async fn call(
        &self,
        provider: &dyn SearchProvider,
        query: &Query,
        round: &RunContext,
    ) -> ProviderCallResult {
        let name = provider.name().to_string();
        let start = Instant::now();

        let outcome = tokio::select! {
            biased;
            _ = round.cancel_token().cancelled() => Err(SearchError::Cancelled),
            outcome = tokio::time::timeout_at(round.deadline(), provider.search(query, round)) => {
                outcome.unwrap_or_else(|_| {
                    Err(SearchError::Unavailable(format!("{name}: orchestration budget exhausted")))
                })
            }
        };

        let elapsed_ms = start.elapsed().as_millis() as u64;
        let call = match outcome {
            Ok(results) => {
                debug!("Provider {} returned {} results in {}ms", name, results.len(), elapsed_ms);
                ProviderCallResult {
                    provider_name: name,
                    results,
                    elapsed_ms,
                    error: None,
                }
            }
            Err(err) => {
                warn!("Provider {} failed: {}", name, err);
                ProviderCallResult {
                    provider_name: name,
                    results: Vec::new(),
                    elapsed_ms,
                    error: Some(err.kind()),
                }
            }
        };

        self.metrics
            .record_provider_call(&call.provider_name, call.elapsed_ms, call.error);
        call
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::network::ConnectionPool;
    use crate::results::SourceRecord;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_util::sync::CancellationToken;

    enum Behavior {
        Titles(Vec<&'static str>),
        Fail,
        Hang,
    }

    struct Stub {
        name: &'static str,
        behavior: Behavior,
        calls: AtomicUsize,
    }

    impl Stub {
        fn new(name: &'static str, behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                name,
                behavior,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl SearchProvider for Stub {
        fn name(&self) -> &str {
            self.name
        }

        async fn search(&self, _query: &Query, _ctx: &RunContext) -> Result<Vec<SourceRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                Behavior::Titles(titles) => Ok(titles
                    .iter()
                    .map(|t| SourceRecord::new(format!("https://{}.com/{}", self.name, t), *t, self.name))
                    .collect()),
                Behavior::Fail => Err(SearchError::Unavailable("boom".into())),
                Behavior::Hang => futures::future::pending().await,
            }
        }
    }

    fn orchestrator(providers: Vec<Arc<Stub>>) -> Orchestrator {
        let chain = providers
            .into_iter()
            .map(|p| p as Arc<dyn SearchProvider>)
            .collect();
        Orchestrator::new(ProviderRegistry::from_providers(chain), Arc::new(Metrics::new()))
    }

    fn context(budget: Duration) -> RunContext {
        let pool = ConnectionPool::new().unwrap();
        RunContext::new(pool.acquire().unwrap(), budget, CancellationToken::new())
    }

    #[tokio::test]
    async fn test_primary_success_skips_fallback() {
        let primary = Stub::new("primary", Behavior::Titles(vec!["a", "b", "c"]));
        let fallback = Stub::new("fallback", Behavior::Titles(vec!["d"]));
        let orch = orchestrator(vec![primary.clone(), fallback.clone()]);

        let raw = orch
            .orchestrate(&Query::parse("q", 5), &context(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(raw.len(), 3);
        assert!(!raw.low_confidence);
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fallback_used_when_primary_fails() {
        let primary = Stub::new("primary", Behavior::Fail);
        let fallback = Stub::new("fallback", Behavior::Titles(vec!["d", "e"]));
        let orch = orchestrator(vec![primary, fallback]);

        let raw = orch
            .orchestrate(&Query::parse("q", 5), &context(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(raw.records[0].provider_name, "fallback");
        assert!(raw.low_confidence);
        assert_eq!(raw.attempts[0].error, Some(ErrorKind::Unavailable));
    }

    #[tokio::test]
    async fn test_both_fail_is_no_providers() {
        let orch = orchestrator(vec![
            Stub::new("primary", Behavior::Fail),
            Stub::new("fallback", Behavior::Fail),
        ]);
        let err = orch
            .orchestrate(&Query::parse("q", 5), &context(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::NoProvidersAvailable(_)));
        assert!(err.to_string().contains("primary"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_primary_bounded_by_budget() {
        let orch = orchestrator(vec![
            Stub::new("primary", Behavior::Hang),
            Stub::new("fallback", Behavior::Hang),
        ])
        .with_budget(Duration::from_millis(3000));

        let started = Instant::now();
        let err = orch
            .orchestrate(&Query::parse("q", 5), &context(Duration::from_secs(10)))
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::NoProvidersAvailable(_)));
        assert!(started.elapsed() <= Duration::from_millis(3050));
    }

    #[tokio::test]
    async fn test_merge_keeps_priority_order() {
        let orch = orchestrator(vec![
            Stub::new("primary", Behavior::Titles(vec!["Shared", "p1"])),
            Stub::new("fallback", Behavior::Titles(vec!["shared", "f1"])),
        ])
        .with_policy(ProviderPolicy::Merge);

        let raw = orch
            .orchestrate(&Query::parse("q", 5), &context(Duration::from_secs(5)))
            .await
            .unwrap();
        let titles: Vec<_> = raw.records.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Shared", "p1", "f1"]);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let orch = orchestrator(vec![Stub::new("primary", Behavior::Hang)]);
        let ctx = context(Duration::from_secs(5));
        ctx.cancel_token().cancel();

        let err = orch.orchestrate(&Query::parse("q", 5), &ctx).await.unwrap_err();
        assert!(matches!(err, SearchError::Cancelled));
    }
}
