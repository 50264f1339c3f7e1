//! Provider client: adapter + rate limiter + call policy

use super::traits::{ProviderAdapter, ProviderParams, SearchProvider};
use crate::config::{seconds, ProviderConfig};
use crate::error::{Result, SearchError};
use crate::query::Query;
use crate::results::SourceRecord;
use crate::scheduler::{run_admitted, CallPolicy, RunContext};
use async_trait::async_trait;
use governor::clock::{Clock, DefaultClock};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// HTTP-backed [`SearchProvider`]
///
/// Transport goes through the run's pool lease, so the client never owns a
/// connection pool of its own.
pub struct ProviderClient {
    adapter: Arc<dyn ProviderAdapter>,
    policy: CallPolicy,
    limiter: Option<DefaultDirectRateLimiter>,
    clock: DefaultClock,
}

impl ProviderClient {
    /// Create a client with the adapter's defaults and no rate limit
    pub fn new(adapter: Arc<dyn ProviderAdapter>) -> Self {
        let policy = CallPolicy::new(adapter.default_timeout());
        Self {
            adapter,
            policy,
            limiter: None,
            clock: DefaultClock::default(),
        }
    }

    /// Create a client from its configuration entry
    pub fn from_config(adapter: Arc<dyn ProviderAdapter>, config: &ProviderConfig) -> Result<Self> {
        let timeout = match config.timeout {
            Some(secs) => seconds(&format!("providers.{}.timeout", config.name), secs)?,
            None => adapter.default_timeout(),
        };
        Ok(Self::new(adapter)
            .with_policy(CallPolicy::new(timeout).with_retries(
                config.retries,
                Duration::from_millis(config.retry_backoff_ms),
            ))
            .with_min_interval(Duration::from_millis(config.min_interval_ms)))
    }

    pub fn with_policy(mut self, policy: CallPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Allow at most one request per `interval`; zero disables limiting
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.limiter = Quota::with_period(interval).map(RateLimiter::direct);
        self
    }

    pub fn policy(&self) -> &CallPolicy {
        &self.policy
    }

    /// Wait for a rate-limit slot, or fail fast if it would arrive after the deadline
    async fn admit(&self, ctx: &RunContext) -> Result<()> {
        let limiter = match self.limiter {
            Some(ref limiter) => limiter,
            None => return Ok(()),
        };

        loop {
            let not_until = match limiter.check() {
                Ok(()) => return Ok(()),
                Err(not_until) => not_until,
            };
            let wait = not_until.wait_time_from(self.clock.now());
            if wait >= ctx.remaining() {
                return Err(SearchError::RateLimited(format!(
                    "{}: next slot in {}ms is past the deadline",
                    self.adapter.name(),
                    wait.as_millis()
                )));
            }
            debug!("{} rate limited, waiting {:?}", self.adapter.name(), wait);
            tokio::select! {
                biased;
                _ = ctx.cancel_token().cancelled() => return Err(SearchError::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
}

#[async_trait]
impl SearchProvider for ProviderClient {
    fn name(&self) -> &str {
        self.adapter.name()
    }

    async fn search(&self, query: &Query, ctx: &RunContext) -> Result<Vec<SourceRecord>> {
        let request = self.adapter.request(&ProviderParams::from_query(query))?;
        let name = self.adapter.name();

        run_admitted(
            ctx,
            &self.policy,
            name,
            move || self.admit(ctx),
            |timeout| {
                let request = request.clone();
                async move {
                    let response = ctx.lease().execute_with_timeout(request, timeout).await?;
                    self.adapter.response(response)
                }
            },
        )
        .await
    }
}
