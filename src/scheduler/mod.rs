//! Deadline, cancellation and retry policy
//!
//! Every outbound call in a run goes through [`run_with_policy`], which is
//! the one place where per-call timeouts, the run deadline, the run's
//! cancellation token and retries are composed.

use crate::error::{Result, SearchError};
use crate::network::PoolLease;
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

/// Per-run state shared by every stage of one pipeline run
#[derive(Debug, Clone)]
pub struct RunContext {
    run_id: Uuid,
    deadline: Instant,
    cancel: CancellationToken,
    lease: Arc<PoolLease>,
}

impl RunContext {
    /// Start a run that must finish within `budget`
    pub fn new(lease: PoolLease, budget: Duration, cancel: CancellationToken) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            deadline: Instant::now() + budget,
            cancel,
            lease: Arc::new(lease),
        }
    }

    /// Same run with a deadline no later than `now + budget`
    pub fn child(&self, budget: Duration) -> Self {
        let deadline = (Instant::now() + budget).min(self.deadline);
        Self {
            deadline,
            ..self.clone()
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the deadline, zero once passed
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn lease(&self) -> &PoolLease {
        &self.lease
    }
}

/// Timeout and retry policy for one kind of call
#[derive(Debug, Clone, Copy)]
pub struct CallPolicy {
    /// Per-attempt timeout, clipped to the run deadline
    pub timeout: Duration,
    /// Extra attempts after a retryable failure
    pub retries: u32,
    /// Base delay before a retry; doubled per attempt, with jitter
    pub backoff: Duration,
    /// Error reported when an attempt times out
    pub on_timeout: fn(&str, Duration) -> SearchError,
}

fn unavailable_on_timeout(label: &str, timeout: Duration) -> SearchError {
    SearchError::Unavailable(format!("{label}: timed out after {}ms", timeout.as_millis()))
}

impl CallPolicy {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            retries: 0,
            backoff: Duration::from_millis(100),
            on_timeout: unavailable_on_timeout,
        }
    }

    pub fn with_retries(mut self, retries: u32, backoff: Duration) -> Self {
        self.retries = retries;
        self.backoff = backoff;
        self
    }

    pub fn on_timeout(mut self, on_timeout: fn(&str, Duration) -> SearchError) -> Self {
        self.on_timeout = on_timeout;
        self
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        let base = self.backoff.saturating_mul(1 << attempt.saturating_sub(1).min(8));
        let jitter_ms = rand::thread_rng().gen_range(0..=base.as_millis() as u64 / 2);
        base + Duration::from_millis(jitter_ms)
    }
}

/// Run `op` under `policy` within the run's deadline and cancellation token.
///
/// `op` receives the timeout granted to the attempt. Only retryable errors
/// are retried, and only while the backoff fits in the remaining budget.
pub async fn run_with_policy<T, F, Fut>(
    ctx: &RunContext,
    policy: &CallPolicy,
    label: &str,
    op: F,
) -> Result<T>
where
    F: FnMut(Duration) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    run_admitted(ctx, policy, label, || async { Ok(()) }, op).await
}

/// [`run_with_policy`] with an admission step before every attempt.
///
/// `admit` runs outside the attempt's timeout, so waiting for a rate-limit
/// slot only counts against the run deadline. An admission error ends the
/// call without retrying.
pub async fn run_admitted<T, A, AFut, F, Fut>(
    ctx: &RunContext,
    policy: &CallPolicy,
    label: &str,
    mut admit: A,
    mut op: F,
) -> Result<T>
where
    A: FnMut() -> AFut,
    AFut: Future<Output = Result<()>>,
    F: FnMut(Duration) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        if ctx.is_cancelled() {
            return Err(SearchError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Err(SearchError::Cancelled),
            admitted = admit() => admitted?,
        }
        let remaining = ctx.remaining();
        if remaining.is_zero() {
            return Err((policy.on_timeout)(label, Duration::ZERO));
        }
        let timeout = policy.timeout.min(remaining);

        let outcome = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Err(SearchError::Cancelled),
            outcome = tokio::time::timeout(timeout, op(timeout)) => outcome,
        };

        let err = match outcome {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => err,
            Err(_) => (policy.on_timeout)(label, timeout),
        };

        if !err.is_retryable() || attempt >= policy.retries {
            return Err(err);
        }
        attempt += 1;

        let backoff = policy.backoff_for(attempt);
        if backoff >= ctx.remaining() {
            debug!("{}: no budget left for retry", label);
            return Err(err);
        }
        warn!("{} failed ({}), retry {} in {:?}", label, err, attempt, backoff);

        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Err(SearchError::Cancelled),
            _ = tokio::time::sleep(backoff) => {}
        }
    }
}
