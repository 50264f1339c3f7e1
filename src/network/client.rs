//! Shared HTTP connection pool
//!
//! One `reqwest::Client` is shared by every provider, the embedding client
//! and the completion client. Work against the pool happens under a
//! [`PoolLease`]; the pool counts outstanding leases so that shutdown can
//! wait for them to drain.

use super::request::{HttpMethod, HttpRequest, HttpResponse};
use crate::config::{seconds, OutgoingSettings};
use crate::error::{Result, SearchError};
use reqwest::{Client, Response};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};

struct PoolInner {
    client: RwLock<Option<Client>>,
    closed: AtomicBool,
    in_flight: AtomicUsize,
    drained: Notify,
    default_timeout: Duration,
    drain_timeout: Duration,
    extra_headers: HashMap<String, String>,
}

impl PoolInner {
    fn release_one(&self) {
        if self.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.drained.notify_waiters();
        }
    }
}

/// Process-wide HTTP connection pool, safe for concurrent use
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Create a pool with default outgoing settings
    pub fn new() -> Result<Self> {
        Self::with_settings(&OutgoingSettings::default())
    }

    /// Create a pool with custom settings
    pub fn with_settings(settings: &OutgoingSettings) -> Result<Self> {
        let request_timeout = seconds("outgoing.request_timeout", settings.request_timeout)?;
        let drain_timeout = seconds("outgoing.drain_timeout", settings.drain_timeout)?;

        let mut builder = Client::builder()
            .connect_timeout(seconds("outgoing.connect_timeout", settings.connect_timeout)?)
            .timeout(request_timeout)
            .pool_max_idle_per_host(settings.pool_maxsize)
            .pool_idle_timeout(seconds("outgoing.pool_idle_timeout", settings.pool_idle_timeout)?)
            .user_agent(format!("answer-engine/{}", crate::VERSION))
            .gzip(true)
            .brotli(true);

        // SSL verification
        if !settings.verify_ssl {
            builder = builder.danger_accept_invalid_certs(true);
        }

        // Proxy settings
        let proxy_err = |e: reqwest::Error| SearchError::Config(format!("invalid proxy: {e}"));
        if let Some(ref proxy_url) = settings.proxies.all {
            builder = builder.proxy(reqwest::Proxy::all(proxy_url).map_err(proxy_err)?);
        } else {
            if let Some(ref http) = settings.proxies.http {
                builder = builder.proxy(reqwest::Proxy::http(http).map_err(proxy_err)?);
            }
            if let Some(ref https) = settings.proxies.https {
                builder = builder.proxy(reqwest::Proxy::https(https).map_err(proxy_err)?);
            }
        }

        let client = builder
            .build()
            .map_err(|e| SearchError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            inner: Arc::new(PoolInner {
                client: RwLock::new(Some(client)),
                closed: AtomicBool::new(false),
                in_flight: AtomicUsize::new(0),
                drained: Notify::new(),
                default_timeout: request_timeout,
                drain_timeout,
                extra_headers: settings.extra_headers.clone(),
            }),
        })
    }

    /// Take a lease on the pool for one pipeline run
    pub fn acquire(&self) -> Result<PoolLease> {
        if self.is_closed() {
            return Err(SearchError::Unavailable("connection pool is shut down".into()));
        }
        self.inner.in_flight.fetch_add(1, Ordering::AcqRel);

        // Shutdown may have started between the check and the increment.
        if self.is_closed() {
            self.inner.release_one();
            return Err(SearchError::Unavailable("connection pool is shut down".into()));
        }

        let client = match self.inner.client.read() {
            Ok(guard) => guard.as_ref().cloned(),
            Err(_) => None,
        };
        match client {
            Some(client) => Ok(PoolLease {
                inner: self.inner.clone(),
                client,
                released: AtomicBool::new(false),
            }),
            None => {
                self.inner.release_one();
                Err(SearchError::Unavailable("connection pool is shut down".into()))
            }
        }
    }

    /// Number of leases not yet released
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Drain timeout from settings
    pub fn drain_timeout(&self) -> Duration {
        self.inner.drain_timeout
    }

    /// Close the pool: refuse new leases, wait up to `max_drain` for
    /// outstanding ones, then drop the client and its idle connections.
    ///
    /// Safe to call any number of times; only the first call drains.
    pub async fn shutdown(&self, max_drain: Duration) -> ShutdownReport {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return ShutdownReport {
                already_closed: true,
                outstanding: self.in_flight(),
            };
        }

        let deadline = Instant::now() + max_drain;
        loop {
            if self.in_flight() == 0 {
                break;
            }
            let notified = self.inner.drained.notified();
            if self.in_flight() == 0 {
                break;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                break;
            }
        }

        let outstanding = self.in_flight();
        if outstanding > 0 {
            warn!("Connection pool closed with {} leases still outstanding", outstanding);
        }
        if let Ok(mut guard) = self.inner.client.write() {
            guard.take();
        }
        info!("Connection pool shut down");

        ShutdownReport {
            already_closed: false,
            outstanding,
        }
    }
}

/// Outcome of [`ConnectionPool::shutdown`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// The pool had already been shut down by an earlier call
    pub already_closed: bool,
    /// Leases still held when the drain wait ended
    pub outstanding: usize,
}

impl ShutdownReport {
    pub fn drained(&self) -> bool {
        self.outstanding == 0
    }
}

/// Scoped access to the pool
///
/// Released explicitly with [`PoolLease::release`]; dropping an unreleased
/// lease releases it too, so an aborted or cancelled run never leaks one.
pub struct PoolLease {
    inner: Arc<PoolInner>,
    client: Client,
    released: AtomicBool,
}

impl PoolLease {
    /// Give the lease back; later calls are no-ops
    pub fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.inner.release_one();
        }
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Execute a request with the pool's default timeout
    pub async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.execute_with_timeout(request, self.inner.default_timeout)
            .await
    }

    /// Execute a request with a custom total timeout
    pub async fn execute_with_timeout(
        &self,
        request: HttpRequest,
        timeout: Duration,
    ) -> Result<HttpResponse> {
        if self.is_released() {
            return Err(SearchError::Unavailable("pool lease already released".into()));
        }

        let mut req_builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };

        req_builder = req_builder
            .timeout(timeout)
            .header("Accept", "application/json");

        for (key, value) in &self.inner.extra_headers {
            req_builder = req_builder.header(key, value);
        }
        for (key, value) in &request.headers {
            req_builder = req_builder.header(key, value);
        }

        if !request.params.is_empty() {
            req_builder = req_builder.query(&request.params);
        }

        if let Some(ref body) = request.json {
            req_builder = req_builder.json(body);
        }

        debug!("{:?} {}", request.method, request.url);
        let response = req_builder.send().await?;

        Self::parse_response(response).await
    }

    /// Parse response into HttpResponse
    async fn parse_response(response: Response) -> Result<HttpResponse> {
        let status = response.status().as_u16();
        let url = response.url().to_string();

        let mut headers = HashMap::new();
        for (key, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(key.to_string(), v.to_string());
            }
        }

        let text = response.text().await?;

        Ok(HttpResponse {
            status,
            headers,
            text,
            url,
        })
    }
}

impl Drop for PoolLease {
    fn drop(&mut self) {
        if !self.released.load(Ordering::Acquire) {
            debug!("Pool lease released on drop");
        }
        self.release();
    }
}

impl std::fmt::Debug for PoolLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolLease")
            .field("released", &self.is_released())
            .finish()
    }
}
