//! Result cache
//!
//! Two TTL stores keyed by query fingerprint: ranked results (short TTL) and
//! synthesized answers (longer TTL). Entries are kept serialized; anything
//! that fails to decode is dropped and reported as a miss.

use crate::config::CacheSettings;
use crate::query::{normalize_query, Filters};
use crate::results::{Citation, RankedResultSet};
use chrono::{DateTime, Utc};
use moka::future::Cache;
use moka::Expiry;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Stable cache key for a query, its conversation context and filters
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(query: &str, context: Option<&str>, filters: &Filters) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(normalize_query(query).as_bytes());
        hasher.update([0x1f]);
        hasher.update(normalize_query(context.unwrap_or_default()).as_bytes());
        hasher.update([0x1f]);
        if let Some(recency) = filters.recency_window {
            hasher.update(recency.as_str().as_bytes());
        }
        hasher.update([0x1f]);
        hasher.update(filters.max_results.to_string().as_bytes());

        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a pipeline run leaves behind for the next identical query
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CachedPayload {
    pub results: RankedResultSet,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub citations: Vec<Citation>,
    #[serde(default)]
    pub low_confidence: bool,
    #[serde(default)]
    pub semantic_degraded: bool,
}

/// One stored entry
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub payload: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    ttl: Duration,
}

impl CacheEntry {
    fn new(fingerprint: Fingerprint, payload: Vec<u8>, ttl: Duration) -> Self {
        let created_at = Utc::now();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|d| created_at.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            fingerprint,
            payload,
            created_at,
            expires_at,
            ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

struct EntryExpiry;

impl Expiry<Fingerprint, Arc<CacheEntry>> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &Fingerprint,
        value: &Arc<CacheEntry>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &Fingerprint,
        value: &Arc<CacheEntry>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// A size-bounded store with per-entry TTL
pub struct TtlStore {
    name: &'static str,
    cache: Cache<Fingerprint, Arc<CacheEntry>>,
    default_ttl: Duration,
}

impl TtlStore {
    pub fn new(name: &'static str, default_ttl: Duration, max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(EntryExpiry)
            .build();

        Self {
            name,
            cache,
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Fetch a live, decodable payload
    pub async fn get(&self, fingerprint: &Fingerprint) -> Option<CachedPayload> {
        let entry = self.cache.get(fingerprint).await?;
        if entry.is_expired() {
            self.cache.invalidate(fingerprint).await;
            return None;
        }

        match serde_json::from_slice(&entry.payload) {
            Ok(payload) => {
                debug!("{} cache hit for {}", self.name, fingerprint);
                Some(payload)
            }
            Err(e) => {
                warn!("Dropping undecodable {} cache entry {}: {}", self.name, fingerprint, e);
                self.cache.invalidate(fingerprint).await;
                None
            }
        }
    }

    /// Store `payload` for `ttl`; the last write wins
    pub async fn put(&self, fingerprint: Fingerprint, payload: &CachedPayload, ttl: Duration) {
        match serde_json::to_vec(payload) {
            Ok(bytes) => self.put_raw(fingerprint, bytes, ttl).await,
            Err(e) => warn!("Not caching {} payload: {}", self.name, e),
        }
    }

    /// Store already-serialized bytes
    pub async fn put_raw(&self, fingerprint: Fingerprint, bytes: Vec<u8>, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        let entry = Arc::new(CacheEntry::new(fingerprint.clone(), bytes, ttl));
        self.cache.insert(fingerprint, entry).await;
    }

    pub async fn invalidate(&self, fingerprint: &Fingerprint) {
        self.cache.invalidate(fingerprint).await;
    }

    pub fn clear(&self) {
        self.cache.invalidate_all();
    }

    /// Approximate number of live entries
    pub fn size(&self) -> u64 {
        self.cache.entry_count()
    }
}

/// Results and answers stores behind one switch
pub struct ResultCache {
    enabled: bool,
    results: TtlStore,
    answers: TtlStore,
}

impl ResultCache {
    pub fn new(settings: &CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            results: TtlStore::new(
                "results",
                Duration::from_secs(settings.results_ttl),
                settings.max_entries,
            ),
            answers: TtlStore::new(
                "answers",
                Duration::from_secs(settings.answers_ttl),
                settings.max_entries,
            ),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn results(&self) -> &TtlStore {
        &self.results
    }

    pub fn answers(&self) -> &TtlStore {
        &self.answers
    }

    pub async fn get_results(&self, fingerprint: &Fingerprint) -> Option<CachedPayload> {
        if !self.enabled {
            return None;
        }
        self.results.get(fingerprint).await
    }

    pub async fn put_results(&self, fingerprint: Fingerprint, payload: &CachedPayload) {
        if self.enabled {
            self.results
                .put(fingerprint, payload, self.results.default_ttl())
                .await;
        }
    }

    pub async fn get_answer(&self, fingerprint: &Fingerprint) -> Option<CachedPayload> {
        if !self.enabled {
            return None;
        }
        self.answers.get(fingerprint).await
    }

    pub async fn put_answer(&self, fingerprint: Fingerprint, payload: &CachedPayload) {
        if self.enabled {
            self.answers
                .put(fingerprint, payload, self.answers.default_ttl())
                .await;
        }
    }

    pub fn clear(&self) {
        self.results.clear();
        self.answers.clear();
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(&CacheSettings::default())
    }
}
