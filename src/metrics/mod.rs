//! Metrics collection module
//!
//! Tracks provider performance, error rates, cache effectiveness and
//! ranking/synthesis degradations.

use crate::error::ErrorKind;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

const RESPONSE_TIME_WINDOW: usize = 100;

/// Pipeline metrics collector, shared across runs
#[derive(Debug, Default)]
pub struct Metrics {
    total_runs: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    semantic_degradations: AtomicU64,
    synthesis_failures: AtomicU64,
    provider_calls: RwLock<HashMap<String, u64>>,
    provider_response_times: RwLock<HashMap<String, Vec<u64>>>,
    provider_errors: RwLock<HashMap<String, HashMap<ErrorKind, u64>>>,
    provider_successes: RwLock<HashMap<String, u64>>,
}

impl Metrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_run(&self) {
        self.total_runs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache(&self, hit: bool) {
        if hit {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.cache_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_semantic_degraded(&self) {
        self.semantic_degradations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_synthesis_failure(&self) {
        self.synthesis_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one provider call and its outcome
    pub fn record_provider_call(&self, provider: &str, time_ms: u64, error: Option<ErrorKind>) {
        if let Ok(mut calls) = self.provider_calls.write() {
            *calls.entry(provider.to_string()).or_insert(0) += 1;
        }

        if let Ok(mut times) = self.provider_response_times.write() {
            let entry = times.entry(provider.to_string()).or_default();
            if entry.len() >= RESPONSE_TIME_WINDOW {
                entry.remove(0);
            }
            entry.push(time_ms);
        }

        match error {
            Some(kind) => {
                if let Ok(mut errors) = self.provider_errors.write() {
                    *errors
                        .entry(provider.to_string())
                        .or_default()
                        .entry(kind)
                        .or_insert(0) += 1;
                }
            }
            None => {
                if let Ok(mut successes) = self.provider_successes.write() {
                    *successes.entry(provider.to_string()).or_insert(0) += 1;
                }
            }
        }
    }

    pub fn total_runs(&self) -> u64 {
        self.total_runs.load(Ordering::Relaxed)
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn cache_misses(&self) -> u64 {
        self.cache_misses.load(Ordering::Relaxed)
    }

    pub fn semantic_degradations(&self) -> u64 {
        self.semantic_degradations.load(Ordering::Relaxed)
    }

    pub fn synthesis_failures(&self) -> u64 {
        self.synthesis_failures.load(Ordering::Relaxed)
    }

    /// Number of calls made to a provider
    pub fn provider_calls(&self, provider: &str) -> u64 {
        self.provider_calls
            .read()
            .ok()
            .and_then(|calls| calls.get(provider).copied())
            .unwrap_or(0)
    }

    /// Average response time over the recent window
    pub fn avg_response_time(&self, provider: &str) -> Option<u64> {
        let times = self.provider_response_times.read().ok()?;
        times.get(provider).and_then(|t| {
            if t.is_empty() {
                None
            } else {
                Some(t.iter().sum::<u64>() / t.len() as u64)
            }
        })
    }

    /// Errors of one kind seen from a provider
    pub fn provider_errors(&self, provider: &str, kind: ErrorKind) -> u64 {
        self.provider_errors
            .read()
            .ok()
            .and_then(|errors| errors.get(provider).and_then(|e| e.get(&kind)).copied())
            .unwrap_or(0)
    }

    /// Reliability percentage for a provider
    pub fn reliability(&self, provider: &str) -> f64 {
        let error_count: u64 = self
            .provider_errors
            .read()
            .ok()
            .and_then(|errors| errors.get(provider).map(|e| e.values().sum()))
            .unwrap_or(0);
        let success_count = self
            .provider_successes
            .read()
            .ok()
            .and_then(|s| s.get(provider).copied())
            .unwrap_or(0);

        let total = error_count + success_count;
        if total == 0 {
            100.0
        } else {
            (success_count as f64 / total as f64) * 100.0
        }
    }

    /// Get all provider statistics
    pub fn provider_stats(&self) -> HashMap<String, ProviderStats> {
        let names: Vec<String> = match self.provider_calls.read() {
            Ok(calls) => calls.keys().cloned().collect(),
            Err(_) => return HashMap::new(),
        };

        names
            .into_iter()
            .map(|name| {
                let stats = ProviderStats {
                    calls: self.provider_calls(&name),
                    avg_response_time: self.avg_response_time(&name),
                    reliability: self.reliability(&name),
                };
                (name, stats)
            })
            .collect()
    }
}

/// Statistics for a single provider
#[derive(Debug, Clone)]
pub struct ProviderStats {
    pub calls: u64,
    pub avg_response_time: Option<u64>,
    pub reliability: f64,
}
