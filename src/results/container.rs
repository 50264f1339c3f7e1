//! Result container for merging and deduplicating provider output

use super::types::*;
use crate::query::normalize_title;
use std::collections::HashSet;

/// Collects provider call results for one orchestration round
///
/// Records are deduplicated by normalized title; the first one seen wins,
/// so callers must add calls in provider priority order.
#[derive(Debug, Default)]
pub struct ResultContainer {
    records: Vec<SourceRecord>,
    seen_titles: HashSet<String>,
    attempts: Vec<ProviderAttempt>,
}

impl ResultContainer {
    /// Create a new empty result container
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one provider call, merging its records
    pub fn add_call(&mut self, call: ProviderCallResult) {
        self.attempts.push(call.attempt());
        for record in call.results {
            self.add_record(record);
        }
    }

    /// Add a record unless its normalized title was already seen
    pub fn add_record(&mut self, record: SourceRecord) -> bool {
        let key = normalize_title(&record.title);
        if key.is_empty() || !self.seen_titles.insert(key) {
            return false;
        }
        self.records.push(record);
        true
    }

    /// Number of unique records so far
    pub fn result_count(&self) -> usize {
        self.records.len()
    }

    /// Whether any provider call succeeded
    pub fn has_success(&self) -> bool {
        self.attempts.iter().any(|a| a.error.is_none())
    }

    pub fn attempts(&self) -> &[ProviderAttempt] {
        &self.attempts
    }

    /// Finish the round
    pub fn into_raw(self, min_confident_results: usize) -> RawResultSet {
        let low_confidence = self.records.len() < min_confident_results;
        RawResultSet {
            records: self.records,
            attempts: self.attempts,
            low_confidence,
        }
    }
}
