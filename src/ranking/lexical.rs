//! Okapi BM25 over candidate title + snippet

use crate::config::RankingSettings;
use crate::query::tokenize;
use std::collections::{HashMap, HashSet};

/// BM25 scorer; pure and deterministic
#[derive(Debug, Clone, Copy)]
pub struct Bm25 {
    k1: f64,
    b: f64,
}

impl Bm25 {
    pub fn new(k1: f64, b: f64) -> Self {
        Self { k1, b }
    }

    pub fn from_settings(settings: &RankingSettings) -> Self {
        Self::new(settings.bm25_k1, settings.bm25_b)
    }

    /// Raw BM25 score of every document, in document order
    pub fn raw_scores(&self, query: &str, documents: &[String]) -> Vec<f64> {
        let terms = query_terms(query);
        let docs: Vec<Vec<String>> = documents.iter().map(|d| tokenize(d)).collect();
        if terms.is_empty() || docs.is_empty() {
            return vec![0.0; docs.len()];
        }

        let n = docs.len() as f64;
        let avgdl = docs.iter().map(Vec::len).sum::<usize>() as f64 / n;

        let mut doc_freq: HashMap<&str, usize> = HashMap::new();
        for doc in &docs {
            let unique: HashSet<&str> = doc.iter().map(String::as_str).collect();
            for term in &terms {
                if unique.contains(term.as_str()) {
                    *doc_freq.entry(term.as_str()).or_insert(0) += 1;
                }
            }
        }

        docs.iter()
            .map(|doc| {
                let len = doc.len() as f64;
                let mut tf: HashMap<&str, usize> = HashMap::new();
                for token in doc {
                    *tf.entry(token.as_str()).or_insert(0) += 1;
                }

                terms
                    .iter()
                    .map(|term| {
                        let f = tf.get(term.as_str()).copied().unwrap_or(0) as f64;
                        if f == 0.0 {
                            return 0.0;
                        }
                        let df = doc_freq.get(term.as_str()).copied().unwrap_or(0) as f64;
                        let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
                        let norm = if avgdl > 0.0 { len / avgdl } else { 0.0 };
                        idf * (f * (self.k1 + 1.0)) / (f + self.k1 * (1.0 - self.b + self.b * norm))
                    })
                    .sum()
            })
            .collect()
    }

    /// BM25 scores divided by the best score, so the top document gets 1.0
    pub fn score(&self, query: &str, documents: &[String]) -> Vec<f64> {
        let raw = self.raw_scores(query, documents);
        let max = raw.iter().copied().fold(0.0_f64, f64::max);
        if max <= 0.0 {
            return vec![0.0; raw.len()];
        }
        raw.into_iter().map(|s| (s / max).clamp(0.0, 1.0)).collect()
    }
}

impl Default for Bm25 {
    fn default() -> Self {
        Self::from_settings(&RankingSettings::default())
    }
}

/// Distinct query terms, first occurrence order
fn query_terms(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    tokenize(query)
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect()
}
