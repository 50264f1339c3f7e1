//! Ranking engine
//!
//! Scores candidates with BM25 and embedding similarity, run concurrently,
//! and falls back to lexical-only ranking when embeddings are unavailable.

mod engine;
pub mod lexical;
pub mod semantic;

pub use engine::{RankOutcome, RankingEngine};
pub use lexical::Bm25;
pub use semantic::{cosine, similarity_score, Embedder, HttpEmbedder};
