//! answer-engine: web retrieval and ranking for answer generation
//!
//! Queries a primary search provider with a free fallback, ranks the
//! candidates with BM25 and embedding similarity, optionally synthesizes an
//! answer with inline `[n]` citations and checks each citation against its
//! source. Every run is bounded by a wall-clock budget.

pub mod cache;
pub mod citation;
pub mod config;
pub mod error;
pub mod metrics;
pub mod network;
pub mod providers;
pub mod query;
pub mod ranking;
pub mod results;
pub mod scheduler;
pub mod search;
pub mod synthesis;

pub use config::Settings;
pub use error::{ErrorKind, SearchError};
pub use results::{Citation, RankedResultSet, SourceRecord};
pub use search::{SearchPipeline, SearchRequest, SearchResponse};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
