//! Result types and container for search results
//!
//! This module defines the records that flow through the pipeline: raw
//! provider output, the frozen ranked set and citation annotations.

mod container;
mod types;

pub use container::ResultContainer;
pub use types::*;
