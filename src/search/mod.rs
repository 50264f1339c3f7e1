//! Search orchestration module
//!
//! Walks the provider chain under a budget and drives the full pipeline
//! from cache lookup to verified answer.

mod models;
mod orchestrator;
mod pipeline;

pub use models::*;
pub use orchestrator::Orchestrator;
pub use pipeline::SearchPipeline;
