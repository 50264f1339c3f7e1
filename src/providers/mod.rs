//! Search providers
//!
//! Defines the provider traits, the HTTP-backed [`ProviderClient`] and the
//! registry holding the primary → fallback chain.

mod client;
mod loader;
mod registry;
mod traits;

// Provider adapters
pub mod brave;
pub mod json;
pub mod searxng;

pub use brave::Brave;
pub use client::ProviderClient;
pub use json::JsonApi;
pub use loader::ProviderLoader;
pub use registry::ProviderRegistry;
pub use searxng::Searxng;
pub use traits::*;
