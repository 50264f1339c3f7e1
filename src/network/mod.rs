//! HTTP networking module
//!
//! Provides the shared connection pool used for provider, embedding and
//! completion calls.

mod client;
mod request;

pub use client::{ConnectionPool, PoolLease, ShutdownReport};
pub use request::{HttpMethod, HttpRequest, HttpResponse};
