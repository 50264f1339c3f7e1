//! Ordered provider chain

use super::traits::SearchProvider;
use std::sync::Arc;

/// Providers in priority order; the first one is the primary
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn SearchProvider>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from providers already in priority order
    pub fn from_providers(providers: Vec<Arc<dyn SearchProvider>>) -> Self {
        Self { providers }
    }

    /// Append a provider at the lowest priority
    pub fn register(&mut self, provider: Arc<dyn SearchProvider>) {
        self.providers.push(provider);
    }

    /// Get a provider by name
    pub fn get(&self, name: &str) -> Option<&Arc<dyn SearchProvider>> {
        self.providers.iter().find(|p| p.name() == name)
    }

    /// The primary provider
    pub fn primary(&self) -> Option<&Arc<dyn SearchProvider>> {
        self.providers.first()
    }

    /// Every provider, primary first
    pub fn chain(&self) -> &[Arc<dyn SearchProvider>] {
        &self.providers
    }

    /// Get all provider names in priority order
    pub fn names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Get number of registered providers
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
