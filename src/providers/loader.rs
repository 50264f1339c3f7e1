//! Provider loader for initializing providers from configuration

use super::registry::ProviderRegistry;
use super::traits::ProviderAdapter;
use super::{brave, json, searxng, ProviderClient};
use crate::config::{ProviderConfig, Settings};
use crate::error::{Result, SearchError};
use std::sync::Arc;
use tracing::{info, warn};

/// Loader for building the provider chain from configuration
pub struct ProviderLoader;

impl ProviderLoader {
    /// Load all enabled providers, in configured order
    pub fn load(settings: &Settings) -> Result<ProviderRegistry> {
        let mut registry = ProviderRegistry::new();

        for config in &settings.providers {
            if config.disabled {
                info!("Skipping disabled provider: {}", config.name);
                continue;
            }

            match Self::create_adapter(config) {
                Ok(adapter) => {
                    info!("Loaded provider: {} ({})", config.name, config.kind);
                    registry.register(Arc::new(ProviderClient::from_config(adapter, config)?));
                }
                Err(e) => {
                    warn!("Failed to load provider {}: {}", config.name, e);
                }
            }
        }

        if registry.is_empty() {
            return Err(SearchError::Config("no usable providers configured".into()));
        }

        info!("Loaded {} providers", registry.len());
        Ok(registry)
    }

    /// Create an adapter instance by kind
    fn create_adapter(config: &ProviderConfig) -> Result<Arc<dyn ProviderAdapter>> {
        if config.name.is_empty() {
            return Err(SearchError::Config("provider name is empty".into()));
        }
        let adapter: Arc<dyn ProviderAdapter> = match config.kind.as_str() {
            "json" => Arc::new(
                json::JsonApi::new(&config.name, &config.base_url)
                    .with_api_key(config.api_key.clone()),
            ),
            "brave" => Arc::new(
                brave::Brave::new(&config.name, &config.base_url)
                    .with_api_key(config.api_key.clone()),
            ),
            "searxng" => Arc::new(searxng::Searxng::new(&config.name, &config.base_url)),
            other => {
                return Err(SearchError::Config(format!("unknown provider kind: {other}")));
            }
        };
        Ok(adapter)
    }

    /// Get list of available provider kinds
    pub fn available_kinds() -> Vec<&'static str> {
        vec!["json", "brave", "searxng"]
    }
}
