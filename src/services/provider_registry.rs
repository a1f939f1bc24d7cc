//! Provider registry.
//!
//! Resolves provider names, case-insensitively, to their resilient wrappers and
//! falls back to the configured default when no name is given.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::errors::{GatewayError, GatewayResult};
use crate::domain::models::ProviderHealth;
use crate::services::resilience::ResilientProvider;

#[derive(Debug)]
pub struct ProviderRegistry {
    default_provider: String,
    providers: BTreeMap<String, Arc<ResilientProvider>>,
}

impl ProviderRegistry {
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            default_provider: default_provider.into().to_lowercase(),
            providers: BTreeMap::new(),
        }
    }

    /// Register a provider under its own name. Replaces an existing entry.
    pub fn register(&mut self, provider: Arc<ResilientProvider>) {
        use crate::domain::ports::ModelProvider;
        let key = provider.name().to_lowercase();
        tracing::debug!(provider = %key, "Registered provider");
        self.providers.insert(key, provider);
    }

    pub fn with_provider(mut self, provider: Arc<ResilientProvider>) -> Self {
        self.register(provider);
        self
    }

    pub fn default_provider(&self) -> &str {
        &self.default_provider
    }

    /// Look up `name`, or the default provider when `None`.
    pub fn get(&self, name: Option<&str>) -> GatewayResult<Arc<ResilientProvider>> {
        let key = name.map_or_else(|| self.default_provider.clone(), str::to_lowercase);
        self.providers
            .get(&key)
            .cloned()
            .ok_or(GatewayError::UnknownProvider(key))
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Health snapshot of every registered provider, ordered by name.
    pub async fn health(&self) -> Vec<ProviderHealth> {
        let mut snapshots = Vec::with_capacity(self.providers.len());
        for provider in self.providers.values() {
            snapshots.push(provider.health().await);
        }
        snapshots
    }
}
