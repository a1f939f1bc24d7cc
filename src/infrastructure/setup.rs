//! Gateway assembly
//!
//! Wires a validated [`Config`] into the running component graph:
//! provider adapters wrapped in their resilience policies, the shared
//! embedding cache, the vector store and the retrieval pipeline.

use std::sync::Arc;
use std::time::Duration;

use crate::adapters::providers::build_provider;
use crate::adapters::sqlite::SqliteVectorStore;
use crate::domain::errors::GatewayResult;
use crate::domain::models::Config;
use crate::domain::ports::{ModelProvider, VectorStore};
use crate::services::{
    EmbeddingCache, EmbeddingService, KeywordExtractor, ProviderRegistry, ResilientProvider,
    RetrievalPipeline,
};

/// The assembled gateway.
pub struct Gateway {
    pub config: Config,
    pub registry: Arc<ProviderRegistry>,
    pub cache: Arc<EmbeddingCache>,
    pub store: Arc<dyn VectorStore>,
    pub pipeline: RetrievalPipeline,
}

impl Gateway {
    /// Open the configured vector store and assemble everything else.
    pub async fn from_config(config: Config) -> GatewayResult<Self> {
        let store = SqliteVectorStore::connect(&config.vector_store).await?;
        Self::with_store(config, Arc::new(store))
    }

    /// Assemble around an existing store.
    pub fn with_store(config: Config, store: Arc<dyn VectorStore>) -> GatewayResult<Self> {
        let registry = Arc::new(build_registry(&config)?);
        let cache = Arc::new(EmbeddingCache::new(
            config.cache.max_entries,
            Duration::from_secs(config.cache.ttl_secs),
        ));
        let embeddings = Arc::new(EmbeddingService::new(registry.clone(), cache.clone()));

        let mut pipeline = RetrievalPipeline::new(embeddings, store.clone(), &config.pipeline)?;
        if config.pipeline.extract_keywords {
            let provider: Arc<dyn ModelProvider> = registry.get(None)?;
            pipeline = pipeline.with_keyword_extractor(KeywordExtractor::new(provider));
        }

        tracing::info!(
            providers = registry.len(),
            default_provider = registry.default_provider(),
            dimension = store.dimension(),
            "Gateway assembled"
        );

        Ok(Self {
            config,
            registry,
            cache,
            store,
            pipeline,
        })
    }
}

/// One resilient provider per configured entry, keyed by its config name.
pub fn build_registry(config: &Config) -> GatewayResult<ProviderRegistry> {
    let mut registry = ProviderRegistry::new(&config.default_provider);
    for (name, provider_config) in &config.providers {
        let adapter = build_provider(name, provider_config)?;
        let resilient = ResilientProvider::new(
            adapter,
            &config.resilience,
            provider_config.circuit_breaker.as_ref(),
        )?;
        registry.register(Arc::new(resilient));
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ProviderConfig, ProviderKind, SimilarityMetric};

    #[tokio::test]
    async fn test_build_registry_from_config() {
        let mut config = Config::default();
        config
            .providers
            .insert("local".to_string(), ProviderConfig::new(ProviderKind::Ollama));

        let registry = build_registry(&config).unwrap();
        assert_eq!(registry.names(), vec!["local".to_string(), "openai".to_string()]);
        assert_eq!(registry.get(None).unwrap().name(), "openai");
        assert_eq!(registry.get(Some("LOCAL")).unwrap().kind(), ProviderKind::Ollama);
    }

    #[tokio::test]
    async fn test_with_store_wires_dimension() {
        let store = SqliteVectorStore::in_memory(4, SimilarityMetric::Cosine)
            .await
            .unwrap();
        let gateway = Gateway::with_store(Config::default(), Arc::new(store)).unwrap();
        assert_eq!(gateway.store.dimension(), 4);
        assert_eq!(gateway.registry.len(), 1);
        assert_eq!(gateway.cache.max_entries(), 10000);
    }
}
