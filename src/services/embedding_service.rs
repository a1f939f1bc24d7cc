//! Embedding service for cached, deduplicated vector generation.
//!
//! Checks the cache first; on a miss joins or starts a singleflight
//! computation that calls the resilient provider and fills the cache.

use serde::Serialize;
use std::sync::Arc;

use crate::domain::errors::GatewayResult;
use crate::domain::models::{
    normalize_non_empty, CacheKey, ContentChunk, EmbeddingRequest, EmbeddingVector,
};
use crate::domain::ports::ModelProvider;
use crate::services::embedding_cache::EmbeddingCache;
use crate::services::provider_registry::ProviderRegistry;
use crate::services::singleflight::SingleFlight;

/// An embedding together with where it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CachedEmbedding {
    pub vector: EmbeddingVector,
    pub content_hash: String,
    pub cache_hit: bool,
}

/// Embedding service that orchestrates cache, singleflight and providers.
pub struct EmbeddingService {
    registry: Arc<ProviderRegistry>,
    cache: Arc<EmbeddingCache>,
    flights: SingleFlight<CacheKey, EmbeddingVector>,
}

impl EmbeddingService {
    pub fn new(registry: Arc<ProviderRegistry>, cache: Arc<EmbeddingCache>) -> Self {
        Self {
            registry,
            cache,
            flights: SingleFlight::new(),
        }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<EmbeddingCache> {
        &self.cache
    }

    /// Embed free text with the named provider, or the default one.
    pub async fn embed_text(
        &self,
        text: &str,
        provider: Option<&str>,
    ) -> GatewayResult<CachedEmbedding> {
        self.embed_with_id("", text, provider).await
    }

    /// Embed the text of a chunk.
    pub async fn embed_chunk(
        &self,
        chunk: &ContentChunk,
        provider: Option<&str>,
    ) -> GatewayResult<CachedEmbedding> {
        self.embed_with_id(&chunk.id, &chunk.text, provider).await
    }

    async fn embed_with_id(
        &self,
        chunk_id: &str,
        text: &str,
        provider: Option<&str>,
    ) -> GatewayResult<CachedEmbedding> {
        let normalized = normalize_non_empty(text)?;
        let provider = self.registry.get(provider)?;
        let request = EmbeddingRequest::for_text(
            chunk_id,
            provider.name(),
            provider.embedding_model(),
            &normalized,
        );
        let key = request.cache_key();

        if let Some(vector) = self.cache.get(&key) {
            tracing::trace!(provider = %request.provider_name, chunk_id, "Embedding cache hit");
            return Ok(CachedEmbedding {
                vector,
                content_hash: request.content_hash,
                cache_hit: true,
            });
        }

        let cache = Arc::clone(&self.cache);
        let flight_key = key.clone();
        let vector = self
            .flights
            .run(key, move || async move {
                if let Some(vector) = cache.get(&flight_key) {
                    return Ok(vector);
                }
                let vector = provider.embed(&normalized, None).await?;
                cache.put_default(flight_key, vector.clone());
                Ok(vector)
            })
            .await?;

        Ok(CachedEmbedding {
            vector,
            content_hash: request.content_hash,
            cache_hit: false,
        })
    }

    /// Number of embedding computations currently in flight.
    pub fn in_flight(&self) -> usize {
        self.flights.in_flight()
    }
}
