//! Embedding domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::chunk::content_hash;

/// A dense embedding produced by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingVector {
    pub vector: Vec<f32>,
    pub dimension: usize,
    pub provider_name: String,
    pub model_name: String,
    pub created_at: DateTime<Utc>,
}

impl EmbeddingVector {
    pub fn new(vector: Vec<f32>, provider_name: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            dimension: vector.len(),
            vector,
            provider_name: provider_name.into(),
            model_name: model_name.into(),
            created_at: Utc::now(),
        }
    }

    /// Key of the embedding space this vector lives in.
    pub fn similarity_index_key(&self) -> String {
        similarity_index_key(&self.provider_name, &self.model_name)
    }
}

/// Identifies the embedding space of a `(provider, model)` pair.
pub fn similarity_index_key(provider: &str, model: &str) -> String {
    format!("{provider}:{model}")
}

/// Request to embed one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    pub chunk_id: String,
    pub provider_name: String,
    pub model_name: String,
    pub content_hash: String,
}

impl EmbeddingRequest {
    pub fn for_text(
        chunk_id: impl Into<String>,
        provider_name: impl Into<String>,
        model_name: impl Into<String>,
        text: &str,
    ) -> Self {
        Self {
            chunk_id: chunk_id.into(),
            provider_name: provider_name.into(),
            model_name: model_name.into(),
            content_hash: content_hash(text),
        }
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey {
            content_hash: self.content_hash.clone(),
            provider: self.provider_name.clone(),
            model: self.model_name.clone(),
        }
    }
}

/// Key of an embedding cache entry: content fingerprint + provider + model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    pub content_hash: String,
    pub provider: String,
    pub model: String,
}

impl CacheKey {
    pub fn new(
        content_hash: impl Into<String>,
        provider: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            content_hash: content_hash.into(),
            provider: provider.into(),
            model: model.into(),
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.provider, self.model, &self.content_hash[..self.content_hash.len().min(12)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_dimension_tracks_length() {
        let v = EmbeddingVector::new(vec![0.1, 0.2, 0.3], "alpha", "m1");
        assert_eq!(v.dimension, 3);
        assert_eq!(v.similarity_index_key(), "alpha:m1");
    }

    #[test]
    fn test_identical_text_yields_identical_cache_key() {
        let a = EmbeddingRequest::for_text("c1", "alpha", "m1", "hello   world");
        let b = EmbeddingRequest::for_text("c2", "alpha", "m1", "hello world");
        assert_eq!(a.cache_key(), b.cache_key());

        let other_model = EmbeddingRequest::for_text("c1", "alpha", "m2", "hello world");
        assert_ne!(a.cache_key(), other_model.cache_key());
    }
}
