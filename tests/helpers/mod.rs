//! Shared fixtures for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use retrieval_gateway::adapters::sqlite::SqliteVectorStore;
use retrieval_gateway::domain::models::{
    BulkheadConfig, CircuitBreakerConfig, CompletionOptions, EmbeddingVector, PipelineConfig,
    ProviderKind, RateLimitConfig, RateLimitMode, ResilienceConfig, RetryConfig,
    SimilarityMetric,
};
use retrieval_gateway::services::{
    EmbeddingCache, EmbeddingService, ProviderRegistry, ResilientProvider, RetrievalPipeline,
};
use retrieval_gateway::{GatewayError, GatewayResult, ModelProvider};

pub const DIMENSION: usize = 64;

/// Deterministic bag-of-words embedder.
///
/// Identical normalized text always maps to the identical vector. Texts that
/// contain any configured poison word fail with `ProviderAuth`, which is
/// neither retried nor counted by the circuit breaker.
pub struct HashingProvider {
    name: String,
    model: String,
    calls: AtomicUsize,
    delay: Duration,
    poison: Mutex<HashSet<String>>,
    keywords: Option<String>,
}

impl HashingProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            model: "hash-v1".to_string(),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            poison: Mutex::new(HashSet::new()),
            keywords: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_poison(self, word: &str) -> Self {
        self.poison.lock().insert(word.to_lowercase());
        self
    }

    /// Raw answer returned from `complete`.
    pub fn with_completion(mut self, answer: &str) -> Self {
        self.keywords = Some(answer.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn hash_embed(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0_f32; DIMENSION];
    for word in text.split_whitespace() {
        let bucket = word
            .to_lowercase()
            .bytes()
            .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
        vector[bucket % DIMENSION] += 1.0;
    }
    vector
}

#[async_trait]
impl ModelProvider for HashingProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    fn embedding_model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> Option<usize> {
        Some(DIMENSION)
    }

    async fn embed(&self, text: &str, _model_hint: Option<&str>) -> GatewayResult<EmbeddingVector> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let lowered = text.to_lowercase();
        if self
            .poison
            .lock()
            .iter()
            .any(|word| lowered.contains(word.as_str()))
        {
            return Err(GatewayError::ProviderAuth {
                provider: self.name.clone(),
                message: "poisoned input".to_string(),
            });
        }
        Ok(EmbeddingVector::new(hash_embed(text), &self.name, &self.model))
    }

    async fn complete(&self, _prompt: &str, _options: &CompletionOptions) -> GatewayResult<String> {
        self.keywords
            .clone()
            .ok_or_else(|| GatewayError::ProviderUnavailable {
                provider: self.name.clone(),
                message: "no completion configured".to_string(),
            })
    }
}

/// Fast resilience settings: generous limits, tiny backoff.
pub fn test_resilience_config() -> ResilienceConfig {
    ResilienceConfig {
        circuit_breaker: CircuitBreakerConfig {
            failure_threshold: 3,
            window_size: 5,
            cooldown_ms: 1_000,
            max_cooldown_ms: 10_000,
            half_open_max_calls: 1,
            success_threshold: 1,
        },
        retry: RetryConfig {
            max_retries: 1,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
            multiplier: 2.0,
            randomization_factor: 0.0,
        },
        rate_limit: RateLimitConfig {
            requests_per_second: 100_000.0,
            burst_size: 100_000,
            mode: RateLimitMode::Queue,
            max_queue_depth: 1_024,
        },
        bulkhead: BulkheadConfig {
            max_concurrent_calls: 64,
        },
        per_call_timeout_ms: 5_000,
    }
}

pub fn registry_with(providers: Vec<Arc<dyn ModelProvider>>) -> Arc<ProviderRegistry> {
    let default = providers
        .first()
        .map(|p| p.name().to_string())
        .unwrap_or_default();
    let mut registry = ProviderRegistry::new(default);
    for provider in providers {
        let resilient = ResilientProvider::new(provider, &test_resilience_config(), None)
            .expect("valid resilience config");
        registry.register(Arc::new(resilient));
    }
    Arc::new(registry)
}

pub fn embedding_service(providers: Vec<Arc<dyn ModelProvider>>) -> Arc<EmbeddingService> {
    Arc::new(EmbeddingService::new(
        registry_with(providers),
        Arc::new(EmbeddingCache::new(1_000, Duration::from_secs(3_600))),
    ))
}

pub async fn test_store() -> Arc<SqliteVectorStore> {
    Arc::new(
        SqliteVectorStore::in_memory(DIMENSION, SimilarityMetric::Cosine)
            .await
            .expect("in-memory store"),
    )
}

pub fn pipeline_config() -> PipelineConfig {
    PipelineConfig {
        concurrency: 4,
        chunk_size: 200,
        chunk_overlap: 20,
        ..PipelineConfig::default()
    }
}

/// Pipeline over one provider and a fresh in-memory store.
pub async fn test_pipeline(
    provider: Arc<HashingProvider>,
) -> (RetrievalPipeline, Arc<SqliteVectorStore>) {
    let store = test_store().await;
    let provider: Arc<dyn ModelProvider> = provider;
    let pipeline = RetrievalPipeline::new(
        embedding_service(vec![provider]),
        store.clone(),
        &pipeline_config(),
    )
    .expect("valid pipeline config");
    (pipeline, store)
}
