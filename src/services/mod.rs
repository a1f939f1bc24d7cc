pub mod bulkhead;
pub mod chunker;
pub mod circuit_breaker;
pub mod embedding_cache;
pub mod embedding_service;
pub mod keyword_extractor;
pub mod provider_registry;
pub mod ranking;
pub mod rate_limiter;
pub mod resilience;
pub mod retrieval_pipeline;
pub mod retry;
pub mod singleflight;

pub use bulkhead::Bulkhead;
pub use chunker::OverlapChunker;
pub use circuit_breaker::{CircuitBreaker, CircuitCheckResult};
pub use embedding_cache::{CacheStats, EmbeddingCache};
pub use embedding_service::{CachedEmbedding, EmbeddingService};
pub use keyword_extractor::KeywordExtractor;
pub use provider_registry::ProviderRegistry;
pub use ranking::Ranker;
pub use rate_limiter::ProviderRateLimiter;
pub use resilience::ResilientProvider;
pub use retrieval_pipeline::{DocumentIngest, RetrievalPipeline};
pub use retry::RetryPolicy;
pub use singleflight::SingleFlight;
