pub mod chunk;
pub mod completion;
pub mod config;
pub mod embedding;
pub mod health;
pub mod ingestion;
pub mod vector;

pub use chunk::{content_hash, normalize_non_empty, normalize_text, ContentChunk};
pub use completion::CompletionOptions;
pub use config::{
    BulkheadConfig, CacheConfig, CircuitBreakerConfig, Config, LoggingConfig, PipelineConfig,
    ProviderConfig, ProviderKind, RankingConfig, RateLimitConfig, RateLimitMode,
    ResilienceConfig, RetryConfig, VectorStoreConfig, MAX_CACHE_TTL_SECS, MAX_DURATION_MS,
    MAX_RETRIES,
};
pub use embedding::{similarity_index_key, CacheKey, EmbeddingRequest, EmbeddingVector};
pub use health::{CircuitState, ProviderHealth};
pub use ingestion::{ChunkFailure, IngestionReport, QueryRequest};
pub use vector::{
    compare_scores_desc, first_non_finite, DocumentStatus, MetadataFilter, RankedChunk,
    ScoredChunk, SimilarityMetric, VectorRecord,
};
