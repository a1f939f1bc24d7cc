//! Retrieval Gateway
//!
//! A provider-agnostic embedding and retrieval layer: model providers behind
//! one trait, each wrapped in circuit breaking, retries, rate limiting and a
//! bulkhead; a TTL-aware LRU embedding cache with singleflight deduplication;
//! and a retrieval pipeline over a SQLite-backed vector store.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): models, the error taxonomy and port traits
//! - **Service Layer** (`services`): resilience policies, caching and the pipeline
//! - **Adapters** (`adapters`): HTTP model providers and the SQLite vector store
//! - **Infrastructure Layer** (`infrastructure`): configuration, logging, assembly
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use retrieval_gateway::{ConfigLoader, Gateway, QueryRequest};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let gateway = Gateway::from_config(ConfigLoader::load()?).await?;
//!     let hits = gateway.pipeline.query(&QueryRequest::new("rust ownership", 5)).await?;
//!     println!("{hits:?}");
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{ErrorKind, GatewayError, GatewayResult};
pub use domain::models::{
    CompletionOptions, Config, ContentChunk, EmbeddingVector, IngestionReport, MetadataFilter,
    ProviderHealth, QueryRequest, RankedChunk, VectorRecord,
};
pub use domain::ports::{ModelProvider, VectorStore};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use infrastructure::Gateway;
pub use services::{EmbeddingCache, EmbeddingService, ProviderRegistry, RetrievalPipeline};
