//! Vector store port.

use async_trait::async_trait;

use crate::domain::errors::GatewayResult;
use crate::domain::models::{
    DocumentStatus, MetadataFilter, ScoredChunk, SimilarityMetric, VectorRecord,
};

/// Persistence and similarity search over embedding vectors.
///
/// Implementations reject vectors whose length differs from [`VectorStore::dimension`]
/// with `DimensionMismatch`. Query results are ordered by descending score, ties
/// broken by ascending `chunk_id`.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Index dimension.
    fn dimension(&self) -> usize;

    fn metric(&self) -> SimilarityMetric;

    /// Insert or replace a record by `chunk_id`.
    async fn upsert(&self, record: &VectorRecord) -> GatewayResult<()>;

    /// Insert or replace all records atomically. Returns the number written.
    async fn upsert_batch(&self, records: &[VectorRecord]) -> GatewayResult<usize>;

    /// Return at most `top_k` records matching `filter`, best first.
    async fn query_similar(
        &self,
        query_vector: &[f32],
        top_k: usize,
        filter: &MetadataFilter,
    ) -> GatewayResult<Vec<ScoredChunk>>;

    async fn get(&self, chunk_id: &str) -> GatewayResult<Option<VectorRecord>>;

    /// Remove a document and all its records. Returns the number of records removed.
    async fn delete_document(&self, document_id: &str) -> GatewayResult<u64>;

    /// Record that an ingestion of `document_id` finished.
    async fn mark_document_processed(
        &self,
        document_id: &str,
        succeeded: usize,
        failed: usize,
    ) -> GatewayResult<()>;

    async fn document_status(&self, document_id: &str) -> GatewayResult<Option<DocumentStatus>>;

    /// Total number of stored records.
    async fn count(&self) -> GatewayResult<u64>;
}
