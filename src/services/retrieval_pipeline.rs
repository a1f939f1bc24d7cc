//! Retrieval pipeline
//!
//! Ingestion: chunk → embed (cache → singleflight → resilient provider) →
//! upsert, with per-chunk failure isolation and cooperative cancellation.
//! Query: embed the query text → similarity search in the provider's
//! embedding space → secondary re-ranking.

use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::domain::errors::{ErrorKind, GatewayError, GatewayResult};
use crate::domain::models::{
    normalize_non_empty, ChunkFailure, ContentChunk, IngestionReport, PipelineConfig,
    QueryRequest, RankedChunk, VectorRecord,
};
use crate::domain::ports::{ModelProvider, VectorStore};
use crate::services::chunker::OverlapChunker;
use crate::services::embedding_service::EmbeddingService;
use crate::services::keyword_extractor::KeywordExtractor;
pub use crate::services::ranking::KEYWORDS_KEY;
use crate::services::ranking::{Ranker, UPDATED_AT_KEY};

/// Metadata keys written by the pipeline on every stored record.
pub const DOCUMENT_ID_KEY: &str = "document_id";
pub const CHUNK_ID_KEY: &str = "chunk_id";
pub const CHUNK_ORDER_KEY: &str = "chunk_order";
pub const CONTENT_HASH_KEY: &str = "content_hash";

/// One document queued for [`RetrievalPipeline::ingest_many`].
#[derive(Debug, Clone)]
pub struct DocumentIngest {
    pub document_id: String,
    pub chunks: Vec<ContentChunk>,
    pub cancel: CancellationToken,
}

impl DocumentIngest {
    pub fn new(document_id: impl Into<String>, chunks: Vec<ContentChunk>) -> Self {
        Self {
            document_id: document_id.into(),
            chunks,
            cancel: CancellationToken::new(),
        }
    }

    /// Cancel this document through `cancel`, e.g. a child of a batch-wide token.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Top-level orchestration of ingestion and retrieval.
pub struct RetrievalPipeline {
    embeddings: Arc<EmbeddingService>,
    store: Arc<dyn VectorStore>,
    chunker: OverlapChunker,
    ranker: Ranker,
    keywords: Option<KeywordExtractor>,
    workers: Arc<Semaphore>,
    candidate_multiplier: usize,
    provider: Option<String>,
}

impl RetrievalPipeline {
    pub fn new(
        embeddings: Arc<EmbeddingService>,
        store: Arc<dyn VectorStore>,
        config: &PipelineConfig,
    ) -> GatewayResult<Self> {
        if config.concurrency == 0 {
            return Err(GatewayError::InvalidInput(
                "pipeline concurrency must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            embeddings,
            store,
            chunker: OverlapChunker::new(config.chunk_size, config.chunk_overlap)?,
            ranker: Ranker::from_config(&config.ranking),
            keywords: None,
            workers: Arc::new(Semaphore::new(config.concurrency)),
            candidate_multiplier: config.candidate_multiplier.max(1),
            provider: None,
        })
    }

    /// Enable keyword extraction during text ingestion.
    pub fn with_keyword_extractor(mut self, extractor: KeywordExtractor) -> Self {
        self.keywords = Some(extractor);
        self
    }

    /// Embed ingested chunks with `provider` instead of the registry default.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn embeddings(&self) -> &Arc<EmbeddingService> {
        &self.embeddings
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Ingest pre-chunked content.
    ///
    /// Chunk failures are recorded in the report and do not stop the others.
    /// When `cancel` fires, chunks still running are recorded as cancelled and
    /// the document is not marked processed.
    pub async fn ingest(
        &self,
        document_id: &str,
        chunks: Vec<ContentChunk>,
        cancel: &CancellationToken,
    ) -> GatewayResult<IngestionReport> {
        validate_chunks(document_id, &chunks)?;
        tracing::info!(document_id, chunks = chunks.len(), "Ingesting document");

        let mut report = IngestionReport::new(document_id);
        let mut tasks: FuturesUnordered<_> = chunks
            .into_iter()
            .map(|chunk| async move {
                let chunk_id = chunk.id.clone();
                let outcome = tokio::select! {
                    biased;
                    () = cancel.cancelled() => Err(GatewayError::Cancelled),
                    result = self.process_chunk(document_id, chunk) => result,
                };
                (chunk_id, outcome)
            })
            .collect();

        while let Some((chunk_id, outcome)) = tasks.next().await {
            match outcome {
                Ok(()) => report.succeeded.push(chunk_id),
                Err(err) => {
                    if err.kind() != ErrorKind::Cancelled {
                        tracing::warn!(document_id, chunk_id = %chunk_id, error = %err, "Chunk ingestion failed");
                    }
                    report.failed.push(ChunkFailure {
                        chunk_id,
                        kind: err.kind(),
                        message: err.to_string(),
                    });
                }
            }
        }
        drop(tasks);

        report.cancelled = report
            .failed
            .iter()
            .any(|failure| failure.kind == ErrorKind::Cancelled);

        if report.cancelled {
            tracing::info!(document_id, "Ingestion cancelled, document not marked processed");
        } else {
            self.store
                .mark_document_processed(document_id, report.succeeded.len(), report.failed.len())
                .await?;
            tracing::info!(
                document_id,
                succeeded = report.succeeded.len(),
                failed = report.failed.len(),
                "Document ingested"
            );
        }
        Ok(report)
    }

    /// Chunk raw text, optionally tag it with extracted keywords, and ingest it.
    pub async fn ingest_text(
        &self,
        document_id: &str,
        text: &str,
        metadata: BTreeMap<String, String>,
        cancel: &CancellationToken,
    ) -> GatewayResult<IngestionReport> {
        let mut chunks = self.chunker.chunk(document_id, text, &metadata);
        if chunks.is_empty() {
            return Err(GatewayError::InvalidInput(format!(
                "document '{document_id}' has no text"
            )));
        }

        if let Some(extractor) = &self.keywords {
            let keywords = extractor.extract(text).await;
            if !keywords.is_empty() {
                let joined = keywords.join(", ");
                for chunk in &mut chunks {
                    chunk.metadata.insert(KEYWORDS_KEY.to_string(), joined.clone());
                }
            }
        }

        self.ingest(document_id, chunks, cancel).await
    }

    /// Ingest several documents concurrently, sharing the worker pool.
    ///
    /// Each document carries its own cancellation token; reports come back in
    /// input order.
    pub async fn ingest_many(
        &self,
        documents: Vec<DocumentIngest>,
    ) -> Vec<GatewayResult<IngestionReport>> {
        let runs = documents.into_iter().map(|document| async move {
            self.ingest(&document.document_id, document.chunks, &document.cancel)
                .await
        });
        futures::future::join_all(runs).await
    }

    async fn process_chunk(&self, document_id: &str, chunk: ContentChunk) -> GatewayResult<()> {
        let _worker = self
            .workers
            .acquire()
            .await
            .map_err(|_| GatewayError::Cancelled)?;

        let embedding = self
            .embeddings
            .embed_chunk(&chunk, self.provider.as_deref())
            .await?;

        let mut metadata = chunk.metadata;
        metadata
            .entry(UPDATED_AT_KEY.to_string())
            .or_insert_with(|| Utc::now().to_rfc3339());
        metadata.insert(DOCUMENT_ID_KEY.to_string(), document_id.to_string());
        metadata.insert(CHUNK_ID_KEY.to_string(), chunk.id.clone());
        metadata.insert(CHUNK_ORDER_KEY.to_string(), chunk.ordinal.to_string());
        metadata.insert(CONTENT_HASH_KEY.to_string(), embedding.content_hash);

        let record = VectorRecord {
            chunk_id: chunk.id,
            document_id: document_id.to_string(),
            ordinal: chunk.ordinal,
            similarity_index_key: embedding.vector.similarity_index_key(),
            vector: embedding.vector.vector,
            metadata,
            content: chunk.text,
        };
        self.store.upsert(&record).await?;
        tracing::debug!(document_id, chunk_id = %record.chunk_id, cache_hit = embedding.cache_hit, "Chunk stored");
        Ok(())
    }

    /// Answer a similarity query.
    ///
    /// Embedding failures surface as `RetrievalUnavailable`; validation and
    /// storage errors surface unchanged. A positive lexical weight blends
    /// query-term matches against chunk keywords into the score.
    pub async fn query(&self, request: &QueryRequest) -> GatewayResult<Vec<RankedChunk>> {
        normalize_non_empty(&request.text)?;
        let ranker = match request.lexical_weight {
            Some(weight) if !weight.is_finite() || weight < 0.0 => {
                return Err(GatewayError::InvalidInput(format!(
                    "lexical weight must be a non-negative number, got {weight}"
                )));
            }
            Some(weight) => Cow::Owned(self.ranker.clone().with_lexical_weight(weight)),
            None => Cow::Borrowed(&self.ranker),
        };
        let provider = self.embeddings.registry().get(request.provider.as_deref())?;
        if request.top_k == 0 {
            return Ok(Vec::new());
        }

        let embedding = self
            .embeddings
            .embed_text(&request.text, Some(provider.name()))
            .await
            .map_err(|err| {
                tracing::warn!(error = %err, "Query embedding failed");
                GatewayError::RetrievalUnavailable {
                    kind: err.kind(),
                    message: err.to_string(),
                }
            })?;

        let mut filter = request.filter.clone();
        filter.similarity_index_key = Some(embedding.vector.similarity_index_key());

        let candidates = self
            .store
            .query_similar(
                &embedding.vector.vector,
                request.top_k.saturating_mul(self.candidate_multiplier),
                &filter,
            )
            .await?;

        let mut ranked = ranker.rank(candidates, &request.text, Utc::now());
        ranked.truncate(request.top_k);
        tracing::debug!(results = ranked.len(), cache_hit = embedding.cache_hit, "Query answered");
        Ok(ranked)
    }

    /// Remove a document and all of its records.
    pub async fn delete_document(&self, document_id: &str) -> GatewayResult<u64> {
        let removed = self.store.delete_document(document_id).await?;
        tracing::info!(document_id, removed, "Document deleted");
        Ok(removed)
    }
}

fn validate_chunks(document_id: &str, chunks: &[ContentChunk]) -> GatewayResult<()> {
    if document_id.trim().is_empty() {
        return Err(GatewayError::InvalidInput(
            "document id must not be empty".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    for chunk in chunks {
        if chunk.id.trim().is_empty() {
            return Err(GatewayError::InvalidInput(
                "chunk id must not be empty".to_string(),
            ));
        }
        if chunk.source_document_id != document_id {
            return Err(GatewayError::InvalidInput(format!(
                "chunk '{}' belongs to document '{}', not '{document_id}'",
                chunk.id, chunk.source_document_id
            )));
        }
        if !seen.insert(chunk.id.as_str()) {
            return Err(GatewayError::InvalidInput(format!(
                "duplicate chunk id '{}'",
                chunk.id
            )));
        }
    }
    Ok(())
}
