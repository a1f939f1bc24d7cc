//! SQLite implementation of the VectorStore.
//!
//! Vectors are stored as little-endian f32 BLOBs and scored in Rust over the
//! rows that pass the SQL-side document and index-key filters.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::BTreeMap;

use super::connection::{create_pool, create_test_pool, PoolConfig};
use super::migrations::{all_embedded_migrations, Migrator};
use super::parse_optional_datetime;
use crate::domain::errors::{GatewayError, GatewayResult};
use crate::domain::models::{
    compare_scores_desc, first_non_finite, DocumentStatus, MetadataFilter, ScoredChunk,
    SimilarityMetric, VectorRecord, VectorStoreConfig,
};
use crate::domain::ports::VectorStore;

#[derive(Clone)]
pub struct SqliteVectorStore {
    pool: SqlitePool,
    dimension: usize,
    metric: SimilarityMetric,
}

impl SqliteVectorStore {
    /// Wrap an already-migrated pool.
    pub fn new(pool: SqlitePool, dimension: usize, metric: SimilarityMetric) -> GatewayResult<Self> {
        if dimension == 0 {
            return Err(GatewayError::InvalidInput(
                "vector dimension must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            pool,
            dimension,
            metric,
        })
    }

    /// Open the configured database and apply pending migrations.
    pub async fn connect(config: &VectorStoreConfig) -> GatewayResult<Self> {
        let pool = create_pool(
            &config.database_url,
            Some(PoolConfig {
                max_connections: config.max_connections,
                ..PoolConfig::default()
            }),
        )
        .await?;
        let applied = Migrator::new(pool.clone())
            .run_embedded_migrations(all_embedded_migrations())
            .await?;
        tracing::info!(database_url = %config.database_url, applied, "Vector store ready");
        Self::new(pool, config.dimension, config.metric)
    }

    /// Fresh in-memory store with the schema applied.
    pub async fn in_memory(dimension: usize, metric: SimilarityMetric) -> GatewayResult<Self> {
        let pool = create_test_pool().await?;
        Migrator::new(pool.clone())
            .run_embedded_migrations(all_embedded_migrations())
            .await?;
        Self::new(pool, dimension, metric)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn check_dimension(&self, vector: &[f32]) -> GatewayResult<()> {
        if vector.len() != self.dimension {
            return Err(GatewayError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        if let Some(position) = first_non_finite(vector) {
            return Err(GatewayError::InvalidInput(format!(
                "vector component {position} is not a finite number"
            )));
        }
        Ok(())
    }
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> GatewayResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(GatewayError::Storage(format!(
            "corrupt embedding blob of {} bytes",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

fn encode_metadata(record: &VectorRecord, position: Option<usize>) -> GatewayResult<String> {
    serde_json::to_string(&record.metadata).map_err(|e| write_error(e, position))
}

fn write_error(err: impl std::fmt::Display, position: Option<usize>) -> GatewayError {
    GatewayError::StorageWrite {
        message: err.to_string(),
        position,
    }
}

async fn write_record(
    conn: &mut SqliteConnection,
    record: &VectorRecord,
    metadata_json: &str,
    now: &str,
) -> Result<(), sqlx::Error> {

    sqlx::query("INSERT OR IGNORE INTO documents (document_id, created_at) VALUES (?, ?)")
        .bind(&record.document_id)
        .bind(now)
        .execute(&mut *conn)
        .await?;

    sqlx::query(
        r#"INSERT INTO vector_records (chunk_id, document_id, ordinal, similarity_index_key,
               dimension, embedding, metadata, content, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
           ON CONFLICT(chunk_id) DO UPDATE SET
               document_id = excluded.document_id,
               ordinal = excluded.ordinal,
               similarity_index_key = excluded.similarity_index_key,
               dimension = excluded.dimension,
               embedding = excluded.embedding,
               metadata = excluded.metadata,
               content = excluded.content,
               updated_at = excluded.updated_at"#,
    )
    .bind(&record.chunk_id)
    .bind(&record.document_id)
    .bind(i64::from(record.ordinal))
    .bind(&record.similarity_index_key)
    .bind(record.vector.len() as i64)
    .bind(encode_vector(&record.vector))
    .bind(metadata_json)
    .bind(&record.content)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn metric(&self) -> SimilarityMetric {
        self.metric
    }

    async fn upsert(&self, record: &VectorRecord) -> GatewayResult<()> {
        self.check_dimension(&record.vector)?;
        let now = Utc::now().to_rfc3339();

        let metadata_json = encode_metadata(record, None)?;

        let mut tx = self.pool.begin().await?;
        write_record(&mut *tx, record, &metadata_json, &now)
            .await
            .map_err(|e| write_error(e, None))?;
        tx.commit().await.map_err(|e| write_error(e, None))?;
        Ok(())
    }

    async fn upsert_batch(&self, records: &[VectorRecord]) -> GatewayResult<usize> {
        let mut encoded = Vec::with_capacity(records.len());
        for (position, record) in records.iter().enumerate() {
            self.check_dimension(&record.vector)?;
            encoded.push(encode_metadata(record, Some(position))?);
        }
        if records.is_empty() {
            return Ok(0);
        }
        let now = Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await?;
        for (position, (record, metadata_json)) in records.iter().zip(&encoded).enumerate() {
            // Dropping the transaction on error rolls back every earlier row.
            write_record(&mut *tx, record, metadata_json, &now)
                .await
                .map_err(|e| write_error(e, Some(position)))?;
        }
        tx.commit().await.map_err(|e| write_error(e, None))?;
        tracing::debug!(records = records.len(), "Vector batch stored");
        Ok(records.len())
    }

    async fn query_similar(
        &self,
        query_vector: &[f32],
        top_k: usize,
        filter: &MetadataFilter,
    ) -> GatewayResult<Vec<ScoredChunk>> {
        self.check_dimension(query_vector)?;
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let rows: Vec<CandidateRow> = sqlx::query_as(
            r#"SELECT chunk_id, document_id, embedding, metadata, content
               FROM vector_records
               WHERE (?1 IS NULL OR document_id = ?1)
                 AND (?2 IS NULL OR similarity_index_key = ?2)"#,
        )
        .bind(filter.document_id.as_deref())
        .bind(filter.similarity_index_key.as_deref())
        .fetch_all(&self.pool)
        .await?;

        let mut scored = Vec::new();
        for row in rows {
            let metadata: BTreeMap<String, String> = serde_json::from_str(&row.metadata)?;
            if !filter.matches_metadata(&metadata) {
                continue;
            }
            let vector = decode_vector(&row.embedding)?;
            if vector.len() != query_vector.len() {
                continue;
            }
            scored.push(ScoredChunk {
                score: self.metric.score(query_vector, &vector),
                chunk_id: row.chunk_id,
                document_id: row.document_id,
                content: row.content,
                metadata,
            });
        }

        scored.sort_by(|a, b| {
            compare_scores_desc(a.score, b.score).then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn get(&self, chunk_id: &str) -> GatewayResult<Option<VectorRecord>> {
        let row: Option<RecordRow> = sqlx::query_as(
            r#"SELECT chunk_id, document_id, ordinal, similarity_index_key, embedding, metadata, content
               FROM vector_records WHERE chunk_id = ?"#,
        )
        .bind(chunk_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn delete_document(&self, document_id: &str) -> GatewayResult<u64> {
        let mut tx = self.pool.begin().await?;
        let (records,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM vector_records WHERE document_id = ?")
                .bind(document_id)
                .fetch_one(&mut *tx)
                .await?;
        // Records go with the document row via ON DELETE CASCADE.
        sqlx::query("DELETE FROM documents WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| write_error(e, None))?;
        tx.commit().await.map_err(|e| write_error(e, None))?;

        Ok(u64::try_from(records).unwrap_or_default())
    }

    async fn mark_document_processed(
        &self,
        document_id: &str,
        succeeded: usize,
        failed: usize,
    ) -> GatewayResult<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"INSERT INTO documents (document_id, processed, succeeded, failed, processed_at, created_at)
               VALUES (?1, 1, ?2, ?3, ?4, ?4)
               ON CONFLICT(document_id) DO UPDATE SET
                   processed = 1,
                   succeeded = excluded.succeeded,
                   failed = excluded.failed,
                   processed_at = excluded.processed_at"#,
        )
        .bind(document_id)
        .bind(succeeded as i64)
        .bind(failed as i64)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, None))?;
        Ok(())
    }

    async fn document_status(&self, document_id: &str) -> GatewayResult<Option<DocumentStatus>> {
        let row: Option<DocumentRow> = sqlx::query_as(
            "SELECT document_id, processed, succeeded, failed, processed_at FROM documents WHERE document_id = ?",
        )
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn count(&self) -> GatewayResult<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM vector_records")
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}

#[derive(sqlx::FromRow)]
struct CandidateRow {
    chunk_id: String,
    document_id: String,
    embedding: Vec<u8>,
    metadata: String,
    content: String,
}

#[derive(sqlx::FromRow)]
struct RecordRow {
    chunk_id: String,
    document_id: String,
    ordinal: i64,
    similarity_index_key: String,
    embedding: Vec<u8>,
    metadata: String,
    content: String,
}

impl TryFrom<RecordRow> for VectorRecord {
    type Error = GatewayError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        Ok(Self {
            ordinal: u32::try_from(row.ordinal)
                .map_err(|_| GatewayError::Storage(format!("invalid ordinal {}", row.ordinal)))?,
            vector: decode_vector(&row.embedding)?,
            metadata: serde_json::from_str(&row.metadata)?,
            chunk_id: row.chunk_id,
            document_id: row.document_id,
            content: row.content,
            similarity_index_key: row.similarity_index_key,
        })
    }
}

#[derive(sqlx::FromRow)]
struct DocumentRow {
    document_id: String,
    processed: bool,
    succeeded: i64,
    failed: i64,
    processed_at: Option<String>,
}

impl TryFrom<DocumentRow> for DocumentStatus {
    type Error = GatewayError;

    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        Ok(Self {
            document_id: row.document_id,
            processed: row.processed,
            succeeded: u32::try_from(row.succeeded).unwrap_or(u32::MAX),
            failed: u32::try_from(row.failed).unwrap_or(u32::MAX),
            processed_at: parse_optional_datetime(row.processed_at)?,
        })
    }
}
