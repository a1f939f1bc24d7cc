//! Ingestion reports and query requests.

use serde::{Deserialize, Serialize};

use super::vector::MetadataFilter;
use crate::domain::errors::ErrorKind;

/// A chunk that could not be embedded or stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkFailure {
    pub chunk_id: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// Outcome of ingesting one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionReport {
    pub document_id: String,
    /// Chunk ids stored successfully.
    pub succeeded: Vec<String>,
    pub failed: Vec<ChunkFailure>,
    /// True when the ingestion was cancelled before every chunk finished.
    pub cancelled: bool,
}

impl IngestionReport {
    pub fn new(document_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            ..Self::default()
        }
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty() && !self.cancelled
    }

    pub fn failed_kind(&self, chunk_id: &str) -> Option<ErrorKind> {
        self.failed
            .iter()
            .find(|f| f.chunk_id == chunk_id)
            .map(|f| f.kind)
    }
}

/// A similarity query against the stored corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub text: String,
    pub top_k: usize,
    #[serde(default)]
    pub filter: MetadataFilter,
    /// Provider to embed the query with; the registry default when unset.
    #[serde(default)]
    pub provider: Option<String>,
    /// Overrides the configured lexical weight for this query.
    #[serde(default)]
    pub lexical_weight: Option<f32>,
}

impl QueryRequest {
    pub fn new(text: impl Into<String>, top_k: usize) -> Self {
        Self {
            text: text.into(),
            top_k,
            filter: MetadataFilter::default(),
            provider: None,
            lexical_weight: None,
        }
    }

    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Blend keyword matches into the score with the given weight.
    pub fn with_lexical_weight(mut self, weight: f32) -> Self {
        self.lexical_weight = Some(weight);
        self
    }
}
