//! Content chunks and content fingerprints.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::domain::errors::{GatewayError, GatewayResult};

/// A piece of a source document, ready to be embedded.
///
/// Chunks are produced by the ingestion collaborator (or by the built-in
/// [`crate::services::chunker::OverlapChunker`]) and are never mutated after
/// they have been embedded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentChunk {
    pub id: String,
    pub source_document_id: String,
    pub ordinal: u32,
    pub text: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ContentChunk {
    pub fn new(
        id: impl Into<String>,
        source_document_id: impl Into<String>,
        ordinal: u32,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source_document_id: source_document_id.into(),
            ordinal,
            text: text.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Normalize text for embedding: trim and collapse every whitespace run to one space.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize text, rejecting input that is empty afterwards.
pub fn normalize_non_empty(text: &str) -> GatewayResult<String> {
    let normalized = normalize_text(text);
    if normalized.is_empty() {
        return Err(GatewayError::InvalidInput(
            "text is empty after normalization".to_string(),
        ));
    }
    Ok(normalized)
}

/// Lowercase hex SHA-256 of the normalized text.
pub fn content_hash(text: &str) -> String {
    let digest = Sha256::digest(normalize_text(text).as_bytes());
    format!("{digest:x}")
}
