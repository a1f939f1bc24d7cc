//! Paragraph-packing text chunker with overlap.
//!
//! Text is normalized (CR/LF unified, runs of blank lines collapsed), split into
//! paragraphs and packed into chunks of at most `chunk_size` characters where
//! possible. The last `overlap` characters of each chunk are carried into the
//! next one. A single paragraph longer than `chunk_size` becomes its own chunk.

use std::collections::BTreeMap;

use crate::domain::errors::{GatewayError, GatewayResult};
use crate::domain::models::ContentChunk;

#[derive(Debug, Clone)]
pub struct OverlapChunker {
    chunk_size: usize,
    overlap: usize,
}

impl OverlapChunker {
    /// `overlap` is clamped to `chunk_size - 1`.
    pub fn new(chunk_size: usize, overlap: usize) -> GatewayResult<Self> {
        if chunk_size == 0 {
            return Err(GatewayError::InvalidInput(
                "chunk_size must be positive".to_string(),
            ));
        }
        Ok(Self {
            chunk_size,
            overlap: overlap.min(chunk_size - 1),
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split `text` into chunks with ids `{document_id}-{index}`.
    ///
    /// Every chunk receives a copy of `metadata`. Blank text yields no chunks.
    pub fn chunk(
        &self,
        document_id: &str,
        text: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Vec<ContentChunk> {
        let paragraphs = split_paragraphs(text);
        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut current_len = 0usize;

        let emit = |body: &str, chunks: &mut Vec<ContentChunk>| {
            let index = chunks.len();
            let mut chunk = ContentChunk::new(
                format!("{document_id}-{index}"),
                document_id,
                index as u32,
                body.trim(),
            );
            chunk.metadata = metadata.clone();
            chunks.push(chunk);
        };

        for paragraph in paragraphs {
            let paragraph_len = paragraph.chars().count();
            if current_len > 0 && current_len + paragraph_len > self.chunk_size {
                emit(&current, &mut chunks);
                current = self.tail(&current);
                current_len = current.chars().count();
            }
            current.push_str(&paragraph);
            current.push_str("\n\n");
            current_len += paragraph_len + 2;
        }

        if !current.trim().is_empty() {
            emit(&current, &mut chunks);
        }
        chunks
    }

    fn tail(&self, chunk: &str) -> String {
        if self.overlap == 0 {
            return String::new();
        }
        let len = chunk.chars().count();
        chunk.chars().skip(len.saturating_sub(self.overlap)).collect()
    }
}

/// Normalize line endings and split on blank lines.
fn split_paragraphs(text: &str) -> Vec<String> {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in normalized.trim().lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join("\n"));
    }
    paragraphs
}
