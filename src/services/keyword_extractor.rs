//! Keyword extraction via the completion model.
//!
//! Failures never propagate: a provider error or an unparseable answer yields
//! an empty keyword list.

use std::sync::Arc;

use crate::domain::models::CompletionOptions;
use crate::domain::ports::ModelProvider;

const MAX_INPUT_CHARS: usize = 4000;

const SYSTEM_PROMPT: &str = "You are a professional keyword extractor.\n\
Extract 5-10 concise, noun-centric keywords that best represent the following text.\n\
Respond with a JSON array of strings only (no code fences, no additional commentary).";

pub struct KeywordExtractor {
    provider: Arc<dyn ModelProvider>,
}

impl KeywordExtractor {
    pub fn new(provider: Arc<dyn ModelProvider>) -> Self {
        Self { provider }
    }

    /// Extract keywords from `text`.
    pub async fn extract(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let input: String = text.chars().take(MAX_INPUT_CHARS).collect();
        let options = CompletionOptions::new()
            .with_system(SYSTEM_PROMPT)
            .with_temperature(0.0);

        match self.provider.complete(&input, &options).await {
            Ok(raw) => parse_keywords(&raw),
            Err(err) => {
                tracing::warn!(provider = %self.provider.name(), error = %err, "Keyword extraction failed");
                Vec::new()
            }
        }
    }
}

/// Parse a model answer: a JSON array of strings, optionally fenced, else a
/// comma or newline separated list.
pub fn parse_keywords(raw: &str) -> Vec<String> {
    let cleaned = strip_fence(raw.trim());
    if cleaned.is_empty() {
        return Vec::new();
    }

    if let Ok(list) = serde_json::from_str::<Vec<Option<String>>>(cleaned) {
        let parsed: Vec<String> = list
            .into_iter()
            .flatten()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if !parsed.is_empty() {
            return parsed;
        }
    }

    cleaned
        .split([',', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn strip_fence(value: &str) -> &str {
    let Some(rest) = value.strip_prefix("```") else {
        return value;
    };
    let body = rest.find('\n').map_or(rest, |newline| &rest[newline + 1..]);
    let body = body.rfind("```").map_or(body, |fence| &body[..fence]);
    body.trim()
}
