//! Google Gemini provider adapter.
//!
//! `POST {base}/models/{model}:embedContent` and
//! `POST {base}/models/{model}:generateContent`, authenticated with the
//! `x-goog-api-key` header.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::http::{build_client, check_vector, send_json};
use crate::domain::errors::{GatewayError, GatewayResult};
use crate::domain::models::{
    normalize_non_empty, CompletionOptions, EmbeddingVector, ProviderConfig, ProviderKind,
};
use crate::domain::ports::ModelProvider;

const API_KEY_HEADER: &str = "x-goog-api-key";
const DEFAULT_TASK_TYPE: &str = "RETRIEVAL_DOCUMENT";

pub struct GeminiProvider {
    name: String,
    base_url: String,
    api_key: Option<String>,
    embedding_model: String,
    chat_model: String,
    dimension: Option<usize>,
    task_type: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(name: impl Into<String>, config: &ProviderConfig) -> GatewayResult<Self> {
        Ok(Self {
            name: name.into(),
            base_url: config.base_url(),
            api_key: config.resolve_api_key(),
            embedding_model: config.embedding_model(),
            chat_model: config.chat_model(),
            dimension: config.dimension,
            task_type: config
                .task_type
                .clone()
                .unwrap_or_else(|| DEFAULT_TASK_TYPE.to_string()),
            client: build_client(config.timeout_ms)?,
        })
    }

    fn api_key(&self) -> GatewayResult<&str> {
        self.api_key.as_deref().ok_or_else(|| GatewayError::ProviderAuth {
            provider: self.name.clone(),
            message: "API key not set. Set GEMINI_API_KEY env var or configure api_key."
                .to_string(),
        })
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!("{}/{}:{method}", self.base_url, model_path(model))
    }
}

/// Gemini addresses models as `models/{id}`.
fn model_path(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}

#[async_trait]
impl ModelProvider for GeminiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    async fn embed(&self, text: &str, model_hint: Option<&str>) -> GatewayResult<EmbeddingVector> {
        let text = normalize_non_empty(text)?;
        let model = model_hint.unwrap_or(self.embedding_model.as_str());
        let api_key = self.api_key()?;

        let request = self
            .client
            .post(self.model_url(model, "embedContent"))
            .header(API_KEY_HEADER, api_key)
            .json(&EmbedContentRequest {
                model: model_path(model),
                content: Content {
                    role: None,
                    parts: vec![Part { text: &text }],
                },
                task_type: &self.task_type,
            });
        let response: EmbedContentResponse = send_json(&self.name, request).await?;

        let vector = response.embedding.map(|e| e.values).unwrap_or_default();
        check_vector(&self.name, self.dimension, &vector)?;
        Ok(EmbeddingVector::new(vector, self.name.clone(), model))
    }

    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> GatewayResult<String> {
        let api_key = self.api_key()?;
        let model = options.model.as_deref().unwrap_or(self.chat_model.as_str());

        let request = self
            .client
            .post(self.model_url(model, "generateContent"))
            .header(API_KEY_HEADER, api_key)
            .json(&GenerateContentRequest {
                contents: vec![Content {
                    role: Some("user"),
                    parts: vec![Part { text: prompt }],
                }],
                system_instruction: options.system.as_deref().map(|system| Content {
                    role: None,
                    parts: vec![Part { text: system }],
                }),
                generation_config: GenerationConfig {
                    temperature: options.temperature,
                    top_p: options.top_p,
                    max_output_tokens: options.max_output_tokens,
                    stop_sequences: &options.stop,
                },
            });
        let response: GenerateContentResponse = send_json(&self.name, request).await?;

        let text: String = response
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        if text.is_empty() {
            return Err(GatewayError::unavailable(&self.name, "response had no candidates"));
        }
        Ok(text)
    }
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: String,
    content: Content<'a>,
    task_type: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: Option<ContentEmbedding>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    #[serde(default)]
    values: Vec<f32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    stop_sequences: &'a [String],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    generation_config: GenerationConfig<'a>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_path() {
        assert_eq!(model_path("text-embedding-004"), "models/text-embedding-004");
        assert_eq!(model_path("models/gemini-pro"), "models/gemini-pro");
    }

    #[test]
    fn test_default_task_type() {
        let config = ProviderConfig {
            api_key: Some("g-key".to_string()),
            ..ProviderConfig::new(ProviderKind::Gemini)
        };
        let provider = GeminiProvider::new("gemini", &config).unwrap();
        assert_eq!(provider.task_type, "RETRIEVAL_DOCUMENT");
        assert_eq!(
            provider.model_url("text-embedding-004", "embedContent"),
            "https://generativelanguage.googleapis.com/v1beta/models/text-embedding-004:embedContent"
        );
    }
}
