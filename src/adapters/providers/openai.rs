//! OpenAI provider adapter.
//!
//! Embeddings via `POST {base}/embeddings`, completions via
//! `POST {base}/chat/completions`. Compatible with any OpenAI-compatible API
//! (Azure OpenAI, local gateways).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::http::{build_client, check_vector, send_json};
use crate::domain::errors::{GatewayError, GatewayResult};
use crate::domain::models::{
    normalize_non_empty, CompletionOptions, EmbeddingVector, ProviderConfig, ProviderKind,
};
use crate::domain::ports::ModelProvider;

/// OpenAI embedding and chat provider.
pub struct OpenAiProvider {
    name: String,
    base_url: String,
    api_key: Option<String>,
    embedding_model: String,
    chat_model: String,
    dimension: Option<usize>,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(name: impl Into<String>, config: &ProviderConfig) -> GatewayResult<Self> {
        Ok(Self {
            name: name.into(),
            base_url: config.base_url(),
            api_key: config.resolve_api_key(),
            embedding_model: config.embedding_model(),
            chat_model: config.chat_model(),
            dimension: config.dimension,
            client: build_client(config.timeout_ms)?,
        })
    }

    fn api_key(&self) -> GatewayResult<&str> {
        self.api_key.as_deref().ok_or_else(|| GatewayError::ProviderAuth {
            provider: self.name.clone(),
            message: "API key not set. Set OPENAI_API_KEY env var or configure api_key."
                .to_string(),
        })
    }
}

#[async_trait]
impl ModelProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Openai
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
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(api_key)
            .json(&EmbeddingsRequest {
                model,
                input: vec![text],
            });
        let response: EmbeddingsResponse = send_json(&self.name, request).await?;

        // Sort by index to maintain input order
        let mut data = response.data;
        data.sort_by_key(|d| d.index);
        let vector = data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .unwrap_or_default();
        check_vector(&self.name, self.dimension, &vector)?;

        Ok(EmbeddingVector::new(vector, self.name.clone(), model))
    }

    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> GatewayResult<String> {
        let api_key = self.api_key()?;
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &options.system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        let request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&ChatRequest {
                model: options.model.as_deref().unwrap_or(self.chat_model.as_str()),
                messages,
                temperature: options.temperature,
                top_p: options.top_p,
                max_tokens: options.max_output_tokens,
                stop: if options.stop.is_empty() {
                    None
                } else {
                    Some(&options.stop)
                },
            });
        let response: ChatResponse = send_json(&self.name, request).await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| GatewayError::unavailable(&self.name, "completion response had no content"))
    }
}

// -- OpenAI API request/response types --

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}
