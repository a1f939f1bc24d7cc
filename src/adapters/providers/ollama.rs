//! Ollama provider adapter.
//!
//! Self-hosted models via `POST {base}/api/embed` and `POST {base}/api/chat`.
//! No authentication.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::http::{build_client, check_vector, send_json};
use crate::domain::errors::{GatewayError, GatewayResult};
use crate::domain::models::{
    normalize_non_empty, CompletionOptions, EmbeddingVector, ProviderConfig, ProviderKind,
};
use crate::domain::ports::ModelProvider;

pub struct OllamaProvider {
    name: String,
    base_url: String,
    embedding_model: String,
    chat_model: String,
    dimension: Option<usize>,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(name: impl Into<String>, config: &ProviderConfig) -> GatewayResult<Self> {
        Ok(Self {
            name: name.into(),
            base_url: config.base_url(),
            embedding_model: config.embedding_model(),
            chat_model: config.chat_model(),
            dimension: config.dimension,
            client: build_client(config.timeout_ms)?,
        })
    }
}

#[async_trait]
impl ModelProvider for OllamaProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
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

        let request = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .json(&EmbedRequest { model, input: &text });
        let response: EmbedResponse = send_json(&self.name, request).await?;

        let vector = response.embeddings.into_iter().next().unwrap_or_default();
        check_vector(&self.name, self.dimension, &vector)?;
        Ok(EmbeddingVector::new(vector, self.name.clone(), model))
    }

    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> GatewayResult<String> {
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
            .post(format!("{}/api/chat", self.base_url))
            .json(&ChatRequest {
                model: options.model.as_deref().unwrap_or(self.chat_model.as_str()),
                messages,
                stream: false,
                options: ChatOptions {
                    temperature: options.temperature,
                    top_p: options.top_p,
                    num_predict: options.max_output_tokens,
                    stop: &options.stop,
                },
            });
        let response: ChatResponse = send_json(&self.name, request).await?;

        response
            .message
            .map(|m| m.content)
            .filter(|content| !content.is_empty())
            .ok_or_else(|| GatewayError::unavailable(&self.name, "chat response had no message"))
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatOptions<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    stop: &'a [String],
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: ChatOptions<'a>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Option<ChatResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: String,
}
