//! Model provider port.
//!
//! A provider turns text into embeddings and prompts into completions. Adapters
//! for each backend family implement it, and so does the resilience decorator
//! that wraps them.

use async_trait::async_trait;

use crate::domain::errors::GatewayResult;
use crate::domain::models::{CompletionOptions, EmbeddingVector, ProviderKind};

/// Uniform capability over embedding and completion backends.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Configured provider name (e.g. "openai", "local").
    fn name(&self) -> &str;

    /// Backend family.
    fn kind(&self) -> ProviderKind;

    /// Embedding model used when no hint is given.
    fn embedding_model(&self) -> &str;

    /// Expected embedding dimension, if configured.
    fn dimension(&self) -> Option<usize>;

    /// Embed a single text.
    ///
    /// Text that is empty after normalization is rejected with `InvalidInput`.
    async fn embed(&self, text: &str, model_hint: Option<&str>) -> GatewayResult<EmbeddingVector>;

    /// Generate a completion for `prompt`.
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> GatewayResult<String>;
}
