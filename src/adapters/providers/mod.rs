//! Model provider adapters.

mod http;
pub mod gemini;
pub mod ollama;
pub mod openai;

use std::sync::Arc;

use crate::domain::errors::GatewayResult;
use crate::domain::models::{ProviderConfig, ProviderKind};
use crate::domain::ports::ModelProvider;

pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

/// Build the adapter selected by `config.kind`.
pub fn build_provider(
    name: &str,
    config: &ProviderConfig,
) -> GatewayResult<Arc<dyn ModelProvider>> {
    let provider: Arc<dyn ModelProvider> = match config.kind {
        ProviderKind::Openai => Arc::new(OpenAiProvider::new(name, config)?),
        ProviderKind::Ollama => Arc::new(OllamaProvider::new(name, config)?),
        ProviderKind::Gemini => Arc::new(GeminiProvider::new(name, config)?),
    };
    tracing::debug!(provider = name, kind = %config.kind, "Built provider adapter");
    Ok(provider)
}
