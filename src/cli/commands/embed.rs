use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use crate::cli::output::{output, CommandOutput};
use crate::infrastructure::Gateway;

/// Number of leading vector components shown in human output.
const PREVIEW_LEN: usize = 6;

#[derive(Args, Debug)]
pub struct EmbedArgs {
    /// Text to embed
    pub text: String,

    /// Provider to use (defaults to the configured default)
    #[arg(short, long)]
    pub provider: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EmbedOutput {
    pub provider: String,
    pub model: String,
    pub dimension: usize,
    pub content_hash: String,
    pub cache_hit: bool,
    pub vector: Vec<f32>,
}

impl CommandOutput for EmbedOutput {
    fn to_human(&self) -> String {
        let preview: Vec<String> = self
            .vector
            .iter()
            .take(PREVIEW_LEN)
            .map(|v| format!("{v:.4}"))
            .collect();
        format!(
            "Provider:   {}\nModel:      {}\nDimension:  {}\nHash:       {}\nCache hit:  {}\nVector:     [{}{}]",
            self.provider,
            self.model,
            self.dimension,
            self.content_hash,
            self.cache_hit,
            preview.join(", "),
            if self.vector.len() > PREVIEW_LEN { ", ..." } else { "" }
        )
    }
}

pub async fn execute(args: EmbedArgs, gateway: &Gateway, json: bool) -> Result<()> {
    let embedding = gateway
        .pipeline
        .embeddings()
        .embed_text(&args.text, args.provider.as_deref())
        .await
        .context("Embedding failed")?;

    output(
        &EmbedOutput {
            provider: embedding.vector.provider_name.clone(),
            model: embedding.vector.model_name.clone(),
            dimension: embedding.vector.vector.len(),
            content_hash: embedding.content_hash,
            cache_hit: embedding.cache_hit,
            vector: embedding.vector.vector,
        },
        json,
    );
    Ok(())
}
