use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use crate::cli::output::{output, table, truncate, CommandOutput};
use crate::cli::parse_key_val;
use crate::domain::models::{MetadataFilter, QueryRequest, RankedChunk};
use crate::infrastructure::Gateway;

#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Query text
    pub text: String,

    /// Number of results
    #[arg(short = 'k', long, default_value = "5")]
    pub top_k: usize,

    /// Metadata equality filter (repeatable)
    #[arg(short, long, value_parser = parse_key_val)]
    pub filter: Vec<(String, String)>,

    /// Restrict to one document
    #[arg(short, long)]
    pub document: Option<String>,

    /// Provider to embed the query with (defaults to the configured default)
    #[arg(short, long)]
    pub provider: Option<String>,

    /// Weight of keyword matches in the final score (overrides configuration)
    #[arg(long)]
    pub lexical_weight: Option<f32>,
}

#[derive(Debug, Serialize)]
pub struct QueryOutput {
    pub query: String,
    pub results: Vec<RankedChunk>,
}

impl CommandOutput for QueryOutput {
    fn to_human(&self) -> String {
        if self.results.is_empty() {
            return "No matching chunks.".to_string();
        }
        let mut results = table(&["#", "Score", "Similarity", "Chunk", "Content"]);
        for (rank, chunk) in self.results.iter().enumerate() {
            results.add_row(vec![
                (rank + 1).to_string(),
                format!("{:.4}", chunk.score),
                format!("{:.4}", chunk.similarity),
                chunk.chunk_id.clone(),
                truncate(&chunk.content, 70),
            ]);
        }
        results.to_string()
    }
}

pub async fn execute(args: QueryArgs, gateway: &Gateway, json: bool) -> Result<()> {
    let mut filter = MetadataFilter::new();
    filter.equals.extend(args.filter);
    filter.document_id = args.document;

    let mut request = QueryRequest::new(&args.text, args.top_k).with_filter(filter);
    if let Some(provider) = args.provider {
        request = request.with_provider(provider);
    }
    if let Some(weight) = args.lexical_weight {
        request = request.with_lexical_weight(weight);
    }

    let results = gateway
        .pipeline
        .query(&request)
        .await
        .context("Query failed")?;

    output(
        &QueryOutput {
            query: args.text,
            results,
        },
        json,
    );
    Ok(())
}
