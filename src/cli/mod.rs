//! Command-line interface
//!
//! `retrieval-gateway [--config FILE] [--json] <command>`

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "retrieval-gateway")]
#[command(about = "Embedding and retrieval gateway over multiple model providers", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file (defaults to gateway.yaml + gateway.local.yaml)
    #[arg(short, long, global = true, env = "GATEWAY_CONFIG_FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Chunk, embed and store a document
    Ingest(commands::ingest::IngestArgs),

    /// Retrieve the chunks most similar to a query
    Query(commands::query::QueryArgs),

    /// Embed a piece of text and show the vector summary
    Embed(commands::embed::EmbedArgs),

    /// Remove a document and all of its vectors
    Delete(commands::delete::DeleteArgs),

    /// Show provider circuit state, cache and store statistics
    Health,
}

/// Print a command failure and exit with a non-zero status.
pub fn handle_error(err: anyhow::Error, json: bool) -> ! {
    if json {
        let body = serde_json::json!({
            "error": err.to_string(),
            "causes": err.chain().skip(1).map(ToString::to_string).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("Error: {err}");
        for cause in err.chain().skip(1) {
            eprintln!("  caused by: {cause}");
        }
    }
    std::process::exit(1);
}

/// Parse a `key=value` argument.
pub fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{s}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{s}'"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}
