//! Retrieval gateway CLI entry point.

use anyhow::{Context, Result};
use clap::Parser;

use retrieval_gateway::cli::{commands, handle_error, Cli, Commands};
use retrieval_gateway::infrastructure::logging::{LogConfig, LoggerImpl};
use retrieval_gateway::{ConfigLoader, Gateway};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    if let Err(err) = run(cli).await {
        handle_error(err, json);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };
    let _logger = LoggerImpl::init(&LogConfig::from(&config.logging))?;

    let gateway = Gateway::from_config(config)
        .await
        .context("Failed to initialize gateway")?;

    match cli.command {
        Commands::Ingest(args) => commands::ingest::execute(args, &gateway, cli.json).await,
        Commands::Query(args) => commands::query::execute(args, &gateway, cli.json).await,
        Commands::Embed(args) => commands::embed::execute(args, &gateway, cli.json).await,
        Commands::Delete(args) => commands::delete::execute(args, &gateway, cli.json).await,
        Commands::Health => commands::health::execute(&gateway, cli.json).await,
    }
}
