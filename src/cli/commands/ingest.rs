use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use crate::cli::output::{output, table, truncate, CommandOutput};
use crate::cli::parse_key_val;
use crate::domain::models::{ChunkFailure, IngestionReport};
use crate::infrastructure::Gateway;

#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Document identifier
    pub document_id: String,

    /// Text file to ingest
    pub file: PathBuf,

    /// Metadata attached to every chunk (repeatable)
    #[arg(short, long, value_parser = parse_key_val)]
    pub meta: Vec<(String, String)>,
}

#[derive(Debug, Serialize)]
pub struct IngestOutput {
    pub document_id: String,
    pub succeeded: usize,
    pub failed: Vec<ChunkFailure>,
    pub cancelled: bool,
}

impl From<IngestionReport> for IngestOutput {
    fn from(report: IngestionReport) -> Self {
        Self {
            document_id: report.document_id,
            succeeded: report.succeeded.len(),
            failed: report.failed,
            cancelled: report.cancelled,
        }
    }
}

impl CommandOutput for IngestOutput {
    fn to_human(&self) -> String {
        let mut out = format!(
            "Ingested '{}': {} chunk(s) stored, {} failed{}",
            self.document_id,
            self.succeeded,
            self.failed.len(),
            if self.cancelled { " (cancelled)" } else { "" }
        );
        if !self.failed.is_empty() {
            let mut failures = table(&["Chunk", "Kind", "Error"]);
            for failure in &self.failed {
                failures.add_row(vec![
                    failure.chunk_id.clone(),
                    failure.kind.to_string(),
                    truncate(&failure.message, 60),
                ]);
            }
            out.push('\n');
            out.push_str(&failures.to_string());
        }
        out
    }
}

pub async fn execute(args: IngestArgs, gateway: &Gateway, json: bool) -> Result<()> {
    let text = tokio::fs::read_to_string(&args.file)
        .await
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let metadata: BTreeMap<String, String> = args.meta.into_iter().collect();

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling ingestion");
            on_interrupt.cancel();
        }
    });

    let report = gateway
        .pipeline
        .ingest_text(&args.document_id, &text, metadata, &cancel)
        .await
        .context("Failed to ingest document")?;

    output(&IngestOutput::from(report), json);
    Ok(())
}
