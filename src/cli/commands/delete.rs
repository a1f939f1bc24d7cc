use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use crate::cli::output::{output, CommandOutput};
use crate::infrastructure::Gateway;

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Document identifier
    pub document_id: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteOutput {
    pub document_id: String,
    pub removed: u64,
}

impl CommandOutput for DeleteOutput {
    fn to_human(&self) -> String {
        if self.removed == 0 {
            format!("No records found for document '{}'", self.document_id)
        } else {
            format!(
                "Deleted document '{}' ({} record(s))",
                self.document_id, self.removed
            )
        }
    }
}

pub async fn execute(args: DeleteArgs, gateway: &Gateway, json: bool) -> Result<()> {
    let removed = gateway
        .pipeline
        .delete_document(&args.document_id)
        .await
        .context("Failed to delete document")?;

    output(
        &DeleteOutput {
            document_id: args.document_id,
            removed,
        },
        json,
    );
    Ok(())
}
