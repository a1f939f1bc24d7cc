//! CLI command implementations.

pub mod delete;
pub mod embed;
pub mod health;
pub mod ingest;
pub mod query;
