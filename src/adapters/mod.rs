//! Adapters for model providers and vector storage.

pub mod providers;
pub mod sqlite;
