//! Port trait definitions (Hexagonal Architecture)
//!
//! - ModelProvider: embedding and completion backends
//! - VectorStore: vector persistence and similarity search

pub mod provider;
pub mod vector_store;

pub use provider::ModelProvider;
pub use vector_store::VectorStore;
