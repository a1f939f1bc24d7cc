//! Domain layer for the retrieval gateway
//!
//! This module contains the core models, the error taxonomy and the port
//! traits implemented by provider and storage adapters.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{ErrorKind, GatewayError, GatewayResult};
