//! Infrastructure layer module
//!
//! - Configuration management (figment)
//! - Logging (tracing-subscriber, tracing-appender)
//! - Gateway assembly from configuration

pub mod config;
pub mod logging;
pub mod setup;

pub use setup::{build_registry, Gateway};
