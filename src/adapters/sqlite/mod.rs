//! SQLite adapters for the retrieval gateway.

pub mod connection;
pub mod migrations;
pub mod vector_store;

pub use connection::{create_pool, create_test_pool, ConnectionError, PoolConfig};
pub use migrations::{all_embedded_migrations, Migration, MigrationError, Migrator};
pub use vector_store::SqliteVectorStore;

use chrono::{DateTime, Utc};

use crate::domain::errors::{GatewayError, GatewayResult};

/// Parse an optional RFC3339 datetime string from a SQLite row field.
pub fn parse_optional_datetime(s: Option<String>) -> GatewayResult<Option<DateTime<Utc>>> {
    s.map(|s| DateTime::parse_from_rfc3339(&s).map(|d| d.with_timezone(&Utc)))
        .transpose()
        .map_err(|e| GatewayError::Storage(format!("invalid timestamp: {e}")))
}
