//! Domain errors for the retrieval gateway.
//!
//! Every failure that crosses a component boundary is a [`GatewayError`]. The
//! variants carry owned strings only so the error is `Clone`: a singleflight
//! computation hands the same failure to every waiter.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Coarse classification of a [`GatewayError`], used in ingestion reports and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    ProviderAuth,
    ProviderRateLimited,
    RateLimitExceeded,
    ProviderUnavailable,
    CircuitOpen,
    BulkheadFull,
    DimensionMismatch,
    StorageWrite,
    Storage,
    RetrievalUnavailable,
    UnknownProvider,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::ProviderAuth => "provider_auth",
            Self::ProviderRateLimited => "provider_rate_limited",
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::ProviderUnavailable => "provider_unavailable",
            Self::CircuitOpen => "circuit_open",
            Self::BulkheadFull => "bulkhead_full",
            Self::DimensionMismatch => "dimension_mismatch",
            Self::StorageWrite => "storage_write",
            Self::Storage => "storage",
            Self::RetrievalUnavailable => "retrieval_unavailable",
            Self::UnknownProvider => "unknown_provider",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by providers, resilience policies, the cache, the vector store
/// and the retrieval pipeline.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Provider '{provider}' rejected credentials: {message}")]
    ProviderAuth { provider: String, message: String },

    #[error("Provider '{provider}' is rate limiting requests")]
    ProviderRateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Local rate limit exceeded for provider '{provider}'")]
    RateLimitExceeded { provider: String },

    #[error("Provider '{provider}' unavailable: {message}")]
    ProviderUnavailable { provider: String, message: String },

    #[error("Circuit open for provider '{provider}', retry after {retry_after:?}")]
    CircuitOpen {
        provider: String,
        retry_after: Duration,
    },

    #[error("Bulkhead full for provider '{provider}' ({max_concurrent} concurrent calls)")]
    BulkheadFull {
        provider: String,
        max_concurrent: usize,
    },

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Storage write failed{}: {message}", .position.map(|p| format!(" at batch position {p}")).unwrap_or_default())]
    StorageWrite {
        message: String,
        position: Option<usize>,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Retrieval unavailable ({kind}): {message}")]
    RetrievalUnavailable { kind: ErrorKind, message: String },

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Operation cancelled")]
    Cancelled,
}

pub type GatewayResult<T> = Result<T, GatewayError>;

impl GatewayError {
    /// Classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::ProviderAuth { .. } => ErrorKind::ProviderAuth,
            Self::ProviderRateLimited { .. } => ErrorKind::ProviderRateLimited,
            Self::RateLimitExceeded { .. } => ErrorKind::RateLimitExceeded,
            Self::ProviderUnavailable { .. } => ErrorKind::ProviderUnavailable,
            Self::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            Self::BulkheadFull { .. } => ErrorKind::BulkheadFull,
            Self::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            Self::StorageWrite { .. } => ErrorKind::StorageWrite,
            Self::Storage(_) => ErrorKind::Storage,
            Self::RetrievalUnavailable { .. } => ErrorKind::RetrievalUnavailable,
            Self::UnknownProvider(_) => ErrorKind::UnknownProvider,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Returns true if the retry layer may attempt the call again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ProviderUnavailable { .. }
                | Self::ProviderRateLimited { .. }
                | Self::RateLimitExceeded { .. }
        )
    }

    /// Returns true if this error counts against a provider's circuit breaker.
    ///
    /// Rate limiting, credential and input problems say nothing about provider
    /// availability and leave the circuit untouched.
    pub fn is_circuit_failure(&self) -> bool {
        matches!(self, Self::ProviderUnavailable { .. })
    }

    /// Provider-supplied hint for when to try again.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::ProviderRateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub(crate) fn unavailable(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProviderUnavailable {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

impl From<sqlx::Error> for GatewayError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(format!("serialization error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(GatewayError::unavailable("alpha", "503").is_retryable());
        assert!(GatewayError::ProviderRateLimited {
            provider: "alpha".to_string(),
            retry_after: None,
        }
        .is_retryable());
        assert!(GatewayError::RateLimitExceeded {
            provider: "alpha".to_string()
        }
        .is_retryable());
    }

    #[test]
    fn test_permanent_errors() {
        assert!(!GatewayError::InvalidInput("empty".to_string()).is_retryable());
        assert!(!GatewayError::ProviderAuth {
            provider: "alpha".to_string(),
            message: "401".to_string(),
        }
        .is_retryable());
        assert!(!GatewayError::CircuitOpen {
            provider: "alpha".to_string(),
            retry_after: Duration::from_secs(1),
        }
        .is_retryable());
        assert!(!GatewayError::BulkheadFull {
            provider: "alpha".to_string(),
            max_concurrent: 1,
        }
        .is_retryable());
        assert!(!GatewayError::DimensionMismatch {
            expected: 3,
            actual: 4
        }
        .is_retryable());
    }

    #[test]
    fn test_only_unavailability_trips_circuit() {
        assert!(GatewayError::unavailable("alpha", "timeout").is_circuit_failure());
        assert!(!GatewayError::ProviderRateLimited {
            provider: "alpha".to_string(),
            retry_after: Some(Duration::from_secs(2)),
        }
        .is_circuit_failure());
        assert!(!GatewayError::ProviderAuth {
            provider: "alpha".to_string(),
            message: "bad key".to_string(),
        }
        .is_circuit_failure());
    }

    #[test]
    fn test_storage_write_display_includes_position() {
        let err = GatewayError::StorageWrite {
            message: "constraint failed".to_string(),
            position: Some(2),
        };
        assert_eq!(
            err.to_string(),
            "Storage write failed at batch position 2: constraint failed"
        );
        assert_eq!(err.kind(), ErrorKind::StorageWrite);
    }
}
