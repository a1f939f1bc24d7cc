//! Retry policy with exponential backoff for provider calls.
//!
//! Backed by the `backoff` crate. Availability failures and rate limiting are
//! retried; everything else is permanent. A provider `Retry-After` hint replaces
//! the computed interval.

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use std::future::Future;
use std::time::Duration;

use crate::domain::errors::{GatewayError, GatewayResult};
use crate::domain::models::{RetryConfig, MAX_DURATION_MS};

/// Retry policy configuration for handling transient errors
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
    multiplier: f64,
    randomization_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms.min(MAX_DURATION_MS)),
            max_backoff: Duration::from_millis(config.max_backoff_ms.min(MAX_DURATION_MS)),
            multiplier: config.multiplier,
            randomization_factor: config.randomization_factor,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_backoff)
            .with_multiplier(self.multiplier)
            .with_max_interval(self.max_backoff)
            .with_randomization_factor(self.randomization_factor)
            .with_max_elapsed_time(None)
            .build()
    }

    /// Execute an operation, retrying retryable failures up to `max_retries` times.
    pub async fn execute<T, F, Fut>(&self, provider: &str, mut operation: F) -> GatewayResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
    {
        let max_retries = self.max_retries;
        let mut attempt: u32 = 0;

        backoff::future::retry_notify(
            self.backoff(),
            || {
                attempt += 1;
                let current = attempt;
                let call = operation();
                async move {
                    match call.await {
                        Ok(value) => {
                            if current > 1 {
                                tracing::debug!(provider, attempt = current, "Call succeeded after retry");
                            }
                            Ok(value)
                        }
                        Err(err) if err.is_retryable() && current <= max_retries => {
                            Err(match err.retry_after() {
                                Some(delay) => backoff::Error::retry_after(err, delay),
                                None => backoff::Error::transient(err),
                            })
                        }
                        Err(err) => {
                            if err.is_retryable() {
                                tracing::warn!(provider, attempts = current, error = %err, "Giving up after retries");
                            }
                            Err(backoff::Error::permanent(err))
                        }
                    }
                }
            },
            |err: GatewayError, delay: Duration| {
                tracing::warn!(
                    provider,
                    error = %err,
                    delay_ms = delay.as_millis() as u64,
                    "Transient provider failure, retrying"
                );
            },
        )
        .await
    }
}
