//! Per-provider rate limiting.
//!
//! A GCRA token bucket (`governor`) refilled at `requests_per_second` with
//! `burst_size` capacity. Callers either queue for a token, bounded by
//! `max_queue_depth` concurrent waiters, or fail fast.

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::domain::errors::{GatewayError, GatewayResult};
use crate::domain::models::{RateLimitConfig, RateLimitMode};

/// Token bucket rate limiter for one provider.
pub struct ProviderRateLimiter {
    provider: String,
    limiter: DefaultDirectRateLimiter,
    mode: RateLimitMode,
    queue: Arc<Semaphore>,
}

impl std::fmt::Debug for ProviderRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRateLimiter")
            .field("provider", &self.provider)
            .field("mode", &self.mode)
            .field("queue_slots", &self.queue.available_permits())
            .finish_non_exhaustive()
    }
}

impl ProviderRateLimiter {
    /// Create a limiter from configuration.
    pub fn new(provider: impl Into<String>, config: &RateLimitConfig) -> GatewayResult<Self> {
        if !(config.requests_per_second.is_finite() && config.requests_per_second > 0.0) {
            return Err(GatewayError::InvalidInput(format!(
                "requests_per_second must be positive, got {}",
                config.requests_per_second
            )));
        }
        let burst = NonZeroU32::new(config.burst_size).ok_or_else(|| {
            GatewayError::InvalidInput("burst_size must be greater than 0".to_string())
        })?;
        let period = Duration::from_secs_f64(1.0 / config.requests_per_second);
        let quota = Quota::with_period(period)
            .ok_or_else(|| {
                GatewayError::InvalidInput(format!(
                    "requests_per_second {} is too high",
                    config.requests_per_second
                ))
            })?
            .allow_burst(burst);

        Ok(Self {
            provider: provider.into(),
            limiter: RateLimiter::direct(quota),
            mode: config.mode,
            queue: Arc::new(Semaphore::new(config.max_queue_depth)),
        })
    }

    /// Configured default mode.
    pub fn mode(&self) -> RateLimitMode {
        self.mode
    }

    /// Take a token using the configured mode.
    pub async fn acquire(&self) -> GatewayResult<()> {
        self.acquire_with(self.mode).await
    }

    /// Take a token, overriding the configured mode.
    pub async fn acquire_with(&self, mode: RateLimitMode) -> GatewayResult<()> {
        if self.limiter.check().is_ok() {
            return Ok(());
        }

        match mode {
            RateLimitMode::FailFast => {
                tracing::debug!(provider = %self.provider, "Rate limit exceeded, failing fast");
                Err(self.exceeded())
            }
            RateLimitMode::Queue => {
                let Ok(_slot) = self.queue.try_acquire() else {
                    tracing::debug!(provider = %self.provider, "Rate limit queue full");
                    return Err(self.exceeded());
                };
                self.limiter.until_ready().await;
                Ok(())
            }
        }
    }

    fn exceeded(&self) -> GatewayError {
        GatewayError::RateLimitExceeded {
            provider: self.provider.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(mode: RateLimitMode, max_queue_depth: usize) -> RateLimitConfig {
        RateLimitConfig {
            requests_per_second: 0.001,
            burst_size: 2,
            mode,
            max_queue_depth,
        }
    }

    #[tokio::test]
    async fn test_fail_fast_after_burst() {
        let limiter = ProviderRateLimiter::new("alpha", &config(RateLimitMode::FailFast, 0)).unwrap();
        limiter.acquire().await.unwrap();
        limiter.acquire().await.unwrap();

        let err = limiter.acquire().await.unwrap_err();
        assert!(matches!(err, GatewayError::RateLimitExceeded { .. }));
    }

    #[tokio::test]
    async fn test_queue_rejects_beyond_depth() {
        let limiter =
            Arc::new(ProviderRateLimiter::new("alpha", &config(RateLimitMode::Queue, 1)).unwrap());
        limiter.acquire().await.unwrap();
        limiter.acquire().await.unwrap();

        let waiter = {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move { limiter.acquire().await })
        };
        // Let the waiter take the only queue slot.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let err = limiter.acquire().await.unwrap_err();
        assert!(matches!(err, GatewayError::RateLimitExceeded { .. }));
        assert!(!waiter.is_finished());
        waiter.abort();
    }

    #[tokio::test]
    async fn test_per_call_override() {
        let limiter = ProviderRateLimiter::new("alpha", &config(RateLimitMode::Queue, 8)).unwrap();
        limiter.acquire().await.unwrap();
        limiter.acquire().await.unwrap();
        assert!(limiter.acquire_with(RateLimitMode::FailFast).await.is_err());
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut bad = config(RateLimitMode::Queue, 1);
        bad.requests_per_second = 0.0;
        assert!(ProviderRateLimiter::new("alpha", &bad).is_err());

        let mut bad = config(RateLimitMode::Queue, 1);
        bad.burst_size = 0;
        assert!(ProviderRateLimiter::new("alpha", &bad).is_err());
    }
}
