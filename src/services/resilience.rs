//! Resilience decorator around a model provider.
//!
//! Every logical call passes, outermost first, through
//! bulkhead → hard deadline → retry → circuit breaker → rate limiter →
//! per-call timeout → adapter.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::errors::{GatewayError, GatewayResult};
use crate::domain::models::{
    normalize_non_empty, CircuitBreakerConfig, CompletionOptions, EmbeddingVector,
    ProviderHealth, ProviderKind, RateLimitMode, ResilienceConfig,
};
use crate::domain::ports::ModelProvider;
use crate::services::bulkhead::Bulkhead;
use crate::services::circuit_breaker::CircuitBreaker;
use crate::services::rate_limiter::ProviderRateLimiter;
use crate::services::retry::RetryPolicy;

/// A provider wrapped in its resilience policies. Itself a [`ModelProvider`].
pub struct ResilientProvider {
    inner: Arc<dyn ModelProvider>,
    circuit_breaker: CircuitBreaker,
    retry: RetryPolicy,
    rate_limiter: ProviderRateLimiter,
    bulkhead: Bulkhead,
    per_call_timeout: Duration,
}

impl std::fmt::Debug for ResilientProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientProvider")
            .field("provider", &self.inner.name())
            .field("retry", &self.retry)
            .field("rate_limiter", &self.rate_limiter)
            .field("bulkhead", &self.bulkhead)
            .field("per_call_timeout", &self.per_call_timeout)
            .finish_non_exhaustive()
    }
}

impl ResilientProvider {
    /// Wrap `inner` using the global policies, with an optional circuit breaker
    /// override for this provider.
    pub fn new(
        inner: Arc<dyn ModelProvider>,
        config: &ResilienceConfig,
        circuit_override: Option<&CircuitBreakerConfig>,
    ) -> GatewayResult<Self> {
        let name = inner.name().to_string();
        let circuit_config = circuit_override
            .cloned()
            .unwrap_or_else(|| config.circuit_breaker.clone());

        Ok(Self {
            circuit_breaker: CircuitBreaker::new(name.clone(), circuit_config),
            retry: RetryPolicy::from_config(&config.retry),
            rate_limiter: ProviderRateLimiter::new(name.clone(), &config.rate_limit)?,
            bulkhead: Bulkhead::new(name, config.bulkhead.max_concurrent_calls),
            per_call_timeout: Duration::from_millis(config.per_call_timeout_ms),
            inner,
        })
    }

    /// Upper bound of one logical call across all attempts.
    pub fn hard_deadline(&self) -> Duration {
        self.per_call_timeout
            .saturating_mul(self.retry.max_retries().saturating_add(1))
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.circuit_breaker
    }

    pub async fn health(&self) -> ProviderHealth {
        self.circuit_breaker.snapshot().await
    }

    /// Run `operation` through the full policy chain using the configured
    /// rate limit mode.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> GatewayResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
    {
        self.execute_with_mode(self.rate_limiter.mode(), operation)
            .await
    }

    /// Run `operation` through the full policy chain.
    pub async fn execute_with_mode<T, F, Fut>(
        &self,
        mode: RateLimitMode,
        operation: F,
    ) -> GatewayResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
    {
        let _slot = self.bulkhead.try_enter()?;
        let provider = self.inner.name();
        let operation = &operation;

        let attempts = self.retry.execute(provider, move || async move {
            self.circuit_breaker
                .call(move || async move {
                    self.rate_limiter.acquire_with(mode).await?;
                    match tokio::time::timeout(self.per_call_timeout, operation()).await {
                        Ok(result) => result,
                        Err(_) => Err(GatewayError::unavailable(
                            provider,
                            format!("call timed out after {:?}", self.per_call_timeout),
                        )),
                    }
                })
                .await
        });

        match tokio::time::timeout(self.hard_deadline(), attempts).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(provider, deadline_ms = self.hard_deadline().as_millis() as u64, "Deadline exceeded");
                Err(GatewayError::unavailable(provider, "deadline exceeded"))
            }
        }
    }
}

#[async_trait]
impl ModelProvider for ResilientProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn kind(&self) -> ProviderKind {
        self.inner.kind()
    }

    fn embedding_model(&self) -> &str {
        self.inner.embedding_model()
    }

    fn dimension(&self) -> Option<usize> {
        self.inner.dimension()
    }

    async fn embed(&self, text: &str, model_hint: Option<&str>) -> GatewayResult<EmbeddingVector> {
        normalize_non_empty(text)?;
        let inner = &self.inner;
        self.execute(move || inner.embed(text, model_hint)).await
    }

    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> GatewayResult<String> {
        if prompt.trim().is_empty() {
            return Err(GatewayError::InvalidInput("prompt is empty".to_string()));
        }
        let inner = &self.inner;
        self.execute(move || inner.complete(prompt, options)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{
        BulkheadConfig, CircuitState, RateLimitConfig, RetryConfig,
    };
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Provider that fails the first `fail_times` calls with the given error,
    /// optionally sleeping before answering.
    struct ScriptedProvider {
        calls: AtomicU32,
        fail_times: u32,
        error: GatewayError,
        delay: Duration,
    }

    impl ScriptedProvider {
        fn new(fail_times: u32, error: GatewayError) -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail_times,
                error,
                delay: Duration::ZERO,
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ModelProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "alpha"
        }

        fn kind(&self) -> ProviderKind {
            ProviderKind::Openai
        }

        fn embedding_model(&self) -> &str {
            "m1"
        }

        fn dimension(&self) -> Option<usize> {
            Some(2)
        }

        async fn embed(&self, _text: &str, _hint: Option<&str>) -> GatewayResult<EmbeddingVector> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if n < self.fail_times {
                return Err(self.error.clone());
            }
            Ok(EmbeddingVector::new(vec![1.0, 0.0], "alpha", "m1"))
        }

        async fn complete(&self, _prompt: &str, _options: &CompletionOptions) -> GatewayResult<String> {
            Ok("ok".to_string())
        }
    }

    fn config() -> ResilienceConfig {
        ResilienceConfig {
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: 3,
                window_size: 5,
                cooldown_ms: 10_000,
                max_cooldown_ms: 60_000,
                half_open_max_calls: 1,
                success_threshold: 1,
            },
            retry: RetryConfig {
                max_retries: 2,
                initial_backoff_ms: 10,
                max_backoff_ms: 100,
                multiplier: 2.0,
                randomization_factor: 0.0,
            },
            rate_limit: RateLimitConfig {
                requests_per_second: 10_000.0,
                burst_size: 10_000,
                mode: RateLimitMode::FailFast,
                max_queue_depth: 8,
            },
            bulkhead: BulkheadConfig {
                max_concurrent_calls: 4,
            },
            per_call_timeout_ms: 1_000,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_is_retried() {
        let inner = Arc::new(ScriptedProvider::new(2, GatewayError::unavailable("alpha", "503")));
        let provider = ResilientProvider::new(inner.clone(), &config(), None).unwrap();

        let vector = provider.embed("hello", None).await.unwrap();
        assert_eq!(vector.dimension, 2);
        assert_eq!(inner.calls(), 3);
        assert_eq!(provider.health().await.circuit_state, CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_failure_is_not_retried() {
        let inner = Arc::new(ScriptedProvider::new(
            10,
            GatewayError::ProviderAuth {
                provider: "alpha".to_string(),
                message: "401".to_string(),
            },
        ));
        let provider = ResilientProvider::new(inner.clone(), &config(), None).unwrap();

        let err = provider.embed("hello", None).await.unwrap_err();
        assert!(matches!(err, GatewayError::ProviderAuth { .. }));
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_text_never_reaches_provider() {
        let inner = Arc::new(ScriptedProvider::new(0, GatewayError::Cancelled));
        let provider = ResilientProvider::new(inner.clone(), &config(), None).unwrap();

        let err = provider.embed("  \n ", None).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidInput(_)));
        assert_eq!(inner.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_opens_then_fails_fast() {
        let inner = Arc::new(ScriptedProvider::new(100, GatewayError::unavailable("alpha", "503")));
        let provider = ResilientProvider::new(inner.clone(), &config(), None).unwrap();

        // One logical call makes three attempts, which opens the circuit.
        let err = provider.embed("hello", None).await.unwrap_err();
        assert!(matches!(err, GatewayError::CircuitOpen { .. } | GatewayError::ProviderUnavailable { .. }));
        assert_eq!(provider.health().await.circuit_state, CircuitState::Open);

        let before = inner.calls();
        let err = provider.embed("hello", None).await.unwrap_err();
        assert!(matches!(err, GatewayError::CircuitOpen { .. }));
        assert_eq!(inner.calls(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_call_timeout_counts_as_unavailable() {
        let mut scripted = ScriptedProvider::new(0, GatewayError::Cancelled);
        scripted.delay = Duration::from_secs(5);
        let inner = Arc::new(scripted);
        let provider = ResilientProvider::new(inner.clone(), &config(), None).unwrap();

        let err = provider.embed("hello", None).await.unwrap_err();
        assert!(matches!(err, GatewayError::ProviderUnavailable { .. }));
        assert!(provider.health().await.failure_count >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hard_deadline_bounds_logical_call() {
        let mut cfg = config();
        cfg.retry.max_retries = 1;
        cfg.retry.initial_backoff_ms = 5_000;
        cfg.retry.max_backoff_ms = 5_000;
        cfg.circuit_breaker.failure_threshold = 10;
        let inner = Arc::new(ScriptedProvider::new(100, GatewayError::unavailable("alpha", "503")));
        let provider = ResilientProvider::new(inner.clone(), &cfg, None).unwrap();
        assert_eq!(provider.hard_deadline(), Duration::from_secs(2));

        let start = tokio::time::Instant::now();
        let err = provider.embed("hello", None).await.unwrap_err();
        assert!(matches!(err, GatewayError::ProviderUnavailable { ref message, .. } if message == "deadline exceeded"));
        assert!(start.elapsed() <= Duration::from_secs(2) + Duration::from_millis(1));
        assert_eq!(inner.calls(), 1);
    }

    #[test]
    fn test_hard_deadline_saturates() {
        let mut cfg = config();
        cfg.retry.max_retries = u32::MAX;
        cfg.per_call_timeout_ms = u64::MAX;
        let inner = Arc::new(ScriptedProvider::new(0, GatewayError::unavailable("alpha", "503")));
        let provider = ResilientProvider::new(inner, &cfg, None).unwrap();
        assert_eq!(provider.hard_deadline(), Duration::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bulkhead_full_fails_fast() {
        let mut cfg = config();
        cfg.bulkhead.max_concurrent_calls = 1;
        let mut scripted = ScriptedProvider::new(0, GatewayError::Cancelled);
        scripted.delay = Duration::from_millis(500);
        let provider = Arc::new(ResilientProvider::new(Arc::new(scripted), &cfg, None).unwrap());

        let first = {
            let provider = Arc::clone(&provider);
            tokio::spawn(async move { provider.embed("one", None).await })
        };
        tokio::task::yield_now().await;

        let err = provider.embed("two", None).await.unwrap_err();
        assert!(matches!(err, GatewayError::BulkheadFull { max_concurrent: 1, .. }));
        assert!(first.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_override_is_applied() {
        let override_config = CircuitBreakerConfig {
            failure_threshold: 1,
            window_size: 1,
            ..config().circuit_breaker
        };
        let mut cfg = config();
        cfg.retry.max_retries = 0;
        let inner = Arc::new(ScriptedProvider::new(1, GatewayError::unavailable("alpha", "503")));
        let provider = ResilientProvider::new(inner, &cfg, Some(&override_config)).unwrap();

        let _ = provider.embed("hello", None).await;
        assert_eq!(provider.health().await.circuit_state, CircuitState::Open);
    }
}
