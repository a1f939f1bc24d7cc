//! Circuit breaker pattern for provider failure detection and recovery.
//!
//! Each provider owns one [`CircuitBreaker`]. Outcomes of availability-relevant
//! calls are recorded in a count-based sliding window; once enough of them fail
//! the circuit opens and calls fail fast until a cooldown elapses, after which a
//! limited number of trial calls decide whether to close or reopen.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::domain::errors::{GatewayError, GatewayResult};
use crate::domain::models::{
    CircuitBreakerConfig, CircuitState, ProviderHealth, MAX_DURATION_MS,
};

/// Result of a circuit breaker check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CircuitCheckResult {
    /// Request is allowed.
    Allowed,
    /// Request is a half-open trial call.
    Testing,
    /// Request is blocked by an open circuit.
    Blocked { retry_after: Duration },
}

impl CircuitCheckResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed | Self::Testing)
    }
}

#[derive(Debug)]
struct CircuitInner {
    state: CircuitState,
    /// Most recent outcomes, `true` for a failure.
    window: VecDeque<bool>,
    opened_until: Option<Instant>,
    opened_until_wall: Option<DateTime<Utc>>,
    last_failure_at: Option<DateTime<Utc>>,
    half_open_in_flight: u32,
    half_open_successes: u32,
    /// Incremented on every transition into half-open.
    generation: u64,
    consecutive_reopens: u32,
    open_count: u64,
}

impl CircuitInner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            window: VecDeque::new(),
            opened_until: None,
            opened_until_wall: None,
            last_failure_at: None,
            half_open_in_flight: 0,
            half_open_successes: 0,
            generation: 0,
            consecutive_reopens: 0,
            open_count: 0,
        }
    }

    fn failures_in_window(&self) -> u32 {
        self.window.iter().filter(|failed| **failed).count() as u32
    }

    fn push_outcome(&mut self, failed: bool, window_size: u32) {
        self.window.push_back(failed);
        while self.window.len() > window_size as usize {
            self.window.pop_front();
        }
    }

    fn open(&mut self, cooldown: Duration) {
        let cooldown = cooldown.min(Duration::from_millis(MAX_DURATION_MS));
        let now = Instant::now();
        self.state = CircuitState::Open;
        self.opened_until = Some(now + cooldown);
        self.opened_until_wall =
            Some(Utc::now() + chrono::Duration::from_std(cooldown).unwrap_or_default());
        self.half_open_in_flight = 0;
        self.half_open_successes = 0;
        self.open_count += 1;
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.window.clear();
        self.opened_until = None;
        self.opened_until_wall = None;
        self.half_open_in_flight = 0;
        self.half_open_successes = 0;
        self.consecutive_reopens = 0;
    }

    fn half_open(&mut self) {
        self.state = CircuitState::HalfOpen;
        self.half_open_in_flight = 0;
        self.half_open_successes = 0;
        self.generation += 1;
    }

    fn release_trial(&mut self, generation: u64) {
        if self.state == CircuitState::HalfOpen && self.generation == generation {
            self.half_open_in_flight = self.half_open_in_flight.saturating_sub(1);
        }
    }
}

/// Admission granted by [`CircuitBreaker::acquire`].
///
/// A trial permit dropped without an outcome (e.g. the call was cancelled by an
/// outer deadline) gives its half-open slot back.
#[derive(Debug)]
pub struct CircuitPermit {
    trial: Option<u64>,
    inner: Arc<RwLock<CircuitInner>>,
    resolved: bool,
}

impl CircuitPermit {
    pub fn is_trial(&self) -> bool {
        self.trial.is_some()
    }
}

impl Drop for CircuitPermit {
    fn drop(&mut self) {
        if self.resolved {
            return;
        }
        if let Some(generation) = self.trial {
            let inner = Arc::clone(&self.inner);
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    inner.write().await.release_trial(generation);
                });
            }
        }
    }
}

/// Per-provider circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    provider: String,
    config: CircuitBreakerConfig,
    inner: Arc<RwLock<CircuitInner>>,
}

impl CircuitBreaker {
    /// Create a closed circuit breaker for `provider`.
    pub fn new(provider: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            provider: provider.into(),
            config,
            inner: Arc::new(RwLock::new(CircuitInner::new())),
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    fn cooldown(&self) -> Duration {
        Duration::from_millis(self.config.cooldown_ms.min(MAX_DURATION_MS))
    }

    fn reopen_cooldown(&self, consecutive_reopens: u32) -> Duration {
        let factor = 2u64.saturating_pow(consecutive_reopens);
        let millis = self
            .config
            .cooldown_ms
            .saturating_mul(factor)
            .min(self.config.max_cooldown_ms.max(self.config.cooldown_ms));
        Duration::from_millis(millis)
    }

    /// Check whether a call may proceed, without taking a trial slot.
    pub async fn check(&self) -> CircuitCheckResult {
        let inner = self.inner.read().await;
        match inner.state {
            CircuitState::Closed => CircuitCheckResult::Allowed,
            CircuitState::Open => match inner.opened_until {
                Some(until) if Instant::now() < until => CircuitCheckResult::Blocked {
                    retry_after: until - Instant::now(),
                },
                _ => CircuitCheckResult::Testing,
            },
            CircuitState::HalfOpen => {
                if inner.half_open_in_flight < self.config.half_open_max_calls {
                    CircuitCheckResult::Testing
                } else {
                    CircuitCheckResult::Blocked {
                        retry_after: self.cooldown(),
                    }
                }
            }
        }
    }

    /// Admit a call or fail fast with `CircuitOpen`.
    pub async fn acquire(&self) -> GatewayResult<CircuitPermit> {
        let mut inner = self.inner.write().await;

        if inner.state == CircuitState::Open {
            match inner.opened_until {
                Some(until) if Instant::now() < until => {
                    return Err(GatewayError::CircuitOpen {
                        provider: self.provider.clone(),
                        retry_after: until - Instant::now(),
                    });
                }
                _ => {
                    inner.half_open();
                    tracing::info!(provider = %self.provider, state = "half_open", "Circuit admitting trial calls");
                }
            }
        }

        match inner.state {
            CircuitState::Closed => Ok(CircuitPermit {
                trial: None,
                inner: Arc::clone(&self.inner),
                resolved: false,
            }),
            CircuitState::HalfOpen => {
                if inner.half_open_in_flight >= self.config.half_open_max_calls {
                    return Err(GatewayError::CircuitOpen {
                        provider: self.provider.clone(),
                        retry_after: self.cooldown(),
                    });
                }
                inner.half_open_in_flight += 1;
                Ok(CircuitPermit {
                    trial: Some(inner.generation),
                    inner: Arc::clone(&self.inner),
                    resolved: false,
                })
            }
            CircuitState::Open => Err(GatewayError::CircuitOpen {
                provider: self.provider.clone(),
                retry_after: self.cooldown(),
            }),
        }
    }

    /// Record a successful call.
    pub async fn record_success(&self, mut permit: CircuitPermit) {
        permit.resolved = true;
        let mut inner = self.inner.write().await;
        match (inner.state, permit.trial) {
            (CircuitState::Closed, None) => {
                inner.push_outcome(false, self.config.window_size);
            }
            (CircuitState::HalfOpen, Some(generation)) if generation == inner.generation => {
                inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.success_threshold {
                    inner.close();
                    tracing::info!(provider = %self.provider, state = "closed", "Circuit closed after successful trial");
                }
            }
            _ => {}
        }
    }

    /// Record an availability failure.
    pub async fn record_failure(&self, mut permit: CircuitPermit, error: &str) {
        permit.resolved = true;
        let mut inner = self.inner.write().await;
        inner.last_failure_at = Some(Utc::now());
        match (inner.state, permit.trial) {
            (CircuitState::Closed, None) => {
                inner.push_outcome(true, self.config.window_size);
                let failures = inner.failures_in_window();
                if failures >= self.config.failure_threshold {
                    inner.consecutive_reopens = 0;
                    inner.open(self.cooldown());
                    tracing::warn!(
                        provider = %self.provider,
                        state = "open",
                        failures,
                        error,
                        "Circuit opened"
                    );
                }
            }
            (CircuitState::HalfOpen, Some(generation)) if generation == inner.generation => {
                inner.consecutive_reopens += 1;
                let cooldown = self.reopen_cooldown(inner.consecutive_reopens);
                inner.open(cooldown);
                tracing::warn!(
                    provider = %self.provider,
                    state = "open",
                    cooldown_ms = cooldown.as_millis() as u64,
                    error,
                    "Trial call failed, circuit reopened"
                );
            }
            _ => {}
        }
    }

    /// Record an outcome that says nothing about availability.
    pub async fn record_ignored(&self, mut permit: CircuitPermit) {
        permit.resolved = true;
        if let Some(generation) = permit.trial {
            self.inner.write().await.release_trial(generation);
        }
    }

    /// Run `operation` under the breaker.
    pub async fn call<T, F, Fut>(&self, operation: F) -> GatewayResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
    {
        let permit = self.acquire().await?;
        let result = operation().await;
        match &result {
            Ok(_) => self.record_success(permit).await,
            Err(err) if err.is_circuit_failure() => {
                self.record_failure(permit, &err.to_string()).await;
            }
            Err(_) => self.record_ignored(permit).await,
        }
        result
    }

    pub async fn state(&self) -> CircuitState {
        self.inner.read().await.state
    }

    /// Health snapshot for this provider.
    pub async fn snapshot(&self) -> ProviderHealth {
        let inner = self.inner.read().await;
        ProviderHealth {
            provider: self.provider.clone(),
            circuit_state: inner.state,
            failure_count: inner.failures_in_window(),
            last_failure_at: inner.last_failure_at,
            opened_until: if inner.state == CircuitState::Open {
                inner.opened_until_wall
            } else {
                None
            },
            open_count: inner.open_count,
        }
    }

    /// Manually close the circuit.
    pub async fn reset(&self) {
        let mut inner = self.inner.write().await;
        inner.close();
    }
}
