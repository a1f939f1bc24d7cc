//! Provider health snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls pass through and outcomes are recorded.
    Closed,
    /// Calls fail fast until the cooldown elapses.
    Open,
    /// A limited number of trial calls decide whether to close or reopen.
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of one provider's circuit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub provider: String,
    pub circuit_state: CircuitState,
    /// Failures in the current sliding window.
    pub failure_count: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
    /// Wall-clock time at which an open circuit admits a trial call.
    pub opened_until: Option<DateTime<Utc>>,
    /// Number of times the circuit has opened since start.
    pub open_count: u64,
}

impl ProviderHealth {
    pub fn is_available(&self) -> bool {
        self.circuit_state != CircuitState::Open
    }
}
