//! Failsafe mechanisms: health tracking, circuit breaking, failure
//! classification and retry

mod circuit_breaker;
mod classify;
mod health;
mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use classify::{DETECTION_SIGNALS, FailureClass, classify, has_detection_signal};
pub use health::{DEFAULT_FAILURE_THRESHOLD, HealthSnapshot, HealthTracker};
pub use retry::{AttemptRecord, Outcome, RetryDecision, RetryPolicy, attempt_with_retry};

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::ErrorCode;

/// Why a provider can or cannot take a request right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    /// Circuit closed and provider healthy
    Available,
    /// Circuit open and cooldown not yet elapsed
    CircuitOpen,
    /// Too many consecutive failures
    Unhealthy,
}

impl Availability {
    /// Error code recorded when a provider is skipped
    #[must_use]
    pub fn skip_code(self) -> Option<ErrorCode> {
        match self {
            Self::Available => None,
            Self::CircuitOpen => Some(ErrorCode::CircuitOpen),
            Self::Unhealthy => Some(ErrorCode::Unhealthy),
        }
    }
}

/// Health tracker and circuit breaker of one provider
pub struct ProviderGuard {
    /// Health tracker
    pub health: HealthTracker,
    /// Circuit breaker
    pub circuit: CircuitBreaker,
}

impl ProviderGuard {
    /// Create a guard for a provider
    #[must_use]
    pub fn new(name: &str, failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            health: HealthTracker::new(name, failure_threshold),
            circuit: CircuitBreaker::new(name, cooldown),
        }
    }

    /// Combined availability check. May close an expired circuit.
    pub fn availability(&self) -> Availability {
        if self.circuit.is_open(&self.health) {
            Availability::CircuitOpen
        } else if !self.health.is_healthy() {
            Availability::Unhealthy
        } else {
            Availability::Available
        }
    }

    /// `true` when the provider may be called
    pub fn is_available(&self) -> bool {
        self.availability() == Availability::Available
    }

    /// Record a successful router-level attempt
    pub fn record_success(&self) {
        self.health.record_success();
    }

    /// Record a failed router-level attempt; blocking signals trip the breaker
    pub fn record_failure(&self, class: FailureClass) {
        self.health.record_failure();
        if class.opens_circuit() {
            self.circuit.open();
        }
    }

    /// Close the circuit and clear the failure run
    pub fn reset(&self) {
        self.circuit.close();
        self.health.reset();
    }

    /// Status for dashboards. Reads through the lazy circuit close.
    pub fn status(&self) -> ProviderStatus {
        let circuit_open = self.circuit.is_open(&self.health);
        let health = self.health.snapshot();
        ProviderStatus {
            healthy: health.healthy,
            failures: health.consecutive_failures,
            circuit_open,
            circuit_opened_at: self.circuit.opened_at(),
            cooldown_remaining_ms: self
                .circuit
                .remaining_cooldown()
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            last_checked_at: health.last_checked_at,
            success_count: health.success_count,
            failure_count: health.failure_count,
        }
    }
}

/// Externally visible provider status
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatus {
    /// Below the failure threshold
    pub healthy: bool,
    /// Consecutive failures
    pub failures: u32,
    /// Circuit breaker open
    pub circuit_open: bool,
    /// When the circuit was opened
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circuit_opened_at: Option<DateTime<Utc>>,
    /// Cooldown left before the circuit can close
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_remaining_ms: Option<u64>,
    /// Time of the last recorded outcome
    pub last_checked_at: Option<DateTime<Utc>>,
    /// Total successful attempts
    pub success_count: u64,
    /// Total failed attempts
    pub failure_count: u64,
}

impl ProviderStatus {
    /// Provider would be tried by the next route
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.healthy && !self.circuit_open
    }
}
