//! Provider health tracking
//!
//! A provider is healthy while its run of consecutive failures stays below
//! the configured threshold. Any success, or an explicit reset from the
//! circuit breaker, wipes the run.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Default consecutive failures before a provider is marked unhealthy
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

#[derive(Debug, Default)]
struct HealthState {
    consecutive_failures: u32,
    last_checked_at: Option<DateTime<Utc>>,
    success_count: u64,
    failure_count: u64,
}

/// Per-provider health tracker
///
/// All counters live behind one mutex so that a failure recorded by one
/// request can never be lost to a concurrent success or reset.
pub struct HealthTracker {
    /// Provider name
    name: String,
    /// Failures in a row before the provider is unhealthy
    failure_threshold: u32,
    state: Mutex<HealthState>,
}

impl HealthTracker {
    /// Create a new health tracker
    #[must_use]
    pub fn new(name: &str, failure_threshold: u32) -> Self {
        Self {
            name: name.to_string(),
            failure_threshold: failure_threshold.max(1),
            state: Mutex::new(HealthState::default()),
        }
    }

    /// Record the final outcome of one routing attempt
    pub fn record_outcome(&self, success: bool) {
        if success {
            self.record_success();
        } else {
            self.record_failure();
        }
    }

    /// Record a successful attempt
    pub fn record_success(&self) {
        let mut state = self.state.lock();
        let was_unhealthy = state.consecutive_failures >= self.failure_threshold;
        state.consecutive_failures = 0;
        state.success_count += 1;
        state.last_checked_at = Some(Utc::now());
        drop(state);

        if was_unhealthy {
            info!(provider = %self.name, "Provider recovered");
        }
    }

    /// Record a failed attempt, returning the new consecutive failure count
    pub fn record_failure(&self) -> u32 {
        let mut state = self.state.lock();
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.failure_count += 1;
        state.last_checked_at = Some(Utc::now());
        let consecutive = state.consecutive_failures;
        drop(state);

        if consecutive == self.failure_threshold {
            warn!(
                provider = %self.name,
                consecutive_failures = consecutive,
                "Provider marked unhealthy"
            );
        } else {
            debug!(provider = %self.name, consecutive_failures = consecutive, "Failure recorded");
        }
        consecutive
    }

    /// Check if the provider is currently healthy. Never mutates state.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.state.lock().consecutive_failures < self.failure_threshold
    }

    /// Current run of consecutive failures
    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.state.lock().consecutive_failures
    }

    /// Give the provider a clean slate (used when its circuit closes)
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.consecutive_failures = 0;
        state.last_checked_at = Some(Utc::now());
        drop(state);

        debug!(provider = %self.name, "Health failures reset");
    }

    /// Snapshot of the current health
    #[must_use]
    pub fn snapshot(&self) -> HealthSnapshot {
        let state = self.state.lock();
        HealthSnapshot {
            healthy: state.consecutive_failures < self.failure_threshold,
            consecutive_failures: state.consecutive_failures,
            last_checked_at: state.last_checked_at,
            success_count: state.success_count,
            failure_count: state.failure_count,
        }
    }
}

/// Health snapshot
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    /// Current health status
    pub healthy: bool,
    /// Consecutive failures
    pub consecutive_failures: u32,
    /// Time of the last recorded outcome
    pub last_checked_at: Option<DateTime<Utc>>,
    /// Total successful attempts
    pub success_count: u64,
    /// Total failed attempts
    pub failure_count: u64,
}
