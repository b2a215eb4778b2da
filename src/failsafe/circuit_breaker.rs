//! Circuit breaker implementation
//!
//! The breaker is opened explicitly when a provider shows blocking signals
//! and stays open for a per-provider cooldown. Closing is pull-based: the
//! first read after the cooldown has elapsed performs the transition and
//! gives the paired [`HealthTracker`] a clean slate. No timer runs in the
//! background, so a breaker nobody reads stays open past its cooldown.

use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

use super::HealthTracker;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed (allowing requests)
    Closed,
    /// Circuit is open (blocking requests)
    Open,
}

#[derive(Debug, Default)]
struct Inner {
    opened_at: Option<Instant>,
    opened_at_wall: Option<DateTime<Utc>>,
    cooldown: Duration,
    open_count: u64,
}

/// Per-provider circuit breaker
pub struct CircuitBreaker {
    /// Provider name
    name: String,
    /// Cooldown used by [`CircuitBreaker::open`]
    default_cooldown: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Create a new, closed circuit breaker
    #[must_use]
    pub fn new(name: &str, cooldown: Duration) -> Self {
        Self {
            name: name.to_string(),
            default_cooldown: cooldown,
            inner: Mutex::new(Inner {
                cooldown,
                ..Inner::default()
            }),
        }
    }

    /// Check whether the circuit is open.
    ///
    /// An open circuit whose cooldown has elapsed is closed here, and the
    /// paired health tracker is reset. The transition happens at most once
    /// per opening; later reads see the already-closed state.
    pub fn is_open(&self, health: &HealthTracker) -> bool {
        let mut inner = self.inner.lock();
        let Some(opened_at) = inner.opened_at else {
            return false;
        };

        if opened_at.elapsed() < inner.cooldown {
            return true;
        }

        inner.opened_at = None;
        inner.opened_at_wall = None;
        // Reset while still holding the lock so a racing reader cannot
        // observe "closed" before the health slate is clean.
        health.reset();
        drop(inner);

        info!(provider = %self.name, "Circuit breaker closed after cooldown");
        false
    }

    /// Open the circuit for the configured cooldown
    pub fn open(&self) {
        self.open_for(self.default_cooldown);
    }

    /// Open the circuit for an explicit cooldown
    pub fn open_for(&self, cooldown: Duration) {
        let mut inner = self.inner.lock();
        inner.opened_at = Some(Instant::now());
        inner.opened_at_wall = Some(Utc::now());
        inner.cooldown = cooldown;
        inner.open_count += 1;
        drop(inner);

        warn!(
            provider = %self.name,
            cooldown_ms = u64::try_from(cooldown.as_millis()).unwrap_or(u64::MAX),
            "Circuit breaker opened"
        );
    }

    /// Close the circuit immediately (operator reset)
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.opened_at = None;
        inner.opened_at_wall = None;
    }

    /// Combined availability: circuit closed and provider healthy
    pub fn is_available(&self, health: &HealthTracker) -> bool {
        !self.is_open(health) && health.is_healthy()
    }

    /// Current state without triggering the lazy close
    #[must_use]
    pub fn state(&self) -> CircuitState {
        if self.inner.lock().opened_at.is_some() {
            CircuitState::Open
        } else {
            CircuitState::Closed
        }
    }

    /// Time left before the next read would close the circuit
    #[must_use]
    pub fn remaining_cooldown(&self) -> Option<Duration> {
        let inner = self.inner.lock();
        inner
            .opened_at
            .map(|opened_at| inner.cooldown.saturating_sub(opened_at.elapsed()))
    }

    /// Wall-clock time of the current opening
    #[must_use]
    pub fn opened_at(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().opened_at_wall
    }

    /// How many times the circuit has been opened
    #[must_use]
    pub fn open_count(&self) -> u64 {
        self.inner.lock().open_count
    }

    /// Human-readable status for logs and error payloads
    #[must_use]
    pub fn status_message(&self) -> String {
        match self.remaining_cooldown() {
            Some(remaining) => format!(
                "Provider '{}' circuit breaker is open (retry in {} seconds)",
                self.name,
                remaining.as_secs()
            ),
            None => format!("Provider '{}' circuit breaker is closed", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_closed() {
        let health = HealthTracker::new("p", 5);
        let cb = CircuitBreaker::new("p", Duration::from_secs(30));
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(!cb.is_open(&health));
        assert!(cb.is_available(&health));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_blocks_until_cooldown() {
        let health = HealthTracker::new("p", 5);
        let cb = CircuitBreaker::new("p", Duration::from_secs(30));

        cb.open();
        assert!(cb.is_open(&health));
        assert!(!cb.is_available(&health));

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(cb.is_open(&health));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!cb.is_open(&health));
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lazy_close_resets_health_exactly_once() {
        let health = HealthTracker::new("p", 5);
        let cb = CircuitBreaker::new("p", Duration::from_secs(10));

        for _ in 0..3 {
            health.record_failure();
        }
        cb.open();

        tokio::time::advance(Duration::from_secs(10)).await;
        // State stays open until somebody reads it
        assert_eq!(cb.state(), CircuitState::Open);

        assert!(!cb.is_open(&health));
        assert_eq!(health.consecutive_failures(), 0);

        // Failures after the close must survive further reads
        health.record_failure();
        assert!(!cb.is_open(&health));
        assert!(!cb.is_open(&health));
        assert_eq!(health.consecutive_failures(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lazy_close_restores_unhealthy_provider() {
        let health = HealthTracker::new("p", 2);
        let cb = CircuitBreaker::new("p", Duration::from_secs(5));
        health.record_failure();
        health.record_failure();
        cb.open();
        assert!(!cb.is_available(&health));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(cb.is_available(&health));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_for_overrides_cooldown() {
        let health = HealthTracker::new("p", 5);
        let cb = CircuitBreaker::new("p", Duration::from_secs(300));

        cb.open_for(Duration::from_secs(1));
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!cb.is_open(&health));

        // Plain open() goes back to the configured cooldown
        cb.open();
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cb.is_open(&health));
        assert_eq!(cb.open_count(), 2);
    }

    #[test]
    fn test_unhealthy_provider_is_unavailable_with_closed_circuit() {
        let health = HealthTracker::new("p", 1);
        let cb = CircuitBreaker::new("p", Duration::from_secs(30));
        health.record_failure();
        assert!(!cb.is_open(&health));
        assert!(!cb.is_available(&health));
    }

    #[test]
    fn test_close_is_immediate() {
        let health = HealthTracker::new("p", 5);
        let cb = CircuitBreaker::new("p", Duration::from_secs(30));
        cb.open();
        cb.close();
        assert!(!cb.is_open(&health));
        assert!(cb.opened_at().is_none());
    }

    #[test]
    fn test_status_message() {
        let cb = CircuitBreaker::new("search-primary", Duration::from_secs(120));
        assert!(cb.status_message().contains("closed"));

        cb.open();
        let message = cb.status_message();
        assert!(message.contains("Provider 'search-primary'"));
        assert!(message.contains("circuit breaker is open"));
        assert!(message.contains("retry in"));
        assert!(cb.opened_at().is_some());
    }
}
