//! Usage statistics for the router
//!
//! Counts routes and per-provider outcomes. Counters are monotonic and
//! independent of health state, so they survive circuit resets.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

#[derive(Default)]
struct ProviderCounters {
    attempts: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    skips: AtomicU64,
    /// Sum of successful response times
    latency_ms: AtomicU64,
}

/// Usage statistics
pub struct UsageStats {
    /// Routes started
    total_routes: AtomicU64,
    /// Routes that produced a reply
    successful_routes: AtomicU64,
    /// Per-provider counters
    providers: DashMap<String, ProviderCounters>,
}

impl UsageStats {
    /// Create new statistics tracker
    #[must_use]
    pub fn new() -> Self {
        Self {
            total_routes: AtomicU64::new(0),
            successful_routes: AtomicU64::new(0),
            providers: DashMap::new(),
        }
    }

    /// Record the start of a route
    pub fn record_route(&self) {
        self.total_routes.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a provider answering a route
    pub fn record_success(&self, provider: &str, latency: Duration) {
        self.successful_routes.fetch_add(1, Ordering::Relaxed);
        let counters = self.providers.entry(provider.to_string()).or_default();
        counters.attempts.fetch_add(1, Ordering::Relaxed);
        counters.successes.fetch_add(1, Ordering::Relaxed);
        counters.latency_ms.fetch_add(
            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );
    }

    /// Record a provider failing after its retries
    pub fn record_failure(&self, provider: &str) {
        let counters = self.providers.entry(provider.to_string()).or_default();
        counters.attempts.fetch_add(1, Ordering::Relaxed);
        counters.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a provider skipped as unavailable
    pub fn record_skip(&self, provider: &str) {
        self.providers
            .entry(provider.to_string())
            .or_default()
            .skips
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of current statistics
    pub fn snapshot(&self) -> StatsSnapshot {
        let routes = self.total_routes.load(Ordering::Relaxed);
        let successful = self.successful_routes.load(Ordering::Relaxed);

        let mut providers: Vec<ProviderUsage> = self
            .providers
            .iter()
            .map(|entry| {
                let c = entry.value();
                let successes = c.successes.load(Ordering::Relaxed);
                let latency = c.latency_ms.load(Ordering::Relaxed);
                ProviderUsage {
                    provider: entry.key().clone(),
                    attempts: c.attempts.load(Ordering::Relaxed),
                    successes,
                    failures: c.failures.load(Ordering::Relaxed),
                    skips: c.skips.load(Ordering::Relaxed),
                    avg_response_time_ms: latency.checked_div(successes),
                }
            })
            .collect();
        providers.sort_by(|a, b| a.provider.cmp(&b.provider));

        #[allow(clippy::cast_precision_loss)]
        let success_rate = if routes > 0 {
            successful as f64 / routes as f64
        } else {
            0.0
        };

        StatsSnapshot {
            routes,
            successful_routes: successful,
            success_rate,
            providers,
        }
    }
}

impl Default for UsageStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of usage statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Routes started
    pub routes: u64,
    /// Routes that produced a reply
    pub successful_routes: u64,
    /// Success rate (0.0-1.0)
    pub success_rate: f64,
    /// Per-provider usage, sorted by name
    pub providers: Vec<ProviderUsage>,
}

/// Per-provider usage entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderUsage {
    /// Provider name
    pub provider: String,
    /// Router-level attempts (retries inside one attempt count once)
    pub attempts: u64,
    /// Attempts that produced a reply
    pub successes: u64,
    /// Attempts that failed after retries
    pub failures: u64,
    /// Times skipped as unavailable
    pub skips: u64,
    /// Mean latency of successful attempts
    pub avg_response_time_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot() {
        let stats = UsageStats::new();
        stats.record_route();
        stats.record_failure("a");
        stats.record_success("b", Duration::from_millis(100));
        stats.record_route();
        stats.record_skip("a");
        stats.record_success("b", Duration::from_millis(300));
        stats.record_route();
        stats.record_skip("a");
        stats.record_failure("b");

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.routes, 3);
        assert_eq!(snapshot.successful_routes, 2);
        assert!((snapshot.success_rate - 0.666).abs() < 0.01);

        assert_eq!(snapshot.providers.len(), 2);
        let a = &snapshot.providers[0];
        assert_eq!(a.provider, "a");
        assert_eq!(a.attempts, 1);
        assert_eq!(a.failures, 1);
        assert_eq!(a.skips, 2);
        assert_eq!(a.avg_response_time_ms, None);

        let b = &snapshot.providers[1];
        assert_eq!(b.attempts, 3);
        assert_eq!(b.successes, 2);
        assert_eq!(b.failures, 1);
        assert_eq!(b.avg_response_time_ms, Some(200));
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = UsageStats::default().snapshot();
        assert_eq!(snapshot.routes, 0);
        assert!(snapshot.success_rate.abs() < f64::EPSILON);
        assert!(snapshot.providers.is_empty());
    }
}
