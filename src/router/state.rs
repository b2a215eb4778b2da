//! Per-provider router state

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::failsafe::{DEFAULT_FAILURE_THRESHOLD, ProviderGuard, ProviderStatus};

/// Health and circuit state for every provider a router manages.
///
/// Constructed once and injected into the router, so tests and callers can
/// inspect or pre-seed it. Guards are handed out as `Arc`s and never held
/// under a map lock across an `.await`.
pub struct RouterState {
    failure_threshold: u32,
    guards: DashMap<String, Arc<ProviderGuard>>,
}

impl RouterState {
    /// Create empty state with a failure threshold
    #[must_use]
    pub fn new(failure_threshold: u32) -> Self {
        Self {
            failure_threshold,
            guards: DashMap::new(),
        }
    }

    /// Guard for `name`, created with `cooldown` on first use
    pub fn guard(&self, name: &str, cooldown: Duration) -> Arc<ProviderGuard> {
        let entry = self
            .guards
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(ProviderGuard::new(name, self.failure_threshold, cooldown))
            });
        Arc::clone(entry.value())
    }

    /// Existing guard for `name`
    pub fn get(&self, name: &str) -> Option<Arc<ProviderGuard>> {
        self.guards.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Failure threshold applied to new guards
    #[must_use]
    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    /// Status of every known provider, keyed by name
    pub fn statuses(&self) -> BTreeMap<String, ProviderStatus> {
        // Collect first so no shard lock is held while reading guards
        let guards: Vec<(String, Arc<ProviderGuard>)> = self
            .guards
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();
        guards
            .into_iter()
            .map(|(name, guard)| (name, guard.status()))
            .collect()
    }
}

impl Default for RouterState {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failsafe::FailureClass;

    #[test]
    fn test_guard_is_shared_per_name() {
        let state = RouterState::default();
        let a = state.guard("a", Duration::from_secs(10));
        let again = state.guard("a", Duration::from_secs(999));
        assert!(Arc::ptr_eq(&a, &again));

        a.record_failure(FailureClass::Fatal);
        assert_eq!(state.get("a").unwrap().health.consecutive_failures(), 1);
        assert!(state.get("missing").is_none());
    }

    #[test]
    fn test_statuses_sorted_by_name() {
        let state = RouterState::new(3);
        state.guard("zeta", Duration::from_secs(1));
        state.guard("alpha", Duration::from_secs(1));
        let names: Vec<String> = state.statuses().into_keys().collect();
        assert_eq!(names, vec!["alpha".to_string(), "zeta".to_string()]);
        assert_eq!(state.failure_threshold(), 3);
    }
}
