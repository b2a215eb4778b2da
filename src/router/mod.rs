//! Multi-provider routing
//!
//! Providers are tried one at a time in fixed priority order. A provider
//! that is unavailable (circuit open, or unhealthy) is skipped without a
//! call. The first provider to answer wins and later providers are never
//! touched; failures update health state once per provider and move on.

mod result;
mod state;

pub use result::{
    ProviderFailure, RouteOptions, RoutingMetadata, RoutingResult, SkippedProvider,
};
pub use state::RouterState;

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::ErrorCode;
use crate::failsafe::{
    Availability, FailureClass, Outcome, ProviderStatus, RetryPolicy, attempt_with_retry,
};
use crate::provider::{HttpProvider, Provider, ProviderRequest};
use crate::stats::UsageStats;
use crate::trace;
use crate::transport::{HttpTransport, Transport, TransportError};
use crate::Result;

/// Routes messages across providers with retry and fallback
pub struct ProviderRouter {
    /// Candidates, sorted by priority (stable)
    providers: Vec<Arc<dyn Provider>>,
    /// Health and circuit state
    state: Arc<RouterState>,
    /// Retry policy applied to every provider
    policy: RetryPolicy,
    /// Usage counters
    stats: Arc<UsageStats>,
}

impl ProviderRouter {
    /// Create a router over `providers`
    #[must_use]
    pub fn new(
        mut providers: Vec<Arc<dyn Provider>>,
        state: Arc<RouterState>,
        policy: RetryPolicy,
    ) -> Self {
        providers.sort_by_key(|p| p.priority());
        Self {
            providers,
            state,
            policy,
            stats: Arc::new(UsageStats::new()),
        }
    }

    /// Build a router with HTTP providers from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn from_config(config: &Config) -> Result<Self> {
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new()?);
        let providers: Vec<Arc<dyn Provider>> = config
            .providers_by_priority()
            .into_iter()
            .map(|p| {
                Arc::new(HttpProvider::from_config(p, Arc::clone(&transport))) as Arc<dyn Provider>
            })
            .collect();

        let state = Arc::new(RouterState::new(config.routing.failure_threshold));
        Ok(Self::new(providers, state, RetryPolicy::new(&config.routing)))
    }

    /// Share an existing stats collector
    #[must_use]
    pub fn with_stats(mut self, stats: Arc<UsageStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Providers in attempt order
    pub fn providers(&self) -> &[Arc<dyn Provider>] {
        &self.providers
    }

    /// Router state
    pub fn state(&self) -> &Arc<RouterState> {
        &self.state
    }

    /// Usage counters
    pub fn stats(&self) -> &Arc<UsageStats> {
        &self.stats
    }

    /// Availability of one provider. May close an expired circuit.
    pub fn availability(&self, provider: &dyn Provider) -> Availability {
        self.state
            .guard(provider.name(), provider.cooldown())
            .availability()
    }

    /// Route a message to the first provider that answers
    pub async fn route(&self, message: &str, options: &RouteOptions) -> RoutingResult {
        let trace_id = trace::generate();
        trace::with_trace_id(trace_id.clone(), self.route_inner(message, options, trace_id)).await
    }

    #[tracing::instrument(skip_all, fields(trace_id = %trace_id))]
    async fn route_inner(
        &self,
        message: &str,
        options: &RouteOptions,
        trace_id: String,
    ) -> RoutingResult {
        let started = Instant::now();
        let elapsed_ms = || u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let mut metadata = RoutingMetadata {
            trace_id,
            ..RoutingMetadata::default()
        };

        self.stats.record_route();

        for provider in &self.providers {
            if options.is_cancelled() {
                info!("Route cancelled by caller");
                return RoutingResult::failure(ErrorCode::Cancelled, elapsed_ms(), metadata);
            }

            let name = provider.name();
            let guard = self.state.guard(name, provider.cooldown());

            if let Some(reason) = guard.availability().skip_code() {
                debug!(provider = name, reason = %reason, "Skipping provider");
                self.stats.record_skip(name);
                metadata.skipped.push(SkippedProvider {
                    provider: name.to_string(),
                    reason,
                });
                continue;
            }

            let request = ProviderRequest {
                message: message.to_string(),
                options: options.params.clone(),
                timeout: self.policy.timeout,
                cancel: options.cancel.clone(),
            };

            let attempt_started = Instant::now();
            let outcome = attempt_with_retry(
                &self.policy,
                provider.as_ref(),
                &request,
                &mut metadata.attempts,
            )
            .await;

            match outcome {
                Outcome::Success(reply) => {
                    guard.record_success();
                    self.stats.record_success(name, attempt_started.elapsed());
                    info!(provider = name, "Provider answered");
                    metadata.provider = reply.metadata;
                    return RoutingResult::success(reply.text, name, elapsed_ms(), metadata);
                }
                Outcome::Failure {
                    error: TransportError::Cancelled,
                    ..
                } if options.is_cancelled() => {
                    // Not the provider's fault; leave its health alone
                    info!(provider = name, "Route cancelled by caller");
                    return RoutingResult::failure(ErrorCode::Cancelled, elapsed_ms(), metadata);
                }
                Outcome::Failure { class, error } => {
                    guard.record_failure(class);
                    self.stats.record_failure(name);
                    if class == FailureClass::Detection {
                        warn!(provider = name, error = %error, "Provider blocked, circuit opened");
                    } else {
                        warn!(provider = name, class = %class, error = %error, "Provider failed, falling back");
                    }
                    metadata.failures.push(ProviderFailure {
                        provider: name.to_string(),
                        code: class.error_code(),
                    });
                }
            }
        }

        warn!(
            skipped = metadata.skipped.len(),
            failed = metadata.failures.len(),
            "All providers unavailable"
        );
        RoutingResult::failure(ErrorCode::AllProvidersUnavailable, elapsed_ms(), metadata)
    }

    /// Health of every configured provider, keyed by name
    pub fn health_status(&self) -> BTreeMap<String, ProviderStatus> {
        self.providers
            .iter()
            .map(|p| {
                let guard = self.state.guard(p.name(), p.cooldown());
                (p.name().to_string(), guard.status())
            })
            .collect()
    }

    /// Operator reset of one provider. Returns `false` for unknown names.
    pub fn reset(&self, name: &str) -> bool {
        let Some(provider) = self.providers.iter().find(|p| p.name() == name) else {
            return false;
        };
        self.state.guard(provider.name(), provider.cooldown()).reset();
        info!(provider = name, "Provider reset by operator");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProviderConfig, RoutingConfig};
    use crate::failsafe::CircuitState;
    use crate::provider::ProviderReply;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    type Step = std::result::Result<ProviderReply, TransportError>;

    struct Scripted {
        name: String,
        priority: u32,
        calls: AtomicU32,
        script: Mutex<VecDeque<Step>>,
        fallback: Step,
    }

    impl Scripted {
        fn new(name: &str, priority: u32, script: Vec<Step>, fallback: Step) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                priority,
                calls: AtomicU32::new(0),
                script: Mutex::new(script.into()),
                fallback,
            })
        }

        fn always(name: &str, priority: u32, step: Step) -> Arc<Self> {
            Self::new(name, priority, Vec::new(), step)
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Provider for Scripted {
        fn name(&self) -> &str {
            &self.name
        }
        fn priority(&self) -> u32 {
            self.priority
        }
        fn cooldown(&self) -> Duration {
            Duration::from_secs(60)
        }
        async fn attempt(&self, _request: &ProviderRequest) -> Step {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone())
        }
    }

    fn timeout() -> Step {
        Err(TransportError::Timeout(Duration::from_secs(45)))
    }

    fn forbidden() -> Step {
        Err(TransportError::Status {
            status: 403,
            message: "HTTP 403 Forbidden".to_string(),
        })
    }

    fn reply(text: &str) -> Step {
        Ok(ProviderReply::text(text))
    }

    fn router(providers: Vec<Arc<dyn Provider>>) -> ProviderRouter {
        ProviderRouter::new(providers, Arc::new(RouterState::default()), RetryPolicy::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_fall_back_to_next_provider() {
        let a = Scripted::always("A", 1, timeout());
        let b = Scripted::always("B", 2, reply("hello from B"));
        let router = router(vec![a.clone(), b.clone()]);

        let result = router.route("hi", &RouteOptions::default()).await;

        assert!(result.success);
        assert_eq!(result.provider_used.as_deref(), Some("B"));
        assert_eq!(result.text.as_deref(), Some("hello from B"));
        assert_eq!(a.calls(), 3);
        assert_eq!(b.calls(), 1);
        assert_eq!(result.transport_calls(), 4);

        let status = router.health_status();
        assert_eq!(status["A"].failures, 1);
        assert!(status["A"].healthy);
        assert!(!status["A"].circuit_open);
        assert_eq!(status["B"].failures, 0);
        assert!(result.metadata.trace_id.starts_with("rt-"));
        assert_eq!(result.metadata.failures[0].code, ErrorCode::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detection_opens_circuit_and_falls_back() {
        let a = Scripted::always("A", 1, forbidden());
        let b = Scripted::always("B", 2, reply("ok"));
        let router = router(vec![a.clone(), b.clone()]);

        let result = router.route("hi", &RouteOptions::default()).await;

        assert_eq!(result.provider_used.as_deref(), Some("B"));
        assert_eq!(a.calls(), 1);
        assert_eq!(result.metadata.failures[0].code, ErrorCode::DetectionBlocked);
        let guard = router.state().get("A").unwrap();
        assert_eq!(guard.circuit.state(), CircuitState::Open);

        // Open circuit: A is never called during cooldown
        let second = router.route("again", &RouteOptions::default()).await;
        assert!(second.success);
        assert_eq!(a.calls(), 1);
        assert_eq!(second.metadata.skipped[0].provider, "A");
        assert_eq!(second.metadata.skipped[0].reason, ErrorCode::CircuitOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_closes_after_cooldown() {
        let a = Scripted::new("A", 1, vec![forbidden()], reply("A is back"));
        let router = router(vec![a.clone()]);

        let first = router.route("hi", &RouteOptions::default()).await;
        assert_eq!(first.error, Some(ErrorCode::AllProvidersUnavailable));

        tokio::time::advance(Duration::from_secs(61)).await;

        let second = router.route("hi", &RouteOptions::default()).await;
        assert!(second.success);
        assert_eq!(second.provider_used.as_deref(), Some("A"));
        assert_eq!(router.health_status()["A"].failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_unavailable_makes_no_calls() {
        let a = Scripted::always("A", 1, reply("a"));
        let b = Scripted::always("B", 2, reply("b"));
        let router = router(vec![a.clone(), b.clone()]);
        router.state().guard("A", Duration::from_secs(60)).circuit.open();
        router.state().guard("B", Duration::from_secs(60)).circuit.open();

        let result = router.route("hi", &RouteOptions::default()).await;

        assert!(!result.success);
        assert_eq!(result.error, Some(ErrorCode::AllProvidersUnavailable));
        assert_eq!(
            result.message.as_deref(),
            Some(ErrorCode::AllProvidersUnavailable.user_message())
        );
        assert_eq!(result.transport_calls(), 0);
        assert_eq!(a.calls() + b.calls(), 0);
        assert_eq!(result.metadata.skipped.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_failures_mark_provider_unhealthy() {
        let a = Scripted::always("A", 1, Err(TransportError::Connect("refused".into())));
        let b = Scripted::always("B", 2, reply("b"));
        let router = router(vec![a.clone(), b.clone()]);

        for _ in 0..5 {
            let result = router.route("hi", &RouteOptions::default()).await;
            assert_eq!(result.provider_used.as_deref(), Some("B"));
        }
        assert_eq!(a.calls(), 15);
        let status = &router.health_status()["A"];
        assert!(!status.healthy);
        assert!(!status.circuit_open);

        let result = router.route("hi", &RouteOptions::default()).await;
        assert_eq!(a.calls(), 15);
        assert_eq!(result.metadata.skipped[0].reason, ErrorCode::Unhealthy);

        assert!(router.reset("A"));
        assert!(router.health_status()["A"].healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failure_run() {
        let a = Scripted::new("A", 1, vec![timeout(), timeout(), timeout()], reply("a"));
        let b = Scripted::always("B", 2, reply("b"));
        let router = router(vec![a.clone(), b]);

        router.route("hi", &RouteOptions::default()).await;
        assert_eq!(router.health_status()["A"].failures, 1);

        let result = router.route("hi", &RouteOptions::default()).await;
        assert_eq!(result.provider_used.as_deref(), Some("A"));
        assert_eq!(router.health_status()["A"].failures, 0);
    }

    #[tokio::test]
    async fn test_empty_provider_list() {
        let router = router(Vec::new());
        let result = router.route("hi", &RouteOptions::default()).await;
        assert!(!result.success);
        assert_eq!(result.error, Some(ErrorCode::AllProvidersUnavailable));
        assert_eq!(result.transport_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_priority_order_ignores_insertion_order() {
        let low = Scripted::always("low", 10, reply("low"));
        let high = Scripted::always("high", 1, reply("high"));
        let router = router(vec![low.clone(), high.clone()]);

        let result = router.route("hi", &RouteOptions::default()).await;
        assert_eq!(result.provider_used.as_deref(), Some("high"));
        assert_eq!(low.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_route_leaves_health_alone() {
        let a = Scripted::always("A", 1, Err(TransportError::Cancelled));
        let b = Scripted::always("B", 2, reply("b"));
        let router = router(vec![a.clone(), b.clone()]);
        let token = CancellationToken::new();
        token.cancel();

        let result = router
            .route("hi", &RouteOptions::default().with_cancel(token))
            .await;

        assert_eq!(result.error, Some(ErrorCode::Cancelled));
        assert_eq!(a.calls() + b.calls(), 0);
        assert_eq!(router.health_status()["A"].failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_follow_routes() {
        let a = Scripted::always("A", 1, forbidden());
        let b = Scripted::always("B", 2, reply("b"));
        let stats = Arc::new(UsageStats::new());
        let router = router(vec![a, b]).with_stats(Arc::clone(&stats));

        router.route("one", &RouteOptions::default()).await;
        router.route("two", &RouteOptions::default()).await;

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.routes, 2);
        assert_eq!(snapshot.successful_routes, 2);
        let a = &snapshot.providers[0];
        assert_eq!((a.failures, a.skips), (1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_metadata_is_returned() {
        let mut metadata = serde_json::Map::new();
        metadata.insert("model".into(), serde_json::json!("m-1"));
        let a = Scripted::always(
            "A",
            1,
            Ok(ProviderReply {
                text: "hi".into(),
                metadata,
            }),
        );
        let router = router(vec![a]);
        let result = router.route("hi", &RouteOptions::default()).await;
        assert_eq!(result.metadata.provider["model"], "m-1");
    }

    #[test]
    fn test_from_config_orders_by_priority() {
        let config = Config {
            routing: RoutingConfig {
                failure_threshold: 7,
                ..Default::default()
            },
            providers: vec![
                ProviderConfig {
                    name: "backup".into(),
                    priority: 2,
                    endpoint: "https://backup.example.com".into(),
                    ..Default::default()
                },
                ProviderConfig {
                    name: "primary".into(),
                    priority: 1,
                    endpoint: "https://primary.example.com".into(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        let router = ProviderRouter::from_config(&config).unwrap();
        let names: Vec<&str> = router.providers().iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["primary", "backup"]);
        assert_eq!(router.state().failure_threshold(), 7);
        assert!(!router.reset("nope"));
        assert!(router.reset("primary"));
    }
}
