//! Retry logic with backoff

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

use super::{FailureClass, classify};
use crate::config::RoutingConfig;
use crate::error::ErrorCode;
use crate::provider::{Provider, ProviderReply, ProviderRequest};
use crate::transport::TransportError;

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Transport calls per provider, first try included
    pub max_retries: u32,
    /// Attempt `n` waits `base_delay * n` before attempt `n + 1`
    pub base_delay: Duration,
    /// Timeout of a single transport call
    pub timeout: Duration,
}

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait, then try the same provider again
    Retry(Duration),
    /// Give up on this provider
    Stop,
}

impl RetryPolicy {
    /// Create from config
    #[must_use]
    pub fn new(config: &RoutingConfig) -> Self {
        Self {
            max_retries: config.max_retries.max(1),
            base_delay: config.base_delay,
            timeout: config.timeout,
        }
    }

    /// Delay after failed attempt `attempt` (1-based)
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    /// Decide whether failed attempt `attempt` (1-based) is followed by another
    #[must_use]
    pub fn decide(&self, attempt: u32, class: FailureClass) -> RetryDecision {
        if !class.is_retryable() || attempt >= self.max_retries {
            RetryDecision::Stop
        } else {
            RetryDecision::Retry(self.delay_for(attempt))
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&RoutingConfig::default())
    }
}

/// Result of one router-level attempt against a provider
#[derive(Debug, Clone)]
pub enum Outcome {
    /// The provider answered
    Success(ProviderReply),
    /// Every allowed call failed; carries the last failure
    Failure {
        /// Class of the last failure
        class: FailureClass,
        /// Last transport error
        error: TransportError,
    },
}

/// Record of a single transport call, returned to callers as metadata.
///
/// Carries only the classified outcome. Error text may contain provider
/// payload and stays in the logs.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    /// Provider name
    pub provider: String,
    /// 1-based call number within the provider's retry loop
    pub attempt_number: u32,
    /// Start time of the call
    pub started_at: DateTime<Utc>,
    /// Wall time spent in the call
    pub elapsed_ms: u64,
    /// `None` on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureClass>,
    /// Stable code of the failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    /// HTTP status of a rejected call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

/// Call `provider` until it answers, a failure must not be retried, or the
/// policy runs out of attempts.
///
/// This never touches health or circuit state; the router records the
/// returned outcome exactly once. Every call is appended to `log`.
pub async fn attempt_with_retry(
    policy: &RetryPolicy,
    provider: &dyn Provider,
    request: &ProviderRequest,
    log: &mut Vec<AttemptRecord>,
) -> Outcome {
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let started_at = Utc::now();
        let started = Instant::now();

        let result = provider.attempt(request).await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let error = match result {
            Ok(reply) => {
                log.push(AttemptRecord {
                    provider: provider.name().to_string(),
                    attempt_number: attempt,
                    started_at,
                    elapsed_ms,
                    failure: None,
                    code: None,
                    status: None,
                });
                return Outcome::Success(reply);
            }
            Err(error) => error,
        };

        let class = classify(&error);
        log.push(AttemptRecord {
            provider: provider.name().to_string(),
            attempt_number: attempt,
            started_at,
            elapsed_ms,
            failure: Some(class),
            code: Some(class.error_code()),
            status: match &error {
                TransportError::Status { status, .. } => Some(*status),
                _ => None,
            },
        });


        if error == TransportError::Cancelled {
            return Outcome::Failure { class, error };
        }

        match policy.decide(attempt, class) {
            RetryDecision::Stop => {
                if class == FailureClass::Detection {
                    warn!(provider = provider.name(), error = %error, "Provider blocked the request");
                } else {
                    debug!(
                        provider = provider.name(),
                        attempts = attempt,
                        class = %class,
                        "Max retry attempts reached"
                    );
                }
                return Outcome::Failure { class, error };
            }
            RetryDecision::Retry(delay) => {
                debug!(
                    provider = provider.name(),
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    class = %class,
                    error = %error,
                    "Retrying after backoff"
                );
                if let Some(token) = &request.cancel {
                    tokio::select! {
                        () = token.cancelled() => {
                            return Outcome::Failure {
                                class: FailureClass::Transient,
                                error: TransportError::Cancelled,
                            };
                        }
                        () = sleep(delay) => {}
                    }
                } else {
                    sleep(delay).await;
                }
            }
        }
    }
}
