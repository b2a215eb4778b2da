//! Routing inputs and outputs

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::error::ErrorCode;
use crate::failsafe::AttemptRecord;

/// Caller options for one route
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RouteOptions {
    /// Forwarded to providers next to the message
    #[serde(flatten)]
    pub params: Map<String, Value>,
    /// Cancels the whole route, including the in-flight transport call
    #[serde(skip)]
    pub cancel: Option<CancellationToken>,
}

impl RouteOptions {
    /// Options with a cancellation token
    #[must_use]
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Add a forwarded parameter
    #[must_use]
    pub fn param(mut self, key: &str, value: Value) -> Self {
        self.params.insert(key.to_string(), value);
        self
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }
}

/// A provider that was not attempted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedProvider {
    /// Provider name
    pub provider: String,
    /// Why it was skipped
    pub reason: ErrorCode,
}

/// Per-provider failure summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderFailure {
    /// Provider name
    pub provider: String,
    /// Classified failure
    pub code: ErrorCode,
}

/// Everything the route did, for debugging and dashboards
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingMetadata {
    /// Route correlation id
    pub trace_id: String,
    /// Every transport call, in order
    pub attempts: Vec<AttemptRecord>,
    /// Providers skipped as unavailable
    pub skipped: Vec<SkippedProvider>,
    /// Providers that failed after retries
    pub failures: Vec<ProviderFailure>,
    /// Metadata returned by the answering provider
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub provider: Map<String, Value>,
}

/// Normalised routing result
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingResult {
    /// A provider produced a reply
    pub success: bool,
    /// Reply text on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Stable error code on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorCode>,
    /// Human-readable failure message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Name of the answering provider
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_used: Option<String>,
    /// Total time spent routing
    pub response_time_ms: u64,
    /// Attempt log
    pub metadata: RoutingMetadata,
}

impl RoutingResult {
    pub(crate) fn success(
        text: String,
        provider: &str,
        response_time_ms: u64,
        metadata: RoutingMetadata,
    ) -> Self {
        Self {
            success: true,
            text: Some(text),
            error: None,
            message: None,
            provider_used: Some(provider.to_string()),
            response_time_ms,
            metadata,
        }
    }

    pub(crate) fn failure(code: ErrorCode, response_time_ms: u64, metadata: RoutingMetadata) -> Self {
        Self {
            success: false,
            text: None,
            error: Some(code),
            message: Some(code.user_message().to_string()),
            provider_used: None,
            response_time_ms,
            metadata,
        }
    }

    /// Number of transport calls made
    #[must_use]
    pub fn transport_calls(&self) -> usize {
        self.metadata.attempts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_options_flatten_params() {
        let options: RouteOptions =
            serde_json::from_value(json!({"model": "fast", "lang": "fi"})).unwrap();
        assert_eq!(options.params.len(), 2);
        assert!(options.cancel.is_none());
        assert!(!options.is_cancelled());
    }

    #[test]
    fn test_failure_serialization() {
        let result = RoutingResult::failure(
            ErrorCode::AllProvidersUnavailable,
            3,
            RoutingMetadata::default(),
        );
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "ALL_PROVIDERS_UNAVAILABLE");
        assert_eq!(json["responseTimeMs"], 3);
        assert!(json.get("text").is_none());
        assert!(json.get("providerUsed").is_none());
    }

    #[test]
    fn test_success_serialization() {
        let result = RoutingResult::success("hi".into(), "B", 12, RoutingMetadata::default());
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["text"], "hi");
        assert_eq!(json["providerUsed"], "B");
        assert!(json.get("error").is_none());
    }
}
