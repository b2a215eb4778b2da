//! Error types for the provider router

use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for the provider router
pub type Result<T> = std::result::Result<T, Error>;

/// Provider router errors
///
/// These cover setup and plumbing problems (configuration, I/O, the HTTP
/// client). Routing outcomes never surface as an `Error`; they are folded into
/// a [`crate::router::RoutingResult`] carrying an [`ErrorCode`].
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// HTTP client setup error
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Stable, caller-facing error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Provider did not answer within the per-attempt timeout
    Timeout,
    /// Provider rejected the caller as automated traffic
    DetectionBlocked,
    /// Network-level failure (refused connection, DNS, reset)
    TransientNetwork,
    /// Unexpected status or malformed body
    FatalResponse,
    /// Provider skipped because its circuit is open
    CircuitOpen,
    /// Provider skipped because it is marked unhealthy
    Unhealthy,
    /// Every candidate was skipped or exhausted
    AllProvidersUnavailable,
    /// The caller cancelled the route
    Cancelled,
    /// The request itself was unusable (e.g. an empty message)
    InvalidRequest,
}

impl ErrorCode {
    /// Wire form of the code, e.g. `ALL_PROVIDERS_UNAVAILABLE`
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "TIMEOUT",
            Self::DetectionBlocked => "DETECTION_BLOCKED",
            Self::TransientNetwork => "TRANSIENT_NETWORK",
            Self::FatalResponse => "FATAL_RESPONSE",
            Self::CircuitOpen => "CIRCUIT_OPEN",
            Self::Unhealthy => "UNHEALTHY",
            Self::AllProvidersUnavailable => "ALL_PROVIDERS_UNAVAILABLE",
            Self::Cancelled => "CANCELLED",
            Self::InvalidRequest => "INVALID_REQUEST",
        }
    }

    /// Human-readable message suitable for end users
    #[must_use]
    pub fn user_message(self) -> &'static str {
        match self {
            Self::Timeout => "The provider took too long to respond.",
            Self::DetectionBlocked => "The provider refused the request as automated traffic.",
            Self::TransientNetwork => "The provider could not be reached.",
            Self::FatalResponse => "The provider returned an unusable response.",
            Self::CircuitOpen => "The provider is temporarily disabled.",
            Self::Unhealthy => "The provider is failing repeatedly and is being skipped.",
            Self::AllProvidersUnavailable => {
                "No AI provider is available right now. Please try again shortly."
            }
            Self::Cancelled => "The request was cancelled.",
            Self::InvalidRequest => "Message must not be empty.",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
