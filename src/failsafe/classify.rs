//! Failure classification
//!
//! Rules are checked in order:
//! 1. the attempt hit its timeout budget -> [`FailureClass::Timeout`]
//! 2. the error text carries a bot-detection signal -> [`FailureClass::Detection`]
//! 3. network-level trouble or a non-timeout abort -> [`FailureClass::Transient`]
//! 4. anything else (bad status, bad body) -> [`FailureClass::Fatal`]

use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;
use crate::transport::TransportError;

/// Case-insensitive substrings that mark a response as a block
pub const DETECTION_SIGNALS: [&str; 5] = ["detection", "captcha", "blocked", "forbidden", "bot"];

/// Failure class of one attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// The attempt exceeded its timeout
    Timeout,
    /// The provider recognised and rejected automated traffic
    Detection,
    /// Network trouble that may clear on its own
    Transient,
    /// Unexpected status or payload
    Fatal,
}

impl FailureClass {
    /// Whether another attempt against the same provider makes sense
    #[must_use]
    pub fn is_retryable(self) -> bool {
        !matches!(self, Self::Detection)
    }

    /// Whether the failure should trip the provider's circuit breaker
    #[must_use]
    pub fn opens_circuit(self) -> bool {
        matches!(self, Self::Detection)
    }

    /// Caller-facing error code
    #[must_use]
    pub fn error_code(self) -> ErrorCode {
        match self {
            Self::Timeout => ErrorCode::Timeout,
            Self::Detection => ErrorCode::DetectionBlocked,
            Self::Transient => ErrorCode::TransientNetwork,
            Self::Fatal => ErrorCode::FatalResponse,
        }
    }
}

impl std::fmt::Display for FailureClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Timeout => "timeout",
            Self::Detection => "detection",
            Self::Transient => "transient",
            Self::Fatal => "fatal",
        })
    }
}

/// Classify a transport error
#[must_use]
pub fn classify(error: &TransportError) -> FailureClass {
    let message = match error {
        TransportError::Timeout(_) => return FailureClass::Timeout,
        // Cancellation text is ours, not the provider's
        TransportError::Cancelled => return FailureClass::Transient,
        TransportError::Connect(message)
        | TransportError::Network(message)
        | TransportError::Decode(message)
        | TransportError::Status { message, .. } => message,
    };

    if has_detection_signal(message) {
        return FailureClass::Detection;
    }

    match error {
        TransportError::Connect(_) | TransportError::Network(_) => FailureClass::Transient,
        _ => FailureClass::Fatal,
    }
}

/// Check text against [`DETECTION_SIGNALS`]
#[must_use]
pub fn has_detection_signal(text: &str) -> bool {
    let lower = text.to_lowercase();
    DETECTION_SIGNALS.iter().any(|signal| lower.contains(signal))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn status(code: u16, message: &str) -> TransportError {
        TransportError::Status {
            status: code,
            message: message.to_string(),
        }
    }

    #[test]
    fn test_timeout_wins_over_everything() {
        let err = TransportError::Timeout(Duration::from_secs(45));
        assert_eq!(classify(&err), FailureClass::Timeout);
    }

    #[test]
    fn test_detection_vocabulary() {
        for message in [
            "Bot Detection triggered",
            "please solve the CAPTCHA",
            "Request BLOCKED by upstream",
            "HTTP 403 Forbidden: nope",
            "automated bot traffic",
        ] {
            assert_eq!(
                classify(&status(403, message)),
                FailureClass::Detection,
                "{message}"
            );
        }
    }

    #[test]
    fn test_detection_precedes_network_rule() {
        let err = TransportError::Network("connection reset: blocked by firewall".to_string());
        assert_eq!(classify(&err), FailureClass::Detection);
    }

    #[test]
    fn test_network_failures_are_transient() {
        let refused = TransportError::Connect("tcp connect error: Connection refused".to_string());
        assert_eq!(classify(&refused), FailureClass::Transient);

        let dns = TransportError::Connect("dns error: failed to lookup address".to_string());
        assert_eq!(classify(&dns), FailureClass::Transient);

        assert_eq!(classify(&TransportError::Cancelled), FailureClass::Transient);
    }

    #[test]
    fn test_other_errors_are_fatal() {
        assert_eq!(
            classify(&status(500, "HTTP 500 Internal Server Error: boom")),
            FailureClass::Fatal
        );
        assert_eq!(
            classify(&TransportError::Decode("expected value at line 1".to_string())),
            FailureClass::Fatal
        );
    }

    #[test]
    fn test_only_detection_opens_circuit_and_skips_retry() {
        assert!(FailureClass::Detection.opens_circuit());
        assert!(!FailureClass::Detection.is_retryable());
        for class in [FailureClass::Timeout, FailureClass::Transient, FailureClass::Fatal] {
            assert!(!class.opens_circuit());
            assert!(class.is_retryable());
        }
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(FailureClass::Timeout.error_code(), ErrorCode::Timeout);
        assert_eq!(FailureClass::Detection.error_code(), ErrorCode::DetectionBlocked);
        assert_eq!(FailureClass::Transient.error_code(), ErrorCode::TransientNetwork);
        assert_eq!(FailureClass::Fatal.error_code(), ErrorCode::FatalResponse);
    }
}
