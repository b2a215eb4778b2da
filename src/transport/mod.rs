//! Transport implementations for provider calls

mod http;

pub use self::http::HttpTransport;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Maximum number of body characters carried in an error message
pub const ERROR_BODY_EXCERPT: usize = 512;

/// One outbound provider call
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// Target URL
    pub endpoint: String,
    /// JSON body to POST
    pub body: Value,
    /// Extra headers (auth, provider specific)
    pub headers: HashMap<String, String>,
    /// Unique id of this call, sent as `X-Request-Id`
    pub request_id: String,
    /// Budget for the whole exchange, body included
    pub timeout: Duration,
    /// Aborts the call early when cancelled
    pub cancel: Option<CancellationToken>,
}

/// Successful (2xx) provider response
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// HTTP status code
    pub status: u16,
    /// Parsed JSON body
    pub body: Value,
}

/// Transport-level failure, before classification
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The per-attempt timeout elapsed
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The caller cancelled the request
    #[error("request cancelled")]
    Cancelled,

    /// Connection could not be established (refused, DNS)
    #[error("connection failed: {0}")]
    Connect(String),

    /// Connection broke mid-exchange
    #[error("network error: {0}")]
    Network(String),

    /// Non-2xx status or an error payload
    #[error("{message}")]
    Status {
        /// HTTP status code; a 2xx when the error came from the response payload
        status: u16,
        /// Status line plus body excerpt
        message: String,
    },

    /// Body was not the expected JSON shape
    #[error("malformed response: {0}")]
    Decode(String),
}

/// Transport trait for provider communication
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST a JSON body and wait for the JSON response
    async fn post(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}

/// Truncate `body` to [`ERROR_BODY_EXCERPT`] characters on a char boundary
#[must_use]
pub fn excerpt(body: &str) -> &str {
    match body.char_indices().nth(ERROR_BODY_EXCERPT) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
