//! HTTP transport implementation
//!
//! Every call is a single JSON `POST`. The whole exchange (connect, send,
//! read body) runs under one timeout and one optional cancellation token.
//! Whichever fires first drops the in-flight future, which closes the
//! underlying connection instead of leaving it to finish in the background.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{self, HeaderName, HeaderValue};
use reqwest::Client;
use tracing::{debug, warn};

use super::{Transport, TransportError, TransportRequest, TransportResponse, excerpt};
use crate::Result;

/// Header carrying the per-call identifier
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// HTTP transport backed by a pooled `reqwest` client
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Create a new HTTP transport
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(30))
            .tcp_nodelay(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(concat!("provider-router/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }

    /// Send the request and read the full body
    async fn exchange(
        &self,
        request: &TransportRequest,
    ) -> std::result::Result<TransportResponse, TransportError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        match HeaderValue::from_str(&request.request_id) {
            Ok(v) => {
                headers.insert(REQUEST_ID_HEADER, v);
            }
            Err(e) => warn!(request_id = %request.request_id, error = %e, "Invalid request id header"),
        }
        for (key, value) in &request.headers {
            match (
                key.parse::<HeaderName>(),
                value.parse::<HeaderValue>(),
            ) {
                (Ok(k), Ok(v)) => {
                    headers.insert(k, v);
                }
                _ => warn!(header = %key, "Skipping invalid header"),
            }
        }

        debug!(endpoint = %request.endpoint, request_id = %request.request_id, "POST");

        let response = self
            .client
            .post(&request.endpoint)
            .headers(headers)
            .json(&request.body)
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, request.timeout))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| map_reqwest_error(e, request.timeout))?;

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                message: format!(
                    "HTTP {} {}: {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Unknown"),
                    excerpt(text.trim())
                ),
            });
        }

        let body = serde_json::from_str(&text).map_err(|e| {
            TransportError::Decode(format!("{e}: {}", excerpt(text.trim())))
        })?;

        Ok(TransportResponse {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(
        &self,
        request: TransportRequest,
    ) -> std::result::Result<TransportResponse, TransportError> {
        let exchange = tokio::time::timeout(request.timeout, self.exchange(&request));

        let outcome = match &request.cancel {
            Some(token) => tokio::select! {
                biased;
                () = token.cancelled() => return Err(TransportError::Cancelled),
                outcome = exchange => outcome,
            },
            None => exchange.await,
        };

        outcome.unwrap_or(Err(TransportError::Timeout(request.timeout)))
    }
}

/// Map a `reqwest` error onto the transport taxonomy.
///
/// The URL is stripped so host names never reach the classifier.
fn map_reqwest_error(error: reqwest::Error, timeout: Duration) -> TransportError {
    let error = error.without_url();
    if error.is_timeout() {
        TransportError::Timeout(timeout)
    } else if error.is_connect() {
        TransportError::Connect(error_chain(&error))
    } else if error.is_decode() {
        TransportError::Decode(error_chain(&error))
    } else {
        TransportError::Network(error_chain(&error))
    }
}

/// Render an error with its sources; reqwest hides the root cause otherwise
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
