//! Provider handlers
//!
//! A provider is anything that can turn a chat message into reply text. The
//! router treats every provider the same way, so adding one is a matter of
//! configuration (or a new [`Provider`] impl), never a routing change.

mod http;

pub use self::http::HttpProvider;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::transport::TransportError;

/// Input for one provider call
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    /// User message
    pub message: String,
    /// Caller options forwarded in the request body
    pub options: Map<String, Value>,
    /// Timeout for this call
    pub timeout: Duration,
    /// Caller cancellation
    pub cancel: Option<CancellationToken>,
}

/// Normalised provider reply
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderReply {
    /// Reply text, never empty
    pub text: String,
    /// Provider supplied metadata
    pub metadata: Map<String, Value>,
}

impl ProviderReply {
    /// Reply without metadata
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: Map::new(),
        }
    }
}

/// A routable provider
#[async_trait]
pub trait Provider: Send + Sync {
    /// Unique provider name
    fn name(&self) -> &str;

    /// Attempt rank; lower goes first
    fn priority(&self) -> u32;

    /// Circuit cooldown after a blocking signal
    fn cooldown(&self) -> Duration;

    /// Perform a single call. Retrying is the caller's business.
    async fn attempt(&self, request: &ProviderRequest) -> Result<ProviderReply, TransportError>;
}
