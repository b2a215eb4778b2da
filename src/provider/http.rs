//! HTTP provider: `POST {message, ...options}` to a configured endpoint

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::{Provider, ProviderReply, ProviderRequest};
use crate::config::ProviderConfig;
use crate::trace;
use crate::transport::{Transport, TransportError, TransportRequest, TransportResponse};

/// Header carrying the route correlation id
pub const TRACE_ID_HEADER: &str = "x-trace-id";

/// Pointers tried in order when no `response_path` is configured
const TEXT_POINTERS: [&str; 6] = [
    "/text",
    "/response",
    "/content",
    "/answer",
    "/choices/0/message/content",
    "/message",
];

/// Provider reached over HTTP
pub struct HttpProvider {
    name: String,
    priority: u32,
    endpoint: String,
    cooldown: Duration,
    headers: HashMap<String, String>,
    response_path: Option<String>,
    transport: Arc<dyn Transport>,
}

impl HttpProvider {
    /// Build a provider from its configuration
    #[must_use]
    pub fn from_config(config: &ProviderConfig, transport: Arc<dyn Transport>) -> Self {
        let mut headers = config.headers.clone();
        if let Some(token) = config.resolve_auth_token() {
            let value = if config.auth_header.eq_ignore_ascii_case("authorization") {
                format!("Bearer {token}")
            } else {
                token
            };
            headers.insert(config.auth_header.clone(), value);
        }

        Self {
            name: config.name.clone(),
            priority: config.priority,
            endpoint: config.endpoint.clone(),
            cooldown: config.cooldown,
            headers,
            response_path: config.response_path.clone(),
            transport,
        }
    }

    /// Request body: the message, then caller options on top
    fn body(request: &ProviderRequest) -> Value {
        let mut body = Map::new();
        body.insert("message".to_string(), Value::String(request.message.clone()));
        body.extend(request.options.clone());
        Value::Object(body)
    }

    /// Turn a 2xx JSON body into reply text or an error
    fn normalize(&self, response: TransportResponse) -> Result<ProviderReply, TransportError> {
        let body = response.body;

        if let Some(message) = error_message(&body) {
            return Err(TransportError::Status {
                status: response.status,
                message: format!("provider error: {message}"),
            });
        }

        let text = match &self.response_path {
            Some(pointer) => body.pointer(pointer).and_then(non_empty_str),
            None => TEXT_POINTERS
                .iter()
                .find_map(|pointer| body.pointer(pointer).and_then(non_empty_str)),
        }
        .ok_or_else(|| TransportError::Decode("response contained no text".to_string()))?;

        let metadata = match body.get("metadata") {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };

        Ok(ProviderReply {
            text: text.to_string(),
            metadata,
        })
    }
}

#[async_trait]
impl Provider for HttpProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn cooldown(&self) -> Duration {
        self.cooldown
    }

    async fn attempt(&self, request: &ProviderRequest) -> Result<ProviderReply, TransportError> {
        let mut headers = self.headers.clone();
        if let Some(trace_id) = trace::current() {
            headers.insert(TRACE_ID_HEADER.to_string(), trace_id);
        }

        let response = self
            .transport
            .post(TransportRequest {
                endpoint: self.endpoint.clone(),
                body: Self::body(request),
                headers,
                request_id: Uuid::new_v4().to_string(),
                timeout: request.timeout,
                cancel: request.cancel.clone(),
            })
            .await?;

        self.normalize(response)
    }
}

/// Extract an `error` field: a string, or an object with a `message`
fn error_message(body: &Value) -> Option<String> {
    match body.get("error")? {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => Some(
            obj.get("message")
                .and_then(Value::as_str)
                .map_or_else(|| Value::Object(obj.clone()).to_string(), str::to_string),
        ),
        other => Some(other.to_string()),
    }
}

fn non_empty_str(value: &Value) -> Option<&str> {
    value.as_str().map(str::trim).filter(|s| !s.is_empty())
}
