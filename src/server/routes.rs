//! HTTP router and handlers

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tower_http::{
    catch_panic::CatchPanicLayer,
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{debug, info};

use crate::error::ErrorCode;
use crate::router::{ProviderRouter, RouteOptions};

/// Shared application state
pub struct AppState {
    /// Provider router
    pub router: Arc<ProviderRouter>,
}

/// Inbound HTTP limits
#[derive(Debug, Clone, Copy)]
pub struct HttpLimits {
    /// Whole-request timeout
    pub request_timeout: Duration,
    /// Maximum request body size in bytes
    pub max_body_size: usize,
}

/// Create the router
pub fn create_router(state: Arc<AppState>, limits: HttpLimits) -> Router {
    Router::new()
        .route("/api/chat", post(chat_handler))
        .route("/api/providers/{name}/reset", post(reset_handler))
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .layer(RequestBodyLimitLayer::new(limits.max_body_size))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            limits.request_timeout,
        ))
        .layer(CatchPanicLayer::new())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

/// Body of `POST /api/chat`
#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    options: Map<String, Value>,
}

/// Chat handler (POST /api/chat)
async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> impl IntoResponse {
    if request.message.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "success": false,
                "error": ErrorCode::InvalidRequest,
                "message": ErrorCode::InvalidRequest.user_message()
            })),
        )
            .into_response();
    }

    let options = RouteOptions {
        params: request.options,
        cancel: None,
    };
    let result = state.router.route(&request.message, &options).await;

    let status = if result.success {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(result)).into_response()
}

/// Health handler (GET /health)
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let statuses = state.router.health_status();
    let available = statuses.values().filter(|s| s.is_available()).count();

    let (status, code) = if available == 0 {
        ("unavailable", StatusCode::SERVICE_UNAVAILABLE)
    } else if available < statuses.len() {
        ("degraded", StatusCode::OK)
    } else {
        ("healthy", StatusCode::OK)
    };

    let response = json!({
        "status": status,
        "version": env!("CARGO_PKG_VERSION"),
        "providers": statuses
    });
    (code, Json(response))
}

/// Usage statistics (GET /stats)
async fn stats_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.router.stats().snapshot())
}

/// Operator reset (POST /api/providers/{name}/reset)
async fn reset_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    if state.router.reset(&name) {
        info!(provider = %name, "Provider reset via API");
        (StatusCode::OK, Json(json!({ "reset": name })))
    } else {
        debug!(provider = %name, "Reset requested for unknown provider");
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("Unknown provider: {name}") })),
        )
    }
}
