//! Provider Router Library
//!
//! Routes chat messages across an ordered list of AI providers and returns
//! the first successful reply.
//!
//! # Features
//!
//! - **Priority fallback**: providers tried one at a time, lowest priority first
//! - **Retries**: linear backoff per provider, timeouts per attempt
//! - **Failsafes**: consecutive-failure health tracking, circuit breaking on
//!   bot-detection signals with per-provider cooldown
//! - **Normalised results**: every route ends in a [`router::RoutingResult`]
//!   with a stable error code, never a panic or raw transport error
//! - **HTTP surface**: `POST /api/chat`, `GET /health`, `GET /stats`

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod error;
pub mod failsafe;
pub mod provider;
pub mod router;
pub mod server;
pub mod stats;
pub mod trace;
pub mod transport;

pub use error::{Error, ErrorCode, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so `route` output on stdout stays machine-readable
    match format {
        Some("json") => subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        _ => subscriber
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    }
    .map_err(|e| Error::Internal(format!("Failed to install subscriber: {e}")))
}
