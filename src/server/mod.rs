//! HTTP server

mod routes;

pub use routes::{AppState, HttpLimits, create_router};

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::router::ProviderRouter;
use crate::{Error, Result};

/// Provider router HTTP server
pub struct Server {
    /// Configuration
    config: Config,
    /// Shared router
    router: Arc<ProviderRouter>,
}

impl Server {
    /// Create a server from configuration
    pub fn new(config: Config) -> Result<Self> {
        let router = Arc::new(ProviderRouter::from_config(&config)?);
        for provider in router.providers() {
            info!(
                provider = %provider.name(),
                priority = provider.priority(),
                "Registered provider"
            );
        }
        Ok(Self { config, router })
    }

    /// Shared router
    pub fn router(&self) -> &Arc<ProviderRouter> {
        &self.router
    }

    /// Run until Ctrl+C or SIGTERM, then drain for at most `shutdown_timeout`
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        let state = Arc::new(AppState {
            router: Arc::clone(&self.router),
        });
        let app = create_router(
            state,
            HttpLimits {
                request_timeout: self.config.server.request_timeout,
                max_body_size: self.config.server.max_body_size,
            },
        );

        let listener = TcpListener::bind(addr).await?;

        info!(version = env!("CARGO_PKG_VERSION"), "Provider router");
        info!(host = %self.config.server.host, port = %self.config.server.port, "Listening");
        info!(
            "  POST http://{}:{}/api/chat",
            self.config.server.host, self.config.server.port
        );
        if self.router.providers().is_empty() {
            warn!("No providers configured - every route will fail");
        }

        let shutdown = CancellationToken::new();
        let serve = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.clone().cancelled_owned());
        let mut server = tokio::spawn(async move { serve.await });

        tokio::select! {
            joined = &mut server => return flatten(joined),
            () = shutdown_signal() => {}
        }

        shutdown.cancel();
        match tokio::time::timeout(self.config.server.shutdown_timeout, server).await {
            Ok(joined) => flatten(joined)?,
            Err(_) => warn!(
                timeout_secs = self.config.server.shutdown_timeout.as_secs(),
                "In-flight requests did not drain before shutdown timeout"
            ),
        }

        info!("Server stopped");
        Ok(())
    }
}

fn flatten(
    joined: std::result::Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<()> {
    joined
        .map_err(|e| Error::Internal(e.to_string()))?
        .map_err(Error::Io)
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
