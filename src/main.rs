//! Provider Router - multi-provider AI request routing

use std::process::ExitCode;

use clap::Parser;
use serde_json::{Map, Value};
use tracing::{error, info};

use provider_router::{
    cli::{Cli, Command},
    config::Config,
    router::{ProviderRouter, RouteOptions},
    server::Server,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Some(Command::Route { message, options }) => run_route(&config, &message, &options).await,
        Some(Command::Providers) => run_providers(&config),
        Some(Command::Serve) | None => run_server(config).await,
    }
}

/// Load configuration and apply CLI overrides
fn load_config(cli: &Cli) -> provider_router::Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(ref host) = cli.host {
        config.server.host = host.clone();
    }
    Ok(config)
}

/// Route one message and print the result
async fn run_route(config: &Config, message: &str, options: &str) -> ExitCode {
    let params: Map<String, Value> = match serde_json::from_str(options) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("Invalid --options JSON object: {e}");
            return ExitCode::FAILURE;
        }
    };

    let router = match ProviderRouter::from_config(config) {
        Ok(r) => r,
        Err(e) => {
            error!("Failed to create router: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = router
        .route(message, &RouteOptions { params, cancel: None })
        .await;

    match serde_json::to_string_pretty(&result) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("Failed to serialize result: {e}");
            return ExitCode::FAILURE;
        }
    }

    if result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Print providers in attempt order
fn run_providers(config: &Config) -> ExitCode {
    let providers = config.providers_by_priority();
    if providers.is_empty() {
        println!("No enabled providers configured.");
        return ExitCode::SUCCESS;
    }

    println!("Providers in attempt order:\n");
    for (i, p) in providers.iter().enumerate() {
        println!(
            "  {}. {} (priority {}, cooldown {}s)",
            i + 1,
            p.name,
            p.priority,
            p.cooldown.as_secs()
        );
        println!("     {}", p.endpoint);
    }
    ExitCode::SUCCESS
}

/// Run the HTTP server
async fn run_server(config: Config) -> ExitCode {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        providers = config.providers_by_priority().len(),
        "Starting provider router"
    );

    let server = match Server::new(config) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create server: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = server.run().await {
        error!("Server error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Shutdown complete");
    ExitCode::SUCCESS
}
