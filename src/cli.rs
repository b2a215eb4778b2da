//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Multi-provider AI request router with retry, health tracking and circuit breaking
#[derive(Parser, Debug)]
#[command(name = "provider-router")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "PROVIDER_ROUTER_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "PROVIDER_ROUTER_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "PROVIDER_ROUTER_HOST")]
    pub host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "PROVIDER_ROUTER_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "PROVIDER_ROUTER_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP server (default)
    Serve,

    /// Route a single message and print the result as JSON
    Route {
        /// Message to send
        #[arg(required = true)]
        message: String,

        /// JSON object forwarded to providers alongside the message
        #[arg(short, long, default_value = "{}")]
        options: String,
    },

    /// List enabled providers in attempt order
    Providers,
}
