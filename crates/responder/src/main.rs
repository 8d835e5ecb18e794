//! Responder - command-line client for the Responder API.
//!
//! Main entry point for the `responder` CLI.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};

mod commands;

use commands::{auth, request};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Responder - authenticated client for the Responder API
#[derive(Parser)]
#[command(name = "responder")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Config file (default: ~/.config/responder/responder.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// API base URL, overriding the config file
    #[arg(long, global = true, env = "RESPONDER_BASE_URL")]
    pub base_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in with a username and password
    Login(auth::LoginArgs),

    /// Sign out and forget stored tokens
    Logout,

    /// Show the current session
    Status,

    /// Send a GET request
    Get(request::QueryArgs),

    /// Send a POST request with a JSON body
    Post(request::BodyArgs),

    /// Send a PUT request with a JSON body
    Put(request::BodyArgs),

    /// Send a DELETE request
    Delete(request::QueryArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Console (human-readable, stderr) + rotating JSON file
    let filter = if cli.verbose {
        "responder=debug,responder_client=debug,responder_auth=debug,responder_config=debug,info"
    } else {
        "responder=info,responder_client=info,responder_auth=info,warn"
    };

    let log_dir = responder_config::xdg_config_dir()
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "responder.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "responder=trace,responder_client=trace,responder_auth=trace,responder_config=trace,info",
                )),
        )
        .init();

    let loaded = responder_config::load_config(cli.config.as_deref())
        .context("Failed to load configuration")?;
    let mut config = loaded.config;
    if let Some(base_url) = cli.base_url {
        config.api.base_url = base_url;
    }
    config.validate().context("Invalid configuration")?;

    tracing::debug!(source = ?loaded.source, base_url = %config.api.base_url, "Configuration loaded");

    let ctx = commands::Context {
        config,
        json_output: cli.json,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Login(args) => auth::login(args, &ctx).await,
        Commands::Logout => auth::logout(&ctx).await,
        Commands::Status => auth::status(&ctx).await,
        Commands::Get(args) => request::get(args, &ctx).await,
        Commands::Post(args) => request::post(args, &ctx).await,
        Commands::Put(args) => request::put(args, &ctx).await,
        Commands::Delete(args) => request::delete(args, &ctx).await,
    }
}
