//! # relay
//!
//! Relay server binary — wires the hub and HTTP/WebSocket server
//! together and runs until interrupted.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use relay_server::{Hub, ServerConfig};
use tokio_util::sync::CancellationToken;

/// Real-time fan-out chat relay.
#[derive(Parser, Debug)]
#[command(name = "relay", about = "WebSocket fan-out chat relay")]
struct Cli {
    /// Host to bind.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to bind (0 for auto-assign).
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Directory served as static files.
    #[arg(long, default_value = "static")]
    static_dir: PathBuf,

    /// Emit logs as JSON.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if cli.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = ServerConfig {
        host: cli.host,
        port: cli.port,
        static_dir: cli.static_dir,
        ..ServerConfig::default()
    };

    let (hub, channels) = Hub::new(&config);
    let cancel = CancellationToken::new();
    let hub_task = tokio::spawn(Arc::clone(&hub).run(channels, cancel.clone()));

    let handle = relay_server::start(config, hub)
        .await
        .context("failed to start relay server")?;
    tracing::info!(addr = %handle.addr, "relay ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;
    tracing::info!("shutting down");

    cancel.cancel();
    if tokio::time::timeout(Duration::from_secs(5), hub_task)
        .await
        .is_err()
    {
        tracing::warn!("hub did not stop in time");
    }

    Ok(())
}
