//! # huddle-relay
//!
//! Group relay binary: loads settings, installs logging and metrics, and
//! serves the relay until Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use huddle_core::logging::init_subscriber;
use huddle_server::config::ServerConfig;
use huddle_server::server::RelayServer;
use huddle_settings::{HuddleSettings, load_settings, load_settings_from_path};

/// Huddle group relay.
#[derive(Parser, Debug)]
#[command(name = "huddle-relay", about = "WebSocket group relay")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (default `~/.huddle/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    fn load_settings(&self) -> Result<HuddleSettings> {
        match &self.config {
            Some(path) => load_settings_from_path(path)
                .with_context(|| format!("Failed to load settings from {}", path.display())),
            None => load_settings().context("Failed to load settings"),
        }
    }
}

/// Flatten settings and CLI overrides into the server config.
fn server_config(settings: &HuddleSettings, cli: &Cli) -> ServerConfig {
    ServerConfig {
        host: cli
            .host
            .clone()
            .unwrap_or_else(|| settings.server.host.clone()),
        port: cli.port.unwrap_or(settings.server.port),
        max_message_size: settings.server.max_message_size,
        mailbox_capacity: settings.relay.mailbox_capacity,
        close_superseded: settings.relay.close_superseded,
        shutdown_timeout_secs: settings.server.shutdown_timeout_ms.div_ceil(1000).max(1),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.load_settings()?;
    init_subscriber(&settings.logging.level, settings.logging.format);

    let config = server_config(&settings, &cli);
    let shutdown_timeout = config.shutdown_timeout();
    let metrics = huddle_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let server = RelayServer::new(config).with_metrics(metrics);
    let (addr, handle) = server
        .listen()
        .await
        .context("Failed to bind server")?;
    tracing::info!(
        mailbox_capacity = server.config().mailbox_capacity,
        close_superseded = server.config().close_superseded,
        "huddle relay listening on http://{addr}"
    );

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server.shutdown().graceful_shutdown(shutdown_timeout).await;
    let _ = handle.await;
    Ok(())
}
