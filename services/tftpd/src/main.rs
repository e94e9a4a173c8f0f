//! TFTP daemon
//!
//! Serves a single file, read into memory at startup, to any TFTP client
//! that asks for it (octet mode, read requests only).
//!
//! Configuration comes from environment variables (see
//! `tftp_server::config::env_vars`), optionally layered over a JSON file
//! named by `TFTP_CONFIG`.

use anyhow::{Context, Result};
use tftp_server::{ServerConfig, TftpServer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting TFTP daemon");

    let config = ServerConfig::from_env().context("failed to load configuration")?;
    let settings = config.transfer_settings();

    info!("Configuration:");
    info!("  Listen address: {}", config.listen_addr);
    info!("  Payload: {}", config.payload_path.display());
    info!("  Retries per block: {}", settings.retries);
    info!("  Ack timeout: {:?}", settings.timeout);

    let payload = tokio::fs::read(&config.payload_path)
        .await
        .with_context(|| format!("failed to read payload {}", config.payload_path.display()))?;
    info!("Loaded {} byte payload", payload.len());

    let server = TftpServer::new(payload, settings);

    tokio::select! {
        result = server.listen_and_serve(config.listen_addr.as_str()) => {
            result.context("TFTP server stopped")?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for shutdown signal")?;
            warn!("Shutdown requested, no longer accepting requests");
        }
    }

    Ok(())
}
