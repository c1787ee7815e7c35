//! respkv - A Minimal RESP Key-Value Server
//!
//! This is the main entry point for the server.
//! It parses configuration, sets up logging, binds the listener and
//! serves connections until Ctrl+C.

use clap::Parser;
use respkv::{Config, Server};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = Config::parse();

    // Set up logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("respkv v{}", respkv::VERSION);

    let server = Server::bind(config.bind_address()).await?;
    info!("Listening on {}", server.local_addr()?);

    // Set up graceful shutdown
    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let storage = server.storage();
    let stats = server.stats();
    server.run_until(shutdown).await;

    let store = storage.stats();
    let conns = stats.snapshot();
    info!(
        keys = store.keys,
        gets = store.get_ops,
        sets = store.set_ops,
        connections = conns.connections_accepted,
        active = conns.active_connections,
        commands = conns.commands_processed,
        protocol_errors = conns.protocol_errors,
        bytes_read = conns.bytes_read,
        bytes_written = conns.bytes_written,
        "Server shutdown complete"
    );
    Ok(())
}
