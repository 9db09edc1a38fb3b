//! Beatsync Server - Standalone server for synchronized multi-device audio playback.

mod config;

use std::path::PathBuf;

use anyhow::{Context, Result};
use beatsync_core::{bootstrap_services, start_server, AppState};
use clap::Parser;
use tokio::signal;

use crate::config::ServerConfig;

/// Beatsync Server - Stateful WebSocket server for synchronized playback rooms.
#[derive(Parser, Debug)]
#[command(name = "beatsync-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "BEATSYNC_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind host (overrides config file).
    #[arg(long, env = "BEATSYNC_BIND_HOST")]
    host: Option<String>,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long, env = "BEATSYNC_BIND_PORT")]
    port: Option<u16>,

    /// Data directory for persistent state (room snapshots).
    #[arg(short = 'd', long, env = "BEATSYNC_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Base URL of the music search/stream provider (overrides config file).
    #[arg(long, env = "PROVIDER_URL")]
    provider_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Beatsync Server v{}", env!("CARGO_PKG_VERSION"));

    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    if let Some(host) = args.host {
        config.bind_host = host;
    }
    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if let Some(data_dir) = args.data_dir {
        config.data_dir = Some(data_dir);
    }
    if let Some(provider_url) = args.provider_url {
        config.provider_url = provider_url;
    }

    log::info!(
        "Configuration: bind_host={}, bind_port={}, provider_url={}",
        config.bind_host,
        config.bind_port,
        config.provider_url
    );

    let core_config = config.to_core_config();
    let services = bootstrap_services(&core_config).context("Failed to bootstrap services")?;

    log::info!("Services bootstrapped successfully");

    services.start_backup_task();
    log::info!("Background tasks started");

    let app_state = AppState::builder().from_services(&services).build();

    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(app_state).await {
            log::error!("Server error: {}", e);
        }
    });

    log::info!(
        "HTTP server started on {}:{}",
        core_config.bind_host,
        core_config.bind_port
    );

    shutdown_signal().await;

    log::info!("Shutdown signal received, cleaning up...");

    services.shutdown().await;
    server_handle.abort();

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
