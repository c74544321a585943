//! Organ donation registry service.
//!
//! Loads `registry.toml` (or the path given with `--config`), provisions the
//! configured ledger, and serves the registry API until SIGINT or SIGTERM.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;

use organ_registry::config::{load_config, watcher::ConfigWatcher};
use organ_registry::lifecycle::{provision, signals::spawn_signal_handler, Shutdown};
use organ_registry::observability::{logging::init_logging, metrics::init_metrics};
use organ_registry::HttpServer;

#[derive(Parser)]
#[command(name = "organ-registry")]
#[command(about = "Organ donation registry service", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "registry.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(&args.config)?;

    init_logging(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "organ-registry starting");

    tracing::info!(
        config = ?args.config,
        bind_address = %config.listener.bind_address,
        backend = ?config.ledger.backend,
        grants = config.access.grants.len(),
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let (registry, grants) = provision(&config).await?;

    // Dropping the watcher stops reloads, so keep it for the life of main.
    let (watcher, config_updates) = ConfigWatcher::new(&args.config);
    let _watcher = match watcher.run() {
        Ok(w) => Some(w),
        Err(e) => {
            tracing::warn!(error = %e, "Config hot reload disabled");
            None
        }
    };

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(config, registry, grants, shutdown);
    server.run(listener, config_updates).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
