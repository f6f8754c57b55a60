//! Order gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────┐
//!                     │                  ORDER GATEWAY                    │
//!                     │                                                   │
//!  GET /orders/names  │  ┌────────┐   ┌─────────┐   ┌─────────────────┐   │
//!  ───────────────────┼─▶│  http  │──▶│ gateway │──▶│ circuit breaker │   │
//!                     │  │ server │   │ handler │   └────────┬────────┘   │
//!                     │  └────────┘   └─────────┘            │            │
//!                     │                                      ▼            │
//!                     │  ┌──────────┐   ┌──────────────┐  ┌───────────┐   │
//!                     │  │ registry │◀──│load_balancer │◀─│ transport │───┼──▶ order-service
//!                     │  │ (cache)  │   └──────────────┘  └───────────┘   │
//!                     │  └──────────┘                                     │
//!                     │                                                   │
//!                     │  config · observability · lifecycle · admin       │
//!                     └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use order_gateway::config::{load_config, watcher::ConfigWatcher, GatewayConfig};
use order_gateway::lifecycle::{signals, Shutdown};
use order_gateway::observability::{logging, metrics};
use order_gateway::HttpServer;

#[derive(Parser)]
#[command(name = "order-gateway")]
#[command(about = "Resilient gateway in front of the order service", long_about = None)]
struct Args {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long, env = "ORDER_GATEWAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "order-gateway starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        registry = ?config.registry.kind,
        order_service = %config.gateway.order_service,
        fallback = ?config.gateway.fallback,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // Kept alive for the life of the process.
    let (_watcher, config_updates) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (Some(watcher.run()?), updates)
        }
        None => {
            let (_tx, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let bind_address = config.listener.bind_address.clone();
    let server = HttpServer::new(config)?;

    let listener = TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let server_task = tokio::spawn(server.run(listener, config_updates, server_shutdown));

    signals::shutdown_on_signal(&shutdown).await;
    server_task.await??;

    tracing::info!("Shutdown complete");
    Ok(())
}
