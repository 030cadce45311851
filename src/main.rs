//! Storefront WAF gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────┐
//!                    │                WAF GATEWAY                    │
//!   Client Request   │  ┌─────────┐   ┌─────────┐   ┌────────────┐  │
//!   ─────────────────┼─▶│  http   │──▶│ payload │──▶│  waf gate  │──┼──▶ 403 Forbidden
//!                    │  │ server  │   │ extract │   │ q→body→url │  │
//!                    │  └─────────┘   └─────────┘   └─────┬──────┘  │
//!                    │                                    │ clean   │
//!                    │                                    ▼         │
//!   Client Response  │                              ┌────────────┐  │
//!   ◀────────────────┼──────────────────────────────│  forward   │◀─┼──── Storefront
//!                    │                              └────────────┘  │     upstream
//!                    └──────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;

use storefront_waf::config::{load_config, GatewayConfig};
use storefront_waf::observability::{logging, metrics};
use storefront_waf::{lifecycle, GatewayError, HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "storefront-waf")]
#[command(about = "Request-payload firewall in front of the sticker storefront", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), GatewayError> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    if cli.check {
        println!("configuration OK");
        return Ok(());
    }

    logging::init_logging(&config.observability);
    tracing::info!("storefront-waf v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.address,
        waf_enabled = config.waf.enabled,
        max_depth = config.waf.max_depth,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = HttpServer::new(config)?;

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        lifecycle::wait_for_signal().await;
        shutdown.trigger();
    });

    server.run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
