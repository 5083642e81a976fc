//! Self-custodial EVM wallet relay daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!   page ──▶ frontdoor ──window bus──▶ relay ──port / websocket──▶ dispatcher
//!                                                                    │
//!                        ┌───────────────┬───────────────────────────┤
//!                        ▼               ▼                           ▼
//!                  session registry  approval table            provider pool ──▶ chain adapters
//!                                        │                           │
//!                                        ▼                           ▼
//!                                   admin API                   signer ◀── key vault
//!
//!   Cross-cutting: config (+ watcher), observability, lifecycle, resilience
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use wallet_relay::config::{load_config, watcher::ConfigWatcher};
use wallet_relay::context::WalletContext;
use wallet_relay::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "wallet-relay")]
#[command(about = "Self-custodial EVM wallet relay", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(&args.config)?;

    logging::init_tracing(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "wallet-relay starting");

    tracing::info!(
        bind_address = %config.server.bind_address,
        providers = config.providers.len(),
        default_chain = config.session.default_chain_id,
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

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    let ctx = Arc::new(WalletContext::build(config)?);

    let mut health = ctx.health().clone().start();

    // Hot reload of the provider set. The watcher handle must outlive the loop.
    let (watcher, mut updates) = ConfigWatcher::new(&args.config);
    let _watch_guard = match watcher.run() {
        Ok(guard) => Some(guard),
        Err(e) => {
            tracing::warn!(error = %e, "Config watcher unavailable; hot reload disabled");
            None
        }
    };
    let reload_ctx = ctx.clone();
    let mut reload_shutdown = ctx.shutdown().subscribe();
    let reloader = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = reload_shutdown.recv() => break,
                update = updates.recv() => match update {
                    Some(new_config) => match reload_ctx.reload(&new_config) {
                        Ok(()) => tracing::info!(providers = new_config.providers.len(), "Provider set reloaded"),
                        Err(e) => tracing::error!(error = %e, "Reload rejected; keeping current providers"),
                    },
                    None => break,
                },
            }
        }
    });

    tokio::spawn(ctx.shutdown().clone().trigger_on_ctrl_c());

    wallet_relay::http::serve(ctx.clone(), listener).await?;

    if let Some(task) = health.as_mut() {
        task.stop().await;
    }
    let _ = reloader.await;
    ctx.dispatcher().lock_wallet();

    tracing::info!("Shutdown complete");
    Ok(())
}
