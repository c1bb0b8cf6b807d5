//! Custody daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!   ┌──────────────────────── custody-daemon ────────────────────────┐
//!   │                                                                 │
//!   │   every poll_interval_ms, under the network lock:               │
//!   │                                                                 │
//!   │   heartbeat ─▶ listener ─▶ queue ─▶ tracker ─▶ outbox           │
//!   │       │           │          │         │          │             │
//!   │       └───────────┴────┬─────┴─────────┴──────────┘             │
//!   │                        ▼                                        │
//!   │                 Store (Tables, sled tree)                       │
//!   │                        ▲                                        │
//!   │                 admin API (read-only)                           │
//!   └────────────────────────┬────────────────────────────────────────┘
//!                            │ JSON-RPC (alloy, failover)
//!                            ▼
//!                        EVM node
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::time::MissedTickBehavior;

use chain_custody::admin::{setup_admin_router, AdminState};
use chain_custody::blockchain::{BlockchainClient, ContractRegistry, NodeRpc};
use chain_custody::config::load_config;
use chain_custody::lifecycle::{trigger_on_signal, Shutdown};
use chain_custody::observability::{init_logging, metrics};
use chain_custody::services::{ChainSettings, LocalNetworkLocks, NetworkServices};
use chain_custody::storage::Store;

#[derive(Parser)]
#[command(name = "custody-daemon")]
#[command(about = "Polls the chain and moves custody operations forward", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "custody.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    init_logging(&config.observability);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        network = %config.network.name,
        "custody-daemon starting"
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

    let store = match &config.storage.state_path {
        Some(path) => Store::open(path)?,
        None => {
            tracing::warn!("No storage.state_path configured; state is kept in memory only");
            Store::in_memory()
        }
    };

    let client = BlockchainClient::new(config.node.clone()).await?;
    let contracts = ContractRegistry::from_config(&config.contracts)?;
    let chain = Arc::new(ChainSettings::from_config(&config, contracts)?);
    let node: Arc<dyn NodeRpc> = Arc::new(client);

    let services = NetworkServices::new(&config, node, store.clone(), Arc::new(LocalNetworkLocks::new()), chain)?;

    let shutdown = Arc::new(Shutdown::new());
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { trigger_on_signal(&shutdown).await });
    }

    let admin = if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        tracing::info!(address = %listener.local_addr()?, "Admin API listening");
        let router = setup_admin_router(AdminState {
            store: store.clone(),
            network_id: services.network_id(),
            network_name: config.network.name.clone(),
            heartbeat: config.heartbeat.clone(),
            api_key: Arc::from(config.admin.api_key.as_str()),
        });
        let stop = shutdown.clone();
        Some(tokio::spawn(async move {
            let server = axum::serve(listener, router).with_graceful_shutdown(async move { stop.cancelled().await });
            if let Err(e) = server.await {
                tracing::error!(error = %e, "Admin API stopped");
            }
        }))
    } else {
        None
    };

    let mut ticker = tokio::time::interval(Duration::from_millis(config.network.poll_interval_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => match services.run_services().await {
                Ok(report) if !report.skipped => tracing::debug!(
                    events = ?report.events,
                    dispatched = ?report.dispatched,
                    confirmations = ?report.confirmations,
                    "Cycle complete"
                ),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Cycle aborted"),
            },
        }
    }

    tracing::info!("Shutting down");
    if let Some(handle) = admin {
        let _ = handle.await;
    }
    store.flush()?;

    tracing::info!("Shutdown complete");
    Ok(())
}
