//! Keyward Server - Main entry point.

mod config;
mod genesis;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use keyward_api::Node;
use keyward_custody::{CustodyService, EthereumTransactionAnalyzer, LedgerBank, NativeSandbox};
use keyward_storage::{MemoryBackend, StorageBackend};
use keyward_storage_sqlite::SqliteBackend;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Config, StorageKind};
use crate::genesis::Genesis;

/// Contract name of the built-in Ethereum analyzer; intents read its
/// bindings as `eth_tx.to`, `eth_tx.value` and so on.
const ETH_TX_ANALYZER: &str = "eth_tx";

#[derive(Parser)]
#[command(name = "keyward-server")]
#[command(about = "Keyward - intent-gated custody and signature request ledger")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/keyward.toml", env = "KEYWARD_CONFIG")]
    config: PathBuf,

    /// Enable development mode (seeds demo keychain, space and keys)
    #[arg(long, env = "KEYWARD_DEV_MODE")]
    dev: bool,

    /// Server bind address (overrides config file)
    #[arg(long, env = "KEYWARD_BIND_ADDRESS")]
    bind: Option<String>,

    /// Data directory; selects the SQLite backend
    #[arg(long, env = "KEYWARD_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config =
        Config::load(&cli.config).with_context(|| format!("failed to load {}", cli.config.display()))?;
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }
    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = data_dir;
        config.storage.backend = StorageKind::Sqlite;
    }
    config.validate()?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();

    tracing::info!("Starting Keyward server...");
    tracing::info!("Bind address: {}", config.server.bind);

    if cli.dev {
        tracing::warn!("Development mode enabled - DO NOT USE IN PRODUCTION");
    }

    let backend: Arc<dyn StorageBackend> = match config.storage.backend {
        StorageKind::Memory => {
            tracing::info!("Using in-memory storage");
            Arc::new(MemoryBackend::new())
        },
        StorageKind::Sqlite => Arc::new(
            SqliteBackend::open(&config.storage.data_dir, &config.storage.namespace)
                .await
                .context("failed to open SQLite storage")?,
        ),
    };

    let params = config.ledger.params();
    let sandbox = NativeSandbox::new(params.analyzer_gas_limit)
        .with_contract(ETH_TX_ANALYZER, Arc::new(EthereumTransactionAnalyzer));
    tracing::info!(contract = ETH_TX_ANALYZER, "Ethereum transaction analyzer deployed");

    let service = CustodyService::new(params, Arc::new(sandbox), Arc::new(LedgerBank::new()));

    let genesis = match &config.genesis.path {
        Some(path) => Some(Genesis::load(path)?),
        None if cli.dev => Some(Genesis::dev(&config.ledger.fee_denom)),
        None => None,
    };
    if let Some(genesis) = genesis {
        genesis.apply_once(&service, backend.as_ref()).await?;
    }

    let node = Arc::new(Node::open(backend, service).await?);

    let ticker = tokio::spawn(produce_blocks(
        node.clone(),
        Duration::from_millis(config.ledger.block_interval_ms),
    ));

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;
    tracing::info!("Keyward server started successfully");

    axum::serve(listener, keyward_api::router(node))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    ticker.abort();
    tracing::info!("Shutting down...");

    Ok(())
}

async fn produce_blocks(node: Arc<Node>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if let Err(e) = node.advance_block().await {
            tracing::error!(error = %e, "Block production failed");
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
