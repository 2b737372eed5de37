//! The ledger node: loads configuration, opens storage and serves the HTTP API.

use anyhow::Context;
use clap::Parser;
use hashledger::config::{Config, StorageBackend};
use hashledger::storage::{LedgerStore, MemoryStore, SledStore};
use hashledger::types::Allocation;
use hashledger::{api, Ledger};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_FILE: &str = "ledger.toml";

#[derive(Parser)]
#[command(version, about = "Single-node hash-linked ledger")]
struct Args {
    /// TOML configuration file. Defaults to ./ledger.toml when it exists.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Socket address for the HTTP API, overriding `listen_addr`.
    #[arg(short, long)]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config_path = args.config.or_else(|| {
        let default = PathBuf::from(DEFAULT_CONFIG_FILE);
        default.exists().then_some(default)
    });
    let mut config = Config::load(config_path.as_deref()).context("loading configuration")?;
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log.filter))
        .context("parsing log filter")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let allocations = config
        .genesis
        .allocations()
        .context("resolving genesis allocations")?;

    match config.storage.backend {
        StorageBackend::Sled => {
            let path = &config.storage.path;
            let store = if config.storage.reset_on_start {
                SledStore::open_fresh(path)
            } else {
                SledStore::open(path)
            }
            .with_context(|| format!("opening sled store at {}", path.display()))?
            .with_sync_writes(config.storage.sync_writes);
            run(store, &allocations, config.listen_addr).await
        }
        StorageBackend::Memory => {
            tracing::warn!("using the in-memory backend, state is lost on exit");
            run(MemoryStore::default(), &allocations, config.listen_addr).await
        }
    }
}

async fn run<S: LedgerStore>(
    store: S,
    allocations: &[Allocation],
    listen_addr: SocketAddr,
) -> anyhow::Result<()> {
    let ledger = Arc::new(Ledger::open(store, allocations).context("opening ledger")?);
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("binding {}", listen_addr))?;

    api::serve(listener, Arc::clone(&ledger), shutdown_signal()).await?;

    ledger.close().context("flushing ledger")?;
    tracing::info!("ledger closed");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown signal received"),
        Err(err) => {
            tracing::error!(%err, "cannot listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
