//! Node configuration.
//!
//! Layered with figment: built-in defaults, then an optional TOML file, then
//! `LEDGER_*` environment variables (`__` separates nested keys, e.g.
//! `LEDGER_STORAGE__PATH=/var/lib/ledger`).

use crate::address::{derive_address, parse_address};
use crate::error::{LedgerError, Result};
use crate::types::Allocation;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the HTTP API binds to.
    pub listen_addr: SocketAddr,
    pub storage: StorageConfig,
    pub genesis: GenesisConfig,
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            storage: StorageConfig::default(),
            genesis: GenesisConfig::default(),
            log: LogConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Sled,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// sled database directory.
    pub path: PathBuf,
    /// Delete the database directory before opening it.
    pub reset_on_start: bool,
    /// Flush to disk after every committed mutation.
    pub sync_writes: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sled,
            path: PathBuf::from("ledger-db"),
            reset_on_start: false,
            sync_writes: true,
        }
    }
}

/// Balances credited when a fresh ledger is created.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenesisConfig {
    pub allocations: Vec<AllocationConfig>,
}

/// One funded account. Give either the owner's `pkey` or the `address` itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationConfig {
    #[serde(default)]
    pub pkey: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    pub balance: u64,
}

impl AllocationConfig {
    pub fn resolve(&self) -> Result<Allocation> {
        let address = match (&self.address, &self.pkey) {
            (Some(address), _) => parse_address(address)
                .ok_or_else(|| LedgerError::InvalidAddressFormat(address.clone()))?,
            (None, Some(pkey)) => derive_address(pkey),
            (None, None) => {
                return Err(LedgerError::MalformedRequest(
                    "allocation needs a pkey or an address".to_string(),
                ))
            }
        };
        Ok(Allocation {
            address,
            balance: self.balance,
        })
    }
}

impl GenesisConfig {
    pub fn allocations(&self) -> Result<Vec<Allocation>> {
        self.allocations.iter().map(AllocationConfig::resolve).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directives, overridden by `RUST_LOG`.
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl Config {
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed("LEDGER_").split("__"))
    }

    pub fn load(path: Option<&Path>) -> std::result::Result<Self, figment::Error> {
        Self::figment(path).extract()
    }
}
