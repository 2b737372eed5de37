//! # hashledger
//!
//! A single-node ledger: address balances, an append-only transfer log and a
//! hash-linked chain of blocks that mints a fixed reward to each block's
//! submitter.

pub mod address;
pub mod api;
pub mod chain;
pub mod config;
pub mod error;
pub mod ledger;
pub mod storage;
pub mod types;

pub use error::{LedgerError, Result};
pub use ledger::Ledger;
