use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Currency minted to the submitter of every accepted block.
pub const REWARD: u64 = 1;

/// Sender recorded on reward transactions.
pub const REWARD_SENDER: &str = "null";

/// Hash (and predecessor hash) of the genesis block.
pub const GENESIS_HASH: &str = "0";

pub const GENESIS_MINER: &str = "address";
pub const GENESIS_NONCE: &str = "nonce";

// --- Ledger records ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub id: u64,
    pub address: String,
    pub balance: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: u64,
    /// Address, or [`REWARD_SENDER`] for block rewards.
    pub sender: String,
    pub amount: u64,
    pub recipient: String,
    pub timestamp: u64,
}

impl Transaction {
    pub fn is_reward(&self) -> bool {
        self.sender == REWARD_SENDER
    }

    pub fn involves(&self, address: &str) -> bool {
        self.sender == address || self.recipient == address
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub id: u64,
    pub block_hash: String,
    pub prev_block_hash: String,
    pub miner_address: String,
    pub nonce: String,
    pub timestamp: u64,
}

impl Block {
    pub fn is_genesis(&self) -> bool {
        self.block_hash == GENESIS_HASH && self.prev_block_hash == GENESIS_HASH
    }
}

/// Balance credited to an address when a fresh ledger is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub address: String,
    pub balance: u64,
}

// --- Engine results ---

/// What a successful mutation changed. Returned instead of logged so callers
/// decide how to record it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    TransferApplied { transaction: Transaction },
    BlockAccepted { block: Block, reward: Transaction },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerification {
    pub valid: bool,
    /// Number of blocks, genesis included.
    pub height: u64,
    pub first_invalid: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub blocks: u64,
    pub transactions: u64,
    pub addresses: u64,
    pub circulating_supply: u64,
}

pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}
