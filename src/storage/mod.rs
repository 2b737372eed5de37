//! Repository traits behind the ledger engine.
//!
//! Writes go through a [`LedgerTxn`], a unit of work that is committed only
//! when the closure passed to [`LedgerStore::atomically`] returns `Ok`. Any
//! error discards every write made inside it.

pub mod memory;
pub mod sled_store;

pub use memory::MemoryStore;
pub use sled_store::SledStore;

use crate::error::{LedgerError, Result};
use crate::types::{Address, Block, Transaction, GENESIS_HASH, GENESIS_MINER, GENESIS_NONCE};

/// Balances keyed by address.
pub trait AddressStore {
    fn get_address(&self, address: &str) -> Result<Option<Address>>;
    fn put_address(&mut self, record: Address) -> Result<()>;
    fn next_address_id(&mut self) -> Result<u64>;

    /// Absent addresses hold zero.
    fn get_balance(&self, address: &str) -> Result<u64> {
        Ok(self.get_address(address)?.map_or(0, |record| record.balance))
    }

    /// Creates the record on first credit.
    fn credit(&mut self, address: &str, amount: u64) -> Result<()> {
        let record = match self.get_address(address)? {
            Some(mut record) => {
                record.balance = record.balance.checked_add(amount).ok_or_else(|| {
                    LedgerError::StorageFailure(format!("balance overflow for {}", address))
                })?;
                record
            }
            None => Address {
                id: self.next_address_id()?,
                address: address.to_string(),
                balance: amount,
            },
        };
        self.put_address(record)
    }

    fn debit(&mut self, address: &str, amount: u64) -> Result<()> {
        let balance = self.get_balance(address)?;
        if balance < amount {
            return Err(LedgerError::InsufficientFunds {
                address: address.to_string(),
                balance,
                required: amount,
            });
        }
        // balance >= amount > 0 implies the record exists
        let mut record = self
            .get_address(address)?
            .ok_or_else(|| LedgerError::StorageFailure(format!("{} vanished", address)))?;
        record.balance = balance - amount;
        self.put_address(record)
    }
}

/// Append-only transfer history.
pub trait TransactionLog {
    fn append_transaction(
        &mut self,
        sender: &str,
        amount: u64,
        recipient: &str,
        timestamp: u64,
    ) -> Result<Transaction>;
}

/// Append-only chain. Linkage is checked by the engine, not here.
pub trait ChainStore {
    /// Hash of the last appended block, `None` before genesis.
    fn tip(&self) -> Result<Option<String>>;

    fn append_block(
        &mut self,
        block_hash: &str,
        prev_block_hash: &str,
        miner_address: &str,
        nonce: &str,
        timestamp: u64,
    ) -> Result<Block>;

    fn tip_hash(&self) -> Result<String> {
        Ok(self.tip()?.unwrap_or_else(|| GENESIS_HASH.to_string()))
    }
}

pub trait LedgerTxn: AddressStore + TransactionLog + ChainStore {}

impl<T: AddressStore + TransactionLog + ChainStore> LedgerTxn for T {}

/// A durable (or in-memory) ledger backend.
pub trait LedgerStore: Send + Sync + 'static {
    /// Runs `op` as a single atomic unit. `op` may be retried by the backend
    /// and must not have effects outside `txn`.
    fn atomically<T, F>(&self, op: F) -> Result<T>
    where
        F: Fn(&mut dyn LedgerTxn) -> Result<T>;

    fn tip_hash(&self) -> Result<String>;
    fn address(&self, address: &str) -> Result<Option<Address>>;
    fn addresses(&self) -> Result<Vec<Address>>;
    fn transaction(&self, id: u64) -> Result<Option<Transaction>>;
    fn transactions(&self) -> Result<Vec<Transaction>>;
    fn block(&self, id: u64) -> Result<Option<Block>>;
    fn blocks(&self) -> Result<Vec<Block>>;

    fn balance(&self, address: &str) -> Result<u64> {
        Ok(self.address(address)?.map_or(0, |record| record.balance))
    }

    /// Transactions where `address` is sender or recipient, in id order.
    fn transactions_for(&self, address: &str) -> Result<Vec<Transaction>> {
        let mut transactions = self.transactions()?;
        transactions.retain(|tx| tx.involves(address));
        Ok(transactions)
    }

    /// Seeds the genesis block if the chain is empty. Returns whether it did.
    fn initialize(&self, genesis_time: u64) -> Result<bool> {
        self.atomically(|txn| {
            if txn.tip()?.is_some() {
                return Ok(false);
            }
            txn.append_block(
                GENESIS_HASH,
                GENESIS_HASH,
                GENESIS_MINER,
                GENESIS_NONCE,
                genesis_time,
            )?;
            Ok(true)
        })
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}
