//! Durable backend on sled.
//!
//! # Trees
//!
//! - `addresses` - address string -> JSON [`Address`]
//! - `transactions` - big-endian id -> JSON [`Transaction`]
//! - `blocks` - big-endian id -> JSON [`Block`]
//! - `meta` - chain tip and the last id handed out per relation

use crate::error::{LedgerError, Result};
use crate::storage::{AddressStore, ChainStore, LedgerStore, LedgerTxn, TransactionLog};
use crate::types::{Address, Block, Transaction, GENESIS_HASH};
use serde::de::DeserializeOwned;
use sled::transaction::{
    ConflictableTransactionError, TransactionError, TransactionalTree, UnabortableTransactionError,
};
use sled::{Db, IVec, Transactional, Tree};
use std::cell::Cell;
use std::path::Path;

const TREE_ADDRESSES: &str = "addresses";
const TREE_TRANSACTIONS: &str = "transactions";
const TREE_BLOCKS: &str = "blocks";
const TREE_META: &str = "meta";

const META_TIP: &[u8] = b"tip";
const META_LAST_ADDRESS_ID: &[u8] = b"last_address_id";
const META_LAST_TRANSACTION_ID: &[u8] = b"last_transaction_id";
const META_LAST_BLOCK_ID: &[u8] = b"last_block_id";

pub struct SledStore {
    db: Db,
    addresses: Tree,
    transactions: Tree,
    blocks: Tree,
    meta: Tree,
    sync_writes: bool,
}

impl SledStore {
    /// Opens or creates the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let db = sled::open(path)?;
        tracing::info!(path = %path.display(), recovered = db.was_recovered(), "opened sled store");
        Self::from_db(db)
    }

    /// Deletes any existing database at `path` before opening it.
    pub fn open_fresh(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            std::fs::remove_dir_all(path).map_err(|err| {
                LedgerError::StorageFailure(format!("cannot reset {}: {}", path.display(), err))
            })?;
            tracing::info!(path = %path.display(), "deleted existing sled store");
        }
        Self::open(path)
    }

    /// Flush to disk after every committed unit of work.
    pub fn with_sync_writes(mut self, sync_writes: bool) -> Self {
        self.sync_writes = sync_writes;
        self
    }

    fn from_db(db: Db) -> Result<Self> {
        Ok(Self {
            addresses: db.open_tree(TREE_ADDRESSES)?,
            transactions: db.open_tree(TREE_TRANSACTIONS)?,
            blocks: db.open_tree(TREE_BLOCKS)?,
            meta: db.open_tree(TREE_META)?,
            db,
            sync_writes: false,
        })
    }

    fn scan<T: DeserializeOwned>(tree: &Tree) -> Result<Vec<T>> {
        tree.iter()
            .values()
            .map(|value| -> Result<T> { Ok(serde_json::from_slice(&value?)?) })
            .collect()
    }
}

// --- Encoding helpers ---

fn decode_id(bytes: &IVec) -> Result<u64> {
    let array = <[u8; 8]>::try_from(&bytes[..])
        .map_err(|_| LedgerError::StorageFailure("corrupt id counter".to_string()))?;
    Ok(u64::from_be_bytes(array))
}

fn decode_hash(bytes: &IVec) -> Result<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| LedgerError::StorageFailure("corrupt chain tip".to_string()))
}

// --- Unit of work ---

struct SledTxn<'a> {
    addresses: &'a TransactionalTree,
    transactions: &'a TransactionalTree,
    blocks: &'a TransactionalTree,
    meta: &'a TransactionalTree,
    /// Set when sled reports a conflict; sled then reruns the attempt.
    conflicted: Cell<bool>,
}

impl SledTxn<'_> {
    fn unabortable(&self, err: UnabortableTransactionError) -> LedgerError {
        match err {
            UnabortableTransactionError::Conflict => {
                self.conflicted.set(true);
                LedgerError::StorageFailure("conflicting concurrent write".to_string())
            }
            UnabortableTransactionError::Storage(err) => err.into(),
        }
    }

    fn next_id(&self, counter: &[u8]) -> Result<u64> {
        let last = match self.meta.get(counter).map_err(|err| self.unabortable(err))? {
            Some(bytes) => decode_id(&bytes)?,
            None => 0,
        };
        let next = last + 1;
        self.meta
            .insert(counter, next.to_be_bytes().to_vec())
            .map_err(|err| self.unabortable(err))?;
        Ok(next)
    }
}

impl AddressStore for SledTxn<'_> {
    fn get_address(&self, address: &str) -> Result<Option<Address>> {
        match self.addresses.get(address).map_err(|err| self.unabortable(err))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_address(&mut self, record: Address) -> Result<()> {
        self.addresses
            .insert(record.address.as_bytes(), serde_json::to_vec(&record)?)
            .map_err(|err| self.unabortable(err))?;
        Ok(())
    }

    fn next_address_id(&mut self) -> Result<u64> {
        self.next_id(META_LAST_ADDRESS_ID)
    }
}

impl TransactionLog for SledTxn<'_> {
    fn append_transaction(
        &mut self,
        sender: &str,
        amount: u64,
        recipient: &str,
        timestamp: u64,
    ) -> Result<Transaction> {
        let transaction = Transaction {
            id: self.next_id(META_LAST_TRANSACTION_ID)?,
            sender: sender.to_string(),
            amount,
            recipient: recipient.to_string(),
            timestamp,
        };
        self.transactions
            .insert(
                transaction.id.to_be_bytes().to_vec(),
                serde_json::to_vec(&transaction)?,
            )
            .map_err(|err| self.unabortable(err))?;
        Ok(transaction)
    }
}

impl ChainStore for SledTxn<'_> {
    fn tip(&self) -> Result<Option<String>> {
        self.meta
            .get(META_TIP)
            .map_err(|err| self.unabortable(err))?
            .map(|bytes| decode_hash(&bytes))
            .transpose()
    }

    fn append_block(
        &mut self,
        block_hash: &str,
        prev_block_hash: &str,
        miner_address: &str,
        nonce: &str,
        timestamp: u64,
    ) -> Result<Block> {
        let block = Block {
            id: self.next_id(META_LAST_BLOCK_ID)?,
            block_hash: block_hash.to_string(),
            prev_block_hash: prev_block_hash.to_string(),
            miner_address: miner_address.to_string(),
            nonce: nonce.to_string(),
            timestamp,
        };
        self.blocks
            .insert(block.id.to_be_bytes().to_vec(), serde_json::to_vec(&block)?)
            .map_err(|err| self.unabortable(err))?;
        self.meta
            .insert(META_TIP, block_hash.as_bytes())
            .map_err(|err| self.unabortable(err))?;
        Ok(block)
    }
}

impl LedgerStore for SledStore {
    fn atomically<T, F>(&self, op: F) -> Result<T>
    where
        F: Fn(&mut dyn LedgerTxn) -> Result<T>,
    {
        let outcome = (&self.addresses, &self.transactions, &self.blocks, &self.meta).transaction(
            |(addresses, transactions, blocks, meta)| {
                let mut txn = SledTxn {
                    addresses,
                    transactions,
                    blocks,
                    meta,
                    conflicted: Cell::new(false),
                };
                let result = op(&mut txn as &mut dyn LedgerTxn);
                if txn.conflicted.get() {
                    return Err(UnabortableTransactionError::Conflict.into());
                }
                result.map_err(ConflictableTransactionError::Abort)
            },
        );
        let value = match outcome {
            Ok(value) => value,
            Err(TransactionError::Abort(err)) => return Err(err),
            Err(TransactionError::Storage(err)) => return Err(err.into()),
        };
        if self.sync_writes {
            self.db.flush()?;
        }
        Ok(value)
    }

    fn tip_hash(&self) -> Result<String> {
        match self.meta.get(META_TIP)? {
            Some(bytes) => decode_hash(&bytes),
            None => Ok(GENESIS_HASH.to_string()),
        }
    }

    fn address(&self, address: &str) -> Result<Option<Address>> {
        match self.addresses.get(address)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn addresses(&self) -> Result<Vec<Address>> {
        let mut addresses: Vec<Address> = Self::scan(&self.addresses)?;
        addresses.sort_by_key(|a| a.id);
        Ok(addresses)
    }

    fn transaction(&self, id: u64) -> Result<Option<Transaction>> {
        match self.transactions.get(id.to_be_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn transactions(&self) -> Result<Vec<Transaction>> {
        Self::scan(&self.transactions)
    }

    fn block(&self, id: u64) -> Result<Option<Block>> {
        match self.blocks.get(id.to_be_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn blocks(&self) -> Result<Vec<Block>> {
        Self::scan(&self.blocks)
    }

    fn flush(&self) -> Result<()> {
        let bytes = self.db.flush()?;
        tracing::debug!(bytes, "flushed sled store");
        Ok(())
    }
}
