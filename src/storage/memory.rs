use crate::error::Result;
use crate::storage::{AddressStore, ChainStore, LedgerStore, LedgerTxn, TransactionLog};
use crate::types::{Address, Block, Transaction, GENESIS_HASH};
use parking_lot::Mutex;
use std::collections::BTreeMap;

#[derive(Default, Debug)]
struct Data {
    addresses: BTreeMap<String, Address>,
    transactions: Vec<Transaction>,
    blocks: Vec<Block>,
    last_address_id: u64,
}

/// Volatile backend. A unit of work writes in place and keeps an undo log;
/// on failure only the entries it touched are restored.
#[derive(Default, Debug)]
pub struct MemoryStore {
    data: Mutex<Data>,
}

struct MemoryTxn<'a> {
    data: &'a mut Data,
    /// Prior value of every address written, recorded on first write.
    undo: BTreeMap<String, Option<Address>>,
}

/// Log lengths and counters at the start of a unit of work.
struct Checkpoint {
    transactions: usize,
    blocks: usize,
    last_address_id: u64,
}

impl MemoryTxn<'_> {
    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            transactions: self.data.transactions.len(),
            blocks: self.data.blocks.len(),
            last_address_id: self.data.last_address_id,
        }
    }

    fn rollback(self, checkpoint: Checkpoint) {
        for (address, previous) in self.undo {
            match previous {
                Some(record) => {
                    self.data.addresses.insert(address, record);
                }
                None => {
                    self.data.addresses.remove(&address);
                }
            }
        }
        self.data.transactions.truncate(checkpoint.transactions);
        self.data.blocks.truncate(checkpoint.blocks);
        self.data.last_address_id = checkpoint.last_address_id;
    }
}

impl AddressStore for MemoryTxn<'_> {
    fn get_address(&self, address: &str) -> Result<Option<Address>> {
        Ok(self.data.addresses.get(address).cloned())
    }

    fn put_address(&mut self, record: Address) -> Result<()> {
        let previous = self.data.addresses.insert(record.address.clone(), record.clone());
        self.undo.entry(record.address).or_insert(previous);
        Ok(())
    }

    fn next_address_id(&mut self) -> Result<u64> {
        self.data.last_address_id += 1;
        Ok(self.data.last_address_id)
    }
}

impl TransactionLog for MemoryTxn<'_> {
    fn append_transaction(
        &mut self,
        sender: &str,
        amount: u64,
        recipient: &str,
        timestamp: u64,
    ) -> Result<Transaction> {
        let transaction = Transaction {
            id: self.data.transactions.len() as u64 + 1,
            sender: sender.to_string(),
            amount,
            recipient: recipient.to_string(),
            timestamp,
        };
        self.data.transactions.push(transaction.clone());
        Ok(transaction)
    }
}

impl ChainStore for MemoryTxn<'_> {
    fn tip(&self) -> Result<Option<String>> {
        Ok(self.data.blocks.last().map(|b| b.block_hash.clone()))
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
            id: self.data.blocks.len() as u64 + 1,
            block_hash: block_hash.to_string(),
            prev_block_hash: prev_block_hash.to_string(),
            miner_address: miner_address.to_string(),
            nonce: nonce.to_string(),
            timestamp,
        };
        self.data.blocks.push(block.clone());
        Ok(block)
    }
}

impl LedgerStore for MemoryStore {
    fn atomically<T, F>(&self, op: F) -> Result<T>
    where
        F: Fn(&mut dyn LedgerTxn) -> Result<T>,
    {
        let mut data = self.data.lock();
        let mut txn = MemoryTxn {
            data: &mut *data,
            undo: BTreeMap::new(),
        };
        let checkpoint = txn.checkpoint();
        match op(&mut txn as &mut dyn LedgerTxn) {
            Ok(value) => Ok(value),
            Err(err) => {
                txn.rollback(checkpoint);
                Err(err)
            }
        }
    }

    fn tip_hash(&self) -> Result<String> {
        Ok(self
            .data
            .lock()
            .blocks
            .last()
            .map_or_else(|| GENESIS_HASH.to_string(), |b| b.block_hash.clone()))
    }

    fn address(&self, address: &str) -> Result<Option<Address>> {
        Ok(self.data.lock().addresses.get(address).cloned())
    }

    fn addresses(&self) -> Result<Vec<Address>> {
        let mut addresses: Vec<Address> = self.data.lock().addresses.values().cloned().collect();
        addresses.sort_by_key(|a| a.id);
        Ok(addresses)
    }

    fn transaction(&self, id: u64) -> Result<Option<Transaction>> {
        let data = self.data.lock();
        Ok(id
            .checked_sub(1)
            .and_then(|index| data.transactions.get(index as usize))
            .cloned())
    }

    fn transactions(&self) -> Result<Vec<Transaction>> {
        Ok(self.data.lock().transactions.clone())
    }

    fn block(&self, id: u64) -> Result<Option<Block>> {
        let data = self.data.lock();
        Ok(id
            .checked_sub(1)
            .and_then(|index| data.blocks.get(index as usize))
            .cloned())
    }

    fn blocks(&self) -> Result<Vec<Block>> {
        Ok(self.data.lock().blocks.clone())
    }
}
