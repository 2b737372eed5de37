//! The ledger engine.
//!
//! All mutations run under one writer lock and inside one storage unit of
//! work, so the funds check and the chain-tip check cannot race with another
//! request, and a failure leaves the ledger exactly as it was.

use crate::address::{derive_address, parse_address};
use crate::chain::{compute_block_hash, verify_blocks};
use crate::error::{LedgerError, Result};
use crate::storage::{AddressStore, ChainStore, LedgerStore, TransactionLog};
use crate::types::{
    current_timestamp, Address, Allocation, Block, ChainVerification, LedgerEvent, LedgerStats,
    Transaction, REWARD, REWARD_SENDER,
};
use parking_lot::Mutex;

pub struct Ledger<S> {
    store: S,
    write_lock: Mutex<()>,
}

impl<S: LedgerStore> Ledger<S> {
    /// Opens the ledger on `store`, seeding genesis and `allocations` if the
    /// store is empty. An existing ledger is never re-seeded.
    pub fn open(store: S, allocations: &[Allocation]) -> Result<Self> {
        let now = current_timestamp();
        let fresh = store.initialize(now)?;
        if fresh {
            tracing::info!(genesis_time = now, "created genesis block");
            Self::seed(&store, allocations)?;
        } else {
            let tip = store.tip_hash()?;
            tracing::info!(%tip, "resumed existing ledger");
        }
        Ok(Self {
            store,
            write_lock: Mutex::new(()),
        })
    }

    fn seed(store: &S, allocations: &[Allocation]) -> Result<()> {
        for allocation in allocations {
            if parse_address(&allocation.address).as_deref() != Some(allocation.address.as_str()) {
                return Err(LedgerError::InvalidAddressFormat(allocation.address.clone()));
            }
        }
        store.atomically(|txn| {
            for allocation in allocations.iter().filter(|a| a.balance > 0) {
                txn.credit(&allocation.address, allocation.balance)?;
            }
            Ok(())
        })?;
        for allocation in allocations {
            tracing::debug!(address = %allocation.address, balance = allocation.balance, "seeded allocation");
        }
        Ok(())
    }

    // --- Mutations ---

    /// Moves `amount` from the address owned by `secret` to `recipient`.
    pub fn submit_transfer(&self, secret: &str, recipient: &str, amount: u64) -> Result<LedgerEvent> {
        let sender = derive_address(secret);
        let recipient = parse_address(recipient)
            .ok_or_else(|| LedgerError::InvalidRecipient(recipient.to_string()))?;
        if amount == 0 {
            return Err(LedgerError::MalformedRequest(
                "amount must be greater than zero".to_string(),
            ));
        }

        let _guard = self.write_lock.lock();
        let timestamp = current_timestamp();
        let transaction = self.store.atomically(|txn| {
            let balance = txn.get_balance(&sender)?;
            if balance < amount {
                return Err(LedgerError::InsufficientFunds {
                    address: sender.clone(),
                    balance,
                    required: amount,
                });
            }
            txn.debit(&sender, amount)?;
            txn.credit(&recipient, amount)?;
            txn.append_transaction(&sender, amount, &recipient, timestamp)
        })?;
        Ok(LedgerEvent::TransferApplied { transaction })
    }

    /// Appends a block on top of the current tip and rewards its miner.
    pub fn submit_block(
        &self,
        block_hash: &str,
        prev_block_hash: &str,
        miner_address: &str,
        nonce: &str,
    ) -> Result<LedgerEvent> {
        // The block keeps the submitted spelling so its hash stays reproducible;
        // the reward goes to the canonical account.
        let miner = parse_address(miner_address).unwrap_or_else(|| miner_address.to_string());
        let _guard = self.write_lock.lock();
        let timestamp = current_timestamp();
        let (block, reward) = self.store.atomically(|txn| {
            let tip = txn.tip_hash()?;
            if prev_block_hash != tip {
                return Err(LedgerError::PrevBlockMismatch {
                    submitted: prev_block_hash.to_string(),
                    tip,
                });
            }
            let expected = compute_block_hash(prev_block_hash, miner_address, nonce);
            if block_hash != expected {
                return Err(LedgerError::InvalidBlockHash {
                    submitted: block_hash.to_string(),
                    expected,
                });
            }
            let block =
                txn.append_block(block_hash, prev_block_hash, miner_address, nonce, timestamp)?;
            txn.credit(&miner, REWARD)?;
            let reward = txn.append_transaction(REWARD_SENDER, REWARD, &miner, timestamp)?;
            Ok((block, reward))
        })?;
        Ok(LedgerEvent::BlockAccepted { block, reward })
    }

    // --- Reads ---

    pub fn balance(&self, address: &str) -> Result<u64> {
        let address = parse_address(address)
            .ok_or_else(|| LedgerError::InvalidAddressFormat(address.to_string()))?;
        self.store.balance(&address)
    }

    /// The stored record, or a zero-balance view with id 0 if none exists yet.
    pub fn address(&self, address: &str) -> Result<Address> {
        let address = parse_address(address)
            .ok_or_else(|| LedgerError::InvalidAddressFormat(address.to_string()))?;
        Ok(self.store.address(&address)?.unwrap_or(Address {
            id: 0,
            address,
            balance: 0,
        }))
    }

    pub fn addresses(&self) -> Result<Vec<Address>> {
        self.store.addresses()
    }

    pub fn transaction(&self, id: u64) -> Result<Option<Transaction>> {
        self.store.transaction(id)
    }

    pub fn transactions(&self) -> Result<Vec<Transaction>> {
        self.store.transactions()
    }

    /// Accepts the reward sentinel as well as regular addresses.
    pub fn transactions_for(&self, address: &str) -> Result<Vec<Transaction>> {
        let address = parse_address(address).unwrap_or_else(|| address.to_string());
        self.store.transactions_for(&address)
    }

    pub fn tip_hash(&self) -> Result<String> {
        self.store.tip_hash()
    }

    pub fn block(&self, id: u64) -> Result<Option<Block>> {
        self.store.block(id)
    }

    pub fn blocks(&self) -> Result<Vec<Block>> {
        self.store.blocks()
    }

    pub fn verify_chain(&self) -> Result<ChainVerification> {
        Ok(verify_blocks(&self.store.blocks()?))
    }

    pub fn stats(&self) -> Result<LedgerStats> {
        let addresses = self.store.addresses()?;
        Ok(LedgerStats {
            blocks: self.store.blocks()?.len() as u64,
            transactions: self.store.transactions()?.len() as u64,
            addresses: addresses.len() as u64,
            circulating_supply: addresses.iter().map(|a| a.balance).sum(),
        })
    }

    pub fn close(&self) -> Result<()> {
        self.store.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::types::GENESIS_HASH;
    use pretty_assertions::assert_eq;

    const ALICE_KEY: &str = "alice secret";
    const BOB: &str = "b0b0b0b0b0b0";

    fn alice() -> String {
        derive_address(ALICE_KEY)
    }

    fn ledger() -> Ledger<MemoryStore> {
        Ledger::open(
            MemoryStore::default(),
            &[Allocation {
                address: alice(),
                balance: 1000,
            }],
        )
        .unwrap()
    }

    #[test]
    fn open_seeds_allocations_once() {
        let ledger = ledger();
        assert_eq!(ledger.balance(&alice()).unwrap(), 1000);
        assert_eq!(ledger.blocks().unwrap().len(), 1);
        assert!(ledger.transactions().unwrap().is_empty());
    }

    #[test]
    fn open_rejects_malformed_allocation() {
        let result = Ledger::open(
            MemoryStore::default(),
            &[Allocation {
                address: "alice".into(),
                balance: 10,
            }],
        );
        assert!(matches!(result, Err(LedgerError::InvalidAddressFormat(_))));
    }

    #[test]
    fn transfer_moves_funds_and_logs() {
        let ledger = ledger();
        let event = ledger.submit_transfer(ALICE_KEY, BOB, 200).unwrap();
        let LedgerEvent::TransferApplied { transaction } = event else {
            panic!("expected a transfer event");
        };
        assert_eq!(transaction.id, 1);
        assert_eq!(transaction.sender, alice());
        assert_eq!(transaction.recipient, BOB);
        assert_eq!(transaction.amount, 200);
        assert_eq!(ledger.balance(&alice()).unwrap(), 800);
        assert_eq!(ledger.balance(BOB).unwrap(), 200);
    }

    #[test]
    fn recipient_is_checked_before_funds() {
        let ledger = ledger();
        let err = ledger
            .submit_transfer("nobody", "not-an-address", 5)
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_recipient");
    }

    #[test]
    fn zero_amount_is_malformed() {
        let ledger = ledger();
        let err = ledger.submit_transfer(ALICE_KEY, BOB, 0).unwrap_err();
        assert_eq!(err.kind(), "malformed_request");
        assert!(ledger.transactions().unwrap().is_empty());
    }

    #[test]
    fn uppercase_recipient_is_normalised() {
        let ledger = ledger();
        ledger.submit_transfer(ALICE_KEY, "B0B0B0B0B0B0", 1).unwrap();
        assert_eq!(ledger.balance(BOB).unwrap(), 1);
        assert_eq!(ledger.balance("B0B0B0B0B0B0").unwrap(), 1);
    }

    #[test]
    fn self_transfer_keeps_balance() {
        let ledger = ledger();
        ledger.submit_transfer(ALICE_KEY, &alice(), 600).unwrap();
        assert_eq!(ledger.balance(&alice()).unwrap(), 1000);
        assert_eq!(ledger.transactions().unwrap().len(), 1);
    }

    #[test]
    fn block_reward_and_tip_advance() {
        let ledger = ledger();
        let hash = compute_block_hash(GENESIS_HASH, BOB, "7");
        let event = ledger.submit_block(&hash, GENESIS_HASH, BOB, "7").unwrap();
        let LedgerEvent::BlockAccepted { block, reward } = event else {
            panic!("expected a block event");
        };
        assert_eq!(block.id, 2);
        assert_eq!(reward.sender, REWARD_SENDER);
        assert_eq!(reward.amount, REWARD);
        assert_eq!(ledger.tip_hash().unwrap(), hash);
        assert_eq!(ledger.balance(BOB).unwrap(), REWARD);
    }

    #[test]
    fn uppercase_miner_is_rewarded_on_canonical_account() {
        let ledger = ledger();
        let miner = "ABCDEFABCDEF";
        let hash = compute_block_hash(GENESIS_HASH, miner, "1");
        ledger.submit_block(&hash, GENESIS_HASH, miner, "1").unwrap();
        ledger.submit_transfer(ALICE_KEY, miner, 5).unwrap();

        assert_eq!(ledger.balance(miner).unwrap(), REWARD + 5);
        assert_eq!(ledger.balance("abcdefabcdef").unwrap(), REWARD + 5);
        assert_eq!(ledger.transactions_for(miner).unwrap().len(), 2);
        assert_eq!(ledger.addresses().unwrap().len(), 2);
        assert_eq!(ledger.blocks().unwrap()[1].miner_address, miner);
        assert!(ledger.verify_chain().unwrap().valid);
    }

    #[test]
    fn linkage_is_checked_before_hash() {
        let ledger = ledger();
        let err = ledger
            .submit_block("garbage", "not-the-tip", BOB, "1")
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::PrevBlockMismatch {
                submitted: "not-the-tip".into(),
                tip: GENESIS_HASH.into()
            }
        );
    }

    #[test]
    fn verify_and_stats_follow_activity() {
        let ledger = ledger();
        let hash = compute_block_hash(GENESIS_HASH, BOB, "n");
        ledger.submit_block(&hash, GENESIS_HASH, BOB, "n").unwrap();
        ledger.submit_transfer(ALICE_KEY, BOB, 10).unwrap();

        let report = ledger.verify_chain().unwrap();
        assert!(report.valid);
        assert_eq!(report.height, 2);

        let stats = ledger.stats().unwrap();
        assert_eq!(
            stats,
            LedgerStats {
                blocks: 2,
                transactions: 2,
                addresses: 2,
                circulating_supply: 1000 + REWARD,
            }
        );
    }

    #[test]
    fn address_view_for_unknown_address() {
        let ledger = ledger();
        let view = ledger.address("CCCCCCCCCCCC").unwrap();
        assert_eq!(view.address, "cccccccccccc");
        assert_eq!(view.balance, 0);
        assert_eq!(view.id, 0);
        assert_eq!(
            ledger.address("xyz").unwrap_err().kind(),
            "invalid_address_format"
        );
    }

    #[test]
    fn transactions_for_includes_rewards_and_transfers() {
        let ledger = ledger();
        let hash = compute_block_hash(GENESIS_HASH, BOB, "n");
        ledger.submit_block(&hash, GENESIS_HASH, BOB, "n").unwrap();
        ledger.submit_transfer(ALICE_KEY, BOB, 10).unwrap();
        ledger.submit_transfer(ALICE_KEY, "cccccccccccc", 10).unwrap();

        assert_eq!(ledger.transactions_for(BOB).unwrap().len(), 2);
        assert_eq!(ledger.transactions_for(&alice()).unwrap().len(), 2);
        assert_eq!(ledger.transactions_for(REWARD_SENDER).unwrap().len(), 1);
    }
}
