use hashledger::address::derive_address;
use hashledger::chain::compute_block_hash;
use hashledger::storage::MemoryStore;
use hashledger::types::{Allocation, REWARD};
use hashledger::Ledger;
use proptest::prelude::*;

const KEYS: [&str; 3] = ["key-a", "key-b", "key-c"];

fn ledger() -> Ledger<MemoryStore> {
    let allocations: Vec<Allocation> = KEYS
        .iter()
        .map(|key| Allocation {
            address: derive_address(key),
            balance: 500,
        })
        .collect();
    Ledger::open(MemoryStore::default(), &allocations).unwrap()
}

fn supply(ledger: &Ledger<MemoryStore>) -> u64 {
    ledger.stats().unwrap().circulating_supply
}

proptest! {
    #[test]
    fn transfers_conserve_supply(
        transfers in prop::collection::vec((0usize..3, 0usize..3, 1u64..400), 1..40)
    ) {
        let ledger = ledger();
        let before = supply(&ledger);

        for (from, to, amount) in transfers {
            let sender = derive_address(KEYS[from]);
            let recipient = derive_address(KEYS[to]);
            let sender_before = ledger.balance(&sender).unwrap();
            let recipient_before = ledger.balance(&recipient).unwrap();

            match ledger.submit_transfer(KEYS[from], &recipient, amount) {
                Ok(_) => prop_assert!(sender_before >= amount),
                Err(err) => {
                    prop_assert_eq!(err.kind(), "insufficient_funds");
                    prop_assert!(sender_before < amount);
                    prop_assert_eq!(ledger.balance(&sender).unwrap(), sender_before);
                    prop_assert_eq!(ledger.balance(&recipient).unwrap(), recipient_before);
                }
            }
            prop_assert_eq!(supply(&ledger), before);
        }
    }

    #[test]
    fn each_block_mints_exactly_one_reward(nonces in prop::collection::vec("[a-z0-9]{1,8}", 1..10)) {
        let ledger = ledger();
        let miner = derive_address("miner");

        for nonce in &nonces {
            let before = supply(&ledger);
            let prev = ledger.tip_hash().unwrap();
            let hash = compute_block_hash(&prev, &miner, nonce);
            ledger.submit_block(&hash, &prev, &miner, nonce).unwrap();
            prop_assert_eq!(supply(&ledger), before + REWARD);
            prop_assert_eq!(ledger.tip_hash().unwrap(), hash);
        }
        prop_assert!(ledger.verify_chain().unwrap().valid);
    }

    #[test]
    fn wrong_hash_never_changes_state(nonce in "[a-z]{1,8}", bogus in "[0-9a-f]{64}") {
        let ledger = ledger();
        let miner = derive_address("miner");
        let prev = ledger.tip_hash().unwrap();
        prop_assume!(bogus != compute_block_hash(&prev, &miner, &nonce));

        let err = ledger.submit_block(&bogus, &prev, &miner, &nonce).unwrap_err();
        prop_assert_eq!(err.kind(), "invalid_block_hash");
        prop_assert_eq!(ledger.tip_hash().unwrap(), prev);
        prop_assert_eq!(ledger.blocks().unwrap().len(), 1);
        prop_assert_eq!(ledger.balance(&miner).unwrap(), 0);
    }
}
