//! Pure chain rules: block hashing and linkage verification.
//!
//! There is no difficulty target. A block is well-formed when anyone holding
//! its predecessor hash, miner address and nonce reproduces its hash.

use crate::types::{Block, ChainVerification};
use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `prev_block_hash || miner_address || nonce`.
pub fn compute_block_hash(prev_block_hash: &str, miner_address: &str, nonce: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prev_block_hash.as_bytes());
    hasher.update(miner_address.as_bytes());
    hasher.update(nonce.as_bytes());
    hex::encode(hasher.finalize())
}

/// Checks every non-genesis block against its predecessor and its own hash.
/// `blocks` must be in id order.
pub fn verify_blocks(blocks: &[Block]) -> ChainVerification {
    let first_invalid = blocks.windows(2).find_map(|pair| {
        let (prev, block) = (&pair[0], &pair[1]);
        let linked = block.prev_block_hash == prev.block_hash;
        let reproducible = block.block_hash
            == compute_block_hash(&block.prev_block_hash, &block.miner_address, &block.nonce);
        (!linked || !reproducible).then_some(block.id)
    });
    let genesis_ok = blocks.first().is_some_and(Block::is_genesis);

    ChainVerification {
        valid: genesis_ok && first_invalid.is_none(),
        height: blocks.len() as u64,
        first_invalid: if genesis_ok {
            first_invalid
        } else {
            blocks.first().map(|b| b.id)
        },
    }
}
