//! Address derivation and validation.
//!
//! An address is the first [`ADDRESS_HEX_LEN`] hex digits of the SHA-256 digest
//! of the spender's key material. Holding that material is the only spending
//! authority a transfer carries; no signature over the transfer is checked.

use sha2::{Digest, Sha256};

/// Number of hex digits in an address.
pub const ADDRESS_HEX_LEN: usize = 12;

/// Derives the address owned by `secret`.
pub fn derive_address(secret: impl AsRef<[u8]>) -> String {
    let digest = Sha256::digest(secret.as_ref());
    let mut address = hex::encode(digest);
    address.truncate(ADDRESS_HEX_LEN);
    address
}

/// True iff `address` is an unsigned hex integer of exactly [`ADDRESS_HEX_LEN`] digits.
pub fn validate_address(address: &str) -> bool {
    address.len() == ADDRESS_HEX_LEN && address.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Validates `address` and returns its canonical lowercase form.
pub fn parse_address(address: &str) -> Option<String> {
    validate_address(address).then(|| address.to_ascii_lowercase())
}
