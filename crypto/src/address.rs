//! Address derivation.
//!
//! Format: `vrd_` + hex(32 key bytes) + hex(4 checksum bytes), where the
//! checksum is the first four bytes of Blake2b-256 over the key bytes.
//! Validator identities encode their Ed25519 public key so randomness
//! proofs can be checked against the address alone; managed accounts
//! encode a hash of their creator and creation nonce.

use crate::hash::{blake2b_256, blake2b_256_multi};
use verdict_types::{Address, PublicKey};

const KEY_HEX_LEN: usize = 64;
const CHECKSUM_BYTES: usize = 4;
const BODY_LEN: usize = KEY_HEX_LEN + CHECKSUM_BYTES * 2;

/// Encode 32 bytes as a checksummed `vrd_` address.
pub fn address_from_bytes(bytes: &[u8; 32]) -> Address {
    let checksum = blake2b_256(bytes);
    Address::new(format!(
        "{}{}{}",
        Address::PREFIX,
        hex::encode(bytes),
        hex::encode(&checksum[..CHECKSUM_BYTES])
    ))
}

/// Derive the address of an Ed25519 public key.
pub fn derive_address(public_key: &PublicKey) -> Address {
    address_from_bytes(public_key.as_bytes())
}

/// Derive a fresh managed-account address for `creator`'s `nonce`-th
/// account-creating submission.
pub fn derive_account_address(creator: &Address, nonce: u64) -> Address {
    address_from_bytes(&blake2b_256_multi(&[
        b"verdict-account",
        creator.as_bytes(),
        &nonce.to_le_bytes(),
    ]))
}

/// Recover the 32 key bytes from an address.
///
/// Returns `None` if the address is malformed or the checksum does not match.
pub fn decode_address(address: &str) -> Option<[u8; 32]> {
    let body = address.strip_prefix(Address::PREFIX)?;
    if body.len() != BODY_LEN {
        return None;
    }
    let raw = hex::decode(body).ok()?;
    let (key, checksum) = raw.split_at(32);
    let key: [u8; 32] = key.try_into().ok()?;
    if blake2b_256(&key)[..CHECKSUM_BYTES] != *checksum {
        return None;
    }
    Some(key)
}

/// Whether `address` is well-formed with a valid checksum.
pub fn validate_address(address: &str) -> bool {
    decode_address(address).is_some()
}
