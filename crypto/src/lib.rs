//! Cryptographic primitives for the verdict engine.
//!
//! - **Ed25519** signs randomness proofs over a transaction's seed
//! - **Blake2b** derives transaction ids, account addresses and seeds
//! - **HMAC-SHA256** binds a commit-reveal vote to the validator that cast it
//! - Address derivation with the `vrd_` prefix and a Blake2b checksum

pub mod address;
pub mod commitment;
pub mod hash;
pub mod keys;
pub mod sign;

pub use address::{address_from_bytes, decode_address, derive_account_address, derive_address, validate_address};
pub use commitment::{vote_commitment, verify_vote_commitment, VoteNonce};
pub use hash::{blake2b_256, blake2b_256_multi, transaction_id};
pub use keys::{keypair_from_seed, public_from_private};
pub use sign::{sign_message, verify_signature};
