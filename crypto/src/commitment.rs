//! Keyed commit-reveal vote commitments.
//!
//! `commitment = HMAC-SHA256(key = validator address, "verdict-vote" || vote || nonce)`.
//! Keying by the validator makes a copied commitment useless to anyone else:
//! the same vote and nonce hash differently for every validator.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use verdict_types::{Address, VoteType};

type HmacSha256 = Hmac<Sha256>;

const DOMAIN: &[u8] = b"verdict-vote";

/// Secret blinding value chosen by the validator at commit time.
pub type VoteNonce = [u8; 32];

fn keyed_mac(validator: &Address, vote: VoteType, nonce: &VoteNonce) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(validator.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(DOMAIN);
    mac.update(&[vote.as_byte()]);
    mac.update(nonce);
    mac
}

/// Compute the commitment a validator submits during the commit phase.
pub fn vote_commitment(validator: &Address, vote: VoteType, nonce: &VoteNonce) -> [u8; 32] {
    let mut output = [0u8; 32];
    output.copy_from_slice(&keyed_mac(validator, vote, nonce).finalize().into_bytes());
    output
}

/// Check a revealed `(vote, nonce)` against a commitment in constant time.
pub fn verify_vote_commitment(
    commitment: &[u8; 32],
    validator: &Address,
    vote: VoteType,
    nonce: &VoteNonce,
) -> bool {
    keyed_mac(validator, vote, nonce)
        .verify_slice(commitment)
        .is_ok()
}
