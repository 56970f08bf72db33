//! Verifiable randomness for validator and leader draws.
//!
//! Every transaction carries a 32-byte [`RandomSeed`]. Whoever advances the
//! transaction (the activator, then each proposing leader) signs the current
//! seed; the signature is the [`RandomnessProof`] and the next seed is its
//! Blake2b hash. Ed25519 signatures are deterministic, so the signer cannot
//! grind for a favourable draw, and anyone holding the previous seed can
//! check the step.
//!
//! Proof checking is behind [`ProofVerifier`] so hosts can substitute their
//! own scheme.

pub mod error;

pub use error::VrfError;

use serde::{Deserialize, Serialize};
use std::fmt;
use verdict_crypto::{blake2b_256, blake2b_256_multi, decode_address, sign_message, verify_signature};
use verdict_types::{Address, PrivateKey, PublicKey, Signature, TxHash};

/// Length of an Ed25519 proof.
pub const PROOF_LEN: usize = 64;

/// A link in a transaction's randomness chain.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RandomSeed(pub [u8; 32]);

impl RandomSeed {
    /// The seed a transaction starts with, bound to its identity.
    pub fn genesis(tx: &TxHash) -> Self {
        Self(blake2b_256_multi(&[b"verdict-seed", tx.as_bytes()]))
    }

    /// The next seed after a verified proof.
    pub fn next(proof: &RandomnessProof) -> Self {
        Self(blake2b_256(&proof.0))
    }

    /// Derive a seed for a leader rotation that carries no proof.
    pub fn rotation(&self, round: u32, rotation: u32) -> Self {
        Self(blake2b_256_multi(&[
            b"rotation",
            &self.0,
            &round.to_le_bytes(),
            &rotation.to_le_bytes(),
        ]))
    }

    /// Derive the seed that draws the committee of appeal round `round`.
    pub fn appeal(&self, round: u32) -> Self {
        Self(blake2b_256_multi(&[b"appeal", &self.0, &round.to_le_bytes()]))
    }

    /// The low 16 bytes as a little-endian integer, for modular draws.
    pub fn as_u128(&self) -> u128 {
        let mut buf = [0u8; 16];
        buf.copy_from_slice(&self.0[..16]);
        u128::from_le_bytes(buf)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for RandomSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RandomSeed({})", hex::encode(&self.0[..4]))
    }
}

/// A signature over the current seed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomnessProof(pub Vec<u8>);

/// Produce the proof that advances `seed`.
pub fn prove(private: &PrivateKey, seed: &RandomSeed) -> RandomnessProof {
    RandomnessProof(sign_message(&seed.0, private).to_vec())
}

/// Checks that a proof was produced by `signer` over `previous`.
pub trait ProofVerifier: Send + Sync {
    /// On success, returns the seed that follows `previous`.
    fn verify(
        &self,
        signer: &Address,
        previous: &RandomSeed,
        proof: &RandomnessProof,
    ) -> Result<RandomSeed, VrfError>;

    /// Human-readable name of this verifier.
    fn name(&self) -> &str;
}

/// Ed25519 verifier: the signer's address encodes its public key.
#[derive(Clone, Copy, Debug, Default)]
pub struct SignatureVerifier;

impl ProofVerifier for SignatureVerifier {
    fn verify(
        &self,
        signer: &Address,
        previous: &RandomSeed,
        proof: &RandomnessProof,
    ) -> Result<RandomSeed, VrfError> {
        let key = decode_address(signer.as_str())
            .ok_or_else(|| VrfError::UnknownSigner(signer.to_string()))?;
        let signature = Signature::from_slice(&proof.0).ok_or(VrfError::MalformedProof {
            expected: PROOF_LEN,
            actual: proof.0.len(),
        })?;
        if !verify_signature(&previous.0, &signature, &PublicKey(key)) {
            return Err(VrfError::InvalidProof);
        }
        Ok(RandomSeed::next(proof))
    }

    fn name(&self) -> &str {
        "ed25519"
    }
}
