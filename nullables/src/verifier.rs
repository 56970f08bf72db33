//! Nullable proof verifier: deterministic randomness for testing.

use std::sync::atomic::{AtomicBool, Ordering};
use verdict_types::Address;
use verdict_vrf::{ProofVerifier, RandomSeed, RandomnessProof, VrfError};

/// Accepts any proof from any signer (until told to reject).
///
/// The next seed is still derived from the proof bytes, so tests control
/// validator draws by choosing the proof.
#[derive(Debug, Default)]
pub struct NullVerifier {
    reject: AtomicBool,
}

impl NullVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A verifier that rejects every proof.
    pub fn rejecting() -> Self {
        Self {
            reject: AtomicBool::new(true),
        }
    }

    pub fn set_rejecting(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }
}

impl ProofVerifier for NullVerifier {
    fn verify(
        &self,
        _signer: &Address,
        _previous: &RandomSeed,
        proof: &RandomnessProof,
    ) -> Result<RandomSeed, VrfError> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(VrfError::InvalidProof);
        }
        Ok(RandomSeed::next(proof))
    }

    fn name(&self) -> &str {
        "null-verifier"
    }
}
