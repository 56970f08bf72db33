//! Ed25519 key derivation.
//!
//! Keys are always derived from a caller-supplied 32-byte seed; the engine
//! itself never needs fresh entropy.

use ed25519_dalek::SigningKey;
use verdict_types::{KeyPair, PrivateKey, PublicKey};

/// Derive a key pair deterministically from a 32-byte seed.
pub fn keypair_from_seed(seed: &[u8; 32]) -> KeyPair {
    let signing_key = SigningKey::from_bytes(seed);
    KeyPair {
        public: PublicKey(signing_key.verifying_key().to_bytes()),
        private: PrivateKey(signing_key.to_bytes()),
    }
}

/// Derive the public key from a private key.
pub fn public_from_private(private: &PrivateKey) -> PublicKey {
    let signing_key = SigningKey::from_bytes(&private.0);
    PublicKey(signing_key.verifying_key().to_bytes())
}
