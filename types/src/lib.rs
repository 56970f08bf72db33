//! Fundamental types for the verdict consensus engine.
//!
//! This crate defines the vocabulary shared by every other crate in the
//! workspace: identities, transaction hashes, timestamps, key material,
//! engine parameters, and the status / vote / result enums that drive the
//! transaction state machine.

pub mod address;
pub mod hash;
pub mod keys;
pub mod params;
pub mod state;
pub mod time;

pub use address::Address;
pub use hash::TxHash;
pub use keys::{KeyPair, PrivateKey, PublicKey, Signature};
pub use params::EngineParams;
pub use state::{RoundResult, TransactionStatus, VoteType};
pub use time::Timestamp;
