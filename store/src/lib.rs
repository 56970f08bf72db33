//! Abstract persistence for the verdict engine.
//!
//! The engine keeps its working state in memory and persists every
//! successful operation as one [`WriteBatch`]. Backends implement
//! [`ConsensusStore`]; the rest of the workspace depends only on the trait.
//! Values are bincode-encoded records; keys are raw ids.

pub mod batch;
pub mod error;
pub mod meta;

pub use batch::{KeySpace, WriteBatch, WriteOp};
pub use error::StoreError;
pub use meta::{check_schema_version, stage_schema_version, SCHEMA_VERSION};

use serde::de::DeserializeOwned;
use verdict_types::{Address, TxHash};

/// Byte-oriented store with atomic batches.
pub trait ConsensusStore: Send + Sync {
    /// Apply every op in `batch`, or none of them.
    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;

    fn get(&self, space: KeySpace, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Every entry in `space`, in key order.
    fn iter(&self, space: KeySpace) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError>;
}

pub fn tx_key(tx: &TxHash) -> Vec<u8> {
    tx.as_bytes().to_vec()
}

pub fn recipient_key(recipient: &Address) -> Vec<u8> {
    recipient.as_bytes().to_vec()
}

/// Decode a bincode value read from a store.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    Ok(bincode::deserialize(bytes)?)
}

/// Decode every value in `space`.
pub fn load_all<T: DeserializeOwned>(
    store: &dyn ConsensusStore,
    space: KeySpace,
) -> Result<Vec<T>, StoreError> {
    store
        .iter(space)?
        .iter()
        .map(|(_, value)| decode(value))
        .collect()
}
