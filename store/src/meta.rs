//! Schema version bookkeeping in the meta key space.

use crate::{ConsensusStore, KeySpace, StoreError, WriteBatch};

/// Version of the on-disk record layout.
pub const SCHEMA_VERSION: u32 = 1;

const SCHEMA_KEY: &[u8] = b"schema_version";

/// Stage the current schema version into `batch`.
pub fn stage_schema_version(batch: &mut WriteBatch) {
    batch.put(KeySpace::Meta, SCHEMA_KEY, SCHEMA_VERSION.to_le_bytes().to_vec());
}

/// Check the stored schema version. An empty store is accepted.
pub fn check_schema_version(store: &dyn ConsensusStore) -> Result<(), StoreError> {
    let Some(raw) = store.get(KeySpace::Meta, SCHEMA_KEY)? else {
        return Ok(());
    };
    let bytes: [u8; 4] = raw
        .as_slice()
        .try_into()
        .map_err(|_| StoreError::Corruption("schema version is not 4 bytes".into()))?;
    let found = u32::from_le_bytes(bytes);
    if found != SCHEMA_VERSION {
        return Err(StoreError::SchemaVersion {
            found,
            expected: SCHEMA_VERSION,
        });
    }
    Ok(())
}
