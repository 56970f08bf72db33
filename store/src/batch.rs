//! Atomic write batches.

use crate::StoreError;
use serde::Serialize;

/// Logical tables the engine writes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeySpace {
    /// Transaction id → encoded transaction.
    Transactions,
    /// Recipient address → encoded queue set.
    QueueSets,
    /// Transaction id → encoded fee book.
    FeeBooks,
    /// Sender address → next submission nonce.
    SenderNonces,
    /// Bookkeeping (schema version, counters).
    Meta,
}

impl KeySpace {
    pub const ALL: [KeySpace; 5] = [
        KeySpace::Transactions,
        KeySpace::QueueSets,
        KeySpace::FeeBooks,
        KeySpace::SenderNonces,
        KeySpace::Meta,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Transactions => "transactions",
            Self::QueueSets => "queue_sets",
            Self::FeeBooks => "fee_books",
            Self::SenderNonces => "sender_nonces",
            Self::Meta => "meta",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteOp {
    Put {
        space: KeySpace,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Delete {
        space: KeySpace,
        key: Vec<u8>,
    },
}

/// Writes applied all together or not at all.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, space: KeySpace, key: impl Into<Vec<u8>>, value: Vec<u8>) {
        self.ops.push(WriteOp::Put {
            space,
            key: key.into(),
            value,
        });
    }

    /// Encode `value` with bincode and stage it.
    pub fn put_encoded<T: Serialize>(
        &mut self,
        space: KeySpace,
        key: impl Into<Vec<u8>>,
        value: &T,
    ) -> Result<(), StoreError> {
        let bytes = bincode::serialize(value)?;
        self.put(space, key, bytes);
        Ok(())
    }

    pub fn delete(&mut self, space: KeySpace, key: impl Into<Vec<u8>>) {
        self.ops.push(WriteOp::Delete {
            space,
            key: key.into(),
        });
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_preserves_order() {
        let mut batch = WriteBatch::new();
        batch.put(KeySpace::Meta, b"a".to_vec(), vec![1]);
        batch.delete(KeySpace::Meta, b"a".to_vec());
        assert_eq!(batch.len(), 2);
        assert!(matches!(batch.ops()[1], WriteOp::Delete { .. }));
    }

    #[test]
    fn put_encoded_uses_bincode() {
        let mut batch = WriteBatch::new();
        batch.put_encoded(KeySpace::Meta, b"n".to_vec(), &7u32).unwrap();
        match &batch.ops()[0] {
            WriteOp::Put { value, .. } => assert_eq!(value, &7u32.to_le_bytes().to_vec()),
            other => panic!("unexpected op {other:?}"),
        }
    }
}
