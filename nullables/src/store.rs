//! Nullable store: thread-safe in-memory storage for testing.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use verdict_store::{ConsensusStore, KeySpace, StoreError, WriteBatch, WriteOp};

/// An in-memory [`ConsensusStore`].
///
/// `fail_next_commit` makes the next commit fail without applying anything,
/// for exercising the engine's all-or-nothing guarantee.
#[derive(Default)]
pub struct NullStore {
    spaces: Mutex<HashMap<KeySpace, BTreeMap<Vec<u8>, Vec<u8>>>>,
    fail_next: AtomicBool,
    commits: AtomicUsize,
}

impl NullStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `commit` return a backend error.
    pub fn fail_next_commit(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Number of successful commits so far.
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Number of entries in `space`.
    pub fn len(&self, space: KeySpace) -> usize {
        self.spaces
            .lock()
            .unwrap()
            .get(&space)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    /// A copy of every key space, for byte-for-byte comparisons.
    pub fn dump(&self) -> HashMap<KeySpace, BTreeMap<Vec<u8>, Vec<u8>>> {
        self.spaces.lock().unwrap().clone()
    }
}

impl ConsensusStore for NullStore {
    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Backend("injected commit failure".into()));
        }
        let mut spaces = self.spaces.lock().unwrap();
        for op in batch.into_ops() {
            match op {
                WriteOp::Put { space, key, value } => {
                    spaces.entry(space).or_default().insert(key, value);
                }
                WriteOp::Delete { space, key } => {
                    if let Some(table) = spaces.get_mut(&space) {
                        table.remove(&key);
                    }
                }
            }
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn get(&self, space: KeySpace, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .spaces
            .lock()
            .unwrap()
            .get(&space)
            .and_then(|table| table.get(key).cloned()))
    }

    fn iter(&self, space: KeySpace) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        Ok(self
            .spaces
            .lock()
            .unwrap()
            .get(&space)
            .map(|table| table.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_applies_batch() {
        let store = NullStore::new();
        let mut batch = WriteBatch::new();
        batch.put(KeySpace::Transactions, b"a".to_vec(), vec![1]);
        batch.put(KeySpace::Transactions, b"b".to_vec(), vec![2]);
        batch.delete(KeySpace::Transactions, b"a".to_vec());
        store.commit(batch).unwrap();

        assert_eq!(store.get(KeySpace::Transactions, b"a").unwrap(), None);
        assert_eq!(store.get(KeySpace::Transactions, b"b").unwrap(), Some(vec![2]));
        assert_eq!(store.len(KeySpace::Transactions), 1);
        assert_eq!(store.commit_count(), 1);
    }

    #[test]
    fn injected_failure_applies_nothing() {
        let store = NullStore::new();
        store.fail_next_commit();
        let mut batch = WriteBatch::new();
        batch.put(KeySpace::Meta, b"k".to_vec(), vec![1]);
        assert!(store.commit(batch.clone()).is_err());
        assert_eq!(store.len(KeySpace::Meta), 0);

        store.commit(batch).unwrap();
        assert_eq!(store.len(KeySpace::Meta), 1);
    }

    #[test]
    fn iter_is_key_ordered() {
        let store = NullStore::new();
        let mut batch = WriteBatch::new();
        batch.put(KeySpace::FeeBooks, b"z".to_vec(), vec![]);
        batch.put(KeySpace::FeeBooks, b"a".to_vec(), vec![]);
        store.commit(batch).unwrap();
        let keys: Vec<_> = store.iter(KeySpace::FeeBooks).unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"z".to_vec()]);
    }
}
