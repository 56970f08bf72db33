//! Queue Manager.
//!
//! Every target account owns a [`RecipientQueueSet`]: four slot-addressed
//! FIFOs (Pending, Accepted, Undetermined, Finalized) plus issuance counters.
//! Only the Pending head may be activated or canceled, and only the oldest
//! unfinalized issuance may finalize. A successful appeal rewinds the
//! Pending head and reports every later entry it relabels.

pub mod error;
pub mod recipient;
pub mod sequence;

pub use error::QueueError;
pub use recipient::RecipientQueueSet;
pub use sequence::Sequence;

use std::collections::HashMap;
use verdict_types::Address;

/// All recipient queue sets, keyed by target account.
#[derive(Debug, Default)]
pub struct QueueManager {
    sets: HashMap<Address, RecipientQueueSet>,
}

impl QueueManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, recipient: &Address) -> Option<&RecipientQueueSet> {
        self.sets.get(recipient)
    }

    /// A working copy of `recipient`'s queue set (fresh if none exists).
    /// Changes take effect only once passed to [`QueueManager::install`].
    pub fn staged(&self, recipient: &Address) -> RecipientQueueSet {
        self.sets
            .get(recipient)
            .cloned()
            .unwrap_or_else(|| RecipientQueueSet::new(recipient.clone()))
    }

    /// Replace the stored queue set for its recipient.
    pub fn install(&mut self, set: RecipientQueueSet) {
        self.sets.insert(set.recipient().clone(), set);
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RecipientQueueSet> {
        self.sets.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verdict_types::TxHash;

    #[test]
    fn staged_changes_are_invisible_until_installed() {
        let mut qm = QueueManager::new();
        let recipient = Address::new("vrd_contract");
        let mut staged = qm.staged(&recipient);
        staged.enqueue(TxHash::new([1u8; 32])).unwrap();
        assert!(qm.get(&recipient).is_none());

        qm.install(staged);
        assert_eq!(qm.get(&recipient).map(|q| q.issued_count()), Some(1));
    }
}
