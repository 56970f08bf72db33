//! A single slot-addressed FIFO.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use verdict_types::TxHash;

/// Slot-addressed FIFO with a head cursor.
///
/// Entries behind the head stay in place after the head moves past them;
/// they are what a [`Sequence::rewind`] relabels.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
    slot_to_id: BTreeMap<u64, TxHash>,
    id_to_slot: BTreeMap<TxHash, u64>,
    head: u64,
    tail: u64,
}

impl Sequence {
    /// Append at the tail and return the assigned slot.
    pub fn push(&mut self, tx: TxHash) -> u64 {
        let slot = self.tail;
        self.slot_to_id.insert(slot, tx);
        self.id_to_slot.insert(tx, slot);
        self.tail += 1;
        slot
    }

    pub fn contains(&self, tx: &TxHash) -> bool {
        self.id_to_slot.contains_key(tx)
    }

    pub fn slot_of(&self, tx: &TxHash) -> Option<u64> {
        self.id_to_slot.get(tx).copied()
    }

    /// The oldest entry at or after the head cursor.
    pub fn head_id(&self) -> Option<TxHash> {
        self.slot_to_id.range(self.head..).next().map(|(_, tx)| *tx)
    }

    pub fn is_head(&self, tx: &TxHash) -> bool {
        self.head_id().as_ref() == Some(tx)
    }

    /// Move the cursor past the current head entry.
    pub fn advance_head(&mut self) {
        if let Some((&slot, _)) = self.slot_to_id.range(self.head..).next() {
            self.head = slot + 1;
        }
    }

    /// Remove an entry wherever it sits. Returns whether it was present.
    pub fn remove(&mut self, tx: &TxHash) -> bool {
        match self.id_to_slot.remove(tx) {
            Some(slot) => {
                self.slot_to_id.remove(&slot);
                true
            }
            None => false,
        }
    }

    /// Move the head back to `slot`, returning the entries strictly between
    /// `slot` and the old head in slot order.
    pub fn rewind(&mut self, slot: u64) -> Vec<TxHash> {
        if slot >= self.head {
            return Vec::new();
        }
        let intervening = self
            .slot_to_id
            .range(slot + 1..self.head)
            .map(|(_, tx)| *tx)
            .collect();
        self.head = slot;
        intervening
    }

    /// Whether `tx` sits at or ahead of the head cursor.
    pub fn is_ahead_of_head(&self, tx: &TxHash) -> bool {
        self.slot_of(tx).is_some_and(|slot| slot >= self.head)
    }

    pub fn head(&self) -> u64 {
        self.head
    }

    pub fn tail(&self) -> u64 {
        self.tail
    }

    pub fn len(&self) -> usize {
        self.slot_to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slot_to_id.is_empty()
    }

    /// Ids in slot order.
    pub fn ids(&self) -> impl Iterator<Item = &TxHash> {
        self.slot_to_id.values()
    }
}
