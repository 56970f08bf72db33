//! The four-queue aggregate kept per target account.

use crate::error::QueueError;
use crate::sequence::Sequence;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use verdict_types::{Address, TxHash};

/// Pending, Accepted, Undetermined and Finalized queues for one recipient.
///
/// Finalization order is issuance order: every enqueue captures the current
/// issued count, and a transaction may finalize only when that number equals
/// the finalized count. Canceled issuances are retired so they never block
/// the ones issued after them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientQueueSet {
    recipient: Address,
    pending: Sequence,
    accepted: Sequence,
    undetermined: Sequence,
    finalized: Sequence,
    issued_count: u64,
    finalized_count: u64,
    issuance: BTreeMap<TxHash, u64>,
    retired: BTreeSet<u64>,
}

impl RecipientQueueSet {
    pub fn new(recipient: Address) -> Self {
        Self {
            recipient,
            pending: Sequence::default(),
            accepted: Sequence::default(),
            undetermined: Sequence::default(),
            finalized: Sequence::default(),
            issued_count: 0,
            finalized_count: 0,
            issuance: BTreeMap::new(),
            retired: BTreeSet::new(),
        }
    }

    pub fn recipient(&self) -> &Address {
        &self.recipient
    }

    /// Append a new transaction to Pending and record its issuance number.
    pub fn enqueue(&mut self, tx: TxHash) -> Result<u64, QueueError> {
        if self.issuance.contains_key(&tx) {
            return Err(QueueError::AlreadyQueued(tx.to_string()));
        }
        let issued = self.issued_count;
        self.issuance.insert(tx, issued);
        self.issued_count += 1;
        let slot = self.pending.push(tx);
        tracing::debug!(recipient = %self.recipient, tx = ?tx, slot, issued, "enqueued");
        Ok(slot)
    }

    pub fn is_pending_head(&self, tx: &TxHash) -> bool {
        self.pending.is_head(tx)
    }

    /// Move the head past `tx`, which must be the Pending head.
    pub fn activate(&mut self, tx: &TxHash) -> Result<(), QueueError> {
        self.require_pending_head(tx)?;
        self.pending.advance_head();
        Ok(())
    }

    /// Drop `tx`, which must be the Pending head, and retire its issuance.
    pub fn cancel(&mut self, tx: &TxHash) -> Result<(), QueueError> {
        self.require_pending_head(tx)?;
        self.pending.remove(tx);
        if let Some(issued) = self.issuance.remove(tx) {
            self.retired.insert(issued);
        }
        self.skip_retired();
        tracing::debug!(recipient = %self.recipient, tx = ?tx, "canceled from pending");
        Ok(())
    }

    pub fn mark_accepted(&mut self, tx: &TxHash) {
        self.undetermined.remove(tx);
        if !self.accepted.contains(tx) {
            self.accepted.push(*tx);
        }
    }

    pub fn mark_undetermined(&mut self, tx: &TxHash) {
        self.accepted.remove(tx);
        if !self.undetermined.contains(tx) {
            self.undetermined.push(*tx);
        }
    }

    /// Whether every transaction issued before `tx` has finalized or been canceled.
    pub fn is_finalization_head(&self, tx: &TxHash) -> bool {
        self.issuance.get(tx) == Some(&self.finalized_count)
    }

    pub fn finalize(&mut self, tx: &TxHash) -> Result<(), QueueError> {
        if !self.is_finalization_head(tx) {
            return Err(QueueError::NotAtHead {
                tx: tx.to_string(),
                queue: "finalization",
            });
        }
        self.pending.remove(tx);
        self.accepted.remove(tx);
        self.undetermined.remove(tx);
        self.finalized.push(*tx);
        self.finalized_count += 1;
        self.skip_retired();
        tracing::debug!(recipient = %self.recipient, tx = ?tx, "finalized");
        Ok(())
    }

    /// Reinsert `tx` into Pending after a successful appeal.
    ///
    /// The Pending head rewinds to `tx`'s slot and every entry between it
    /// and the old head is relabeled pending. Returns those entries in slot
    /// order; `tx` itself is not included.
    pub fn reopen(&mut self, tx: &TxHash) -> Result<Vec<TxHash>, QueueError> {
        let slot = self
            .pending
            .slot_of(tx)
            .ok_or_else(|| QueueError::NotQueued(tx.to_string()))?;
        let relabeled = self.pending.rewind(slot);
        for id in relabeled.iter().chain(std::iter::once(tx)) {
            self.accepted.remove(id);
            self.undetermined.remove(id);
        }
        tracing::debug!(
            recipient = %self.recipient,
            tx = ?tx,
            relabeled = relabeled.len(),
            "pending head rewound"
        );
        Ok(relabeled)
    }

    /// Whether `tx` is back in Pending at or ahead of the head, i.e. it was
    /// reopened and has not been activated again.
    pub fn is_reopened(&self, tx: &TxHash) -> bool {
        self.pending.is_ahead_of_head(tx)
    }

    pub fn pending(&self) -> &Sequence {
        &self.pending
    }

    pub fn accepted(&self) -> &Sequence {
        &self.accepted
    }

    pub fn undetermined(&self) -> &Sequence {
        &self.undetermined
    }

    pub fn finalized(&self) -> &Sequence {
        &self.finalized
    }

    pub fn issued_count(&self) -> u64 {
        self.issued_count
    }

    pub fn finalized_count(&self) -> u64 {
        self.finalized_count
    }

    fn require_pending_head(&self, tx: &TxHash) -> Result<(), QueueError> {
        if !self.pending.contains(tx) {
            return Err(QueueError::NotQueued(tx.to_string()));
        }
        if !self.pending.is_head(tx) {
            return Err(QueueError::NotAtHead {
                tx: tx.to_string(),
                queue: "pending",
            });
        }
        Ok(())
    }

    fn skip_retired(&mut self) {
        while self.retired.remove(&self.finalized_count) {
            self.finalized_count += 1;
        }
    }
}
