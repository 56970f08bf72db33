//! Fee Ledger.
//!
//! Each transaction has a [`FeeBook`] holding its deposits and one
//! [`RoundFeeRecord`] per round and rotation. Records are tagged with a
//! [`RoundFeeType`] when the round starts and when the leader proposes,
//! then retagged as later rounds resolve: an appeal's outcome decides the
//! round it challenged, and a re-vote can in turn overturn the appeal.
//! Settlement walks every record once and pays by type.

pub mod book;
pub mod error;
pub mod record;

pub use book::{AppealOutcome, Deposit, FeeBook};
pub use error::FeeError;
pub use record::{
    FeeDistribution, FeeSchedule, Payout, PayoutReason, RoundFeeRecord, RoundFeeType, RoundFees,
};

use std::collections::HashMap;
use verdict_types::{Address, TxHash};

/// Fee books for every live transaction.
#[derive(Debug, Default)]
pub struct FeeLedger {
    books: HashMap<TxHash, FeeBook>,
}

impl FeeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a book for a new transaction, checking the opening deposit
    /// against the required minimum.
    pub fn open_book(
        tx: TxHash,
        submitter: &Address,
        amount: u128,
        required: u128,
    ) -> Result<FeeBook, FeeError> {
        if amount < required {
            return Err(FeeError::InsufficientFees {
                required,
                provided: amount,
            });
        }
        Ok(FeeBook::new(tx, submitter.clone(), amount))
    }

    pub fn get(&self, tx: &TxHash) -> Option<&FeeBook> {
        self.books.get(tx)
    }

    /// A working copy of `tx`'s book.
    pub fn staged(&self, tx: &TxHash) -> Result<FeeBook, FeeError> {
        self.books
            .get(tx)
            .cloned()
            .ok_or_else(|| FeeError::UnknownTransaction(tx.to_string()))
    }

    pub fn install(&mut self, book: FeeBook) {
        self.books.insert(*book.tx(), book);
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_book_enforces_minimum() {
        let tx = TxHash::new([1u8; 32]);
        let who = Address::new("vrd_sender");
        assert_eq!(
            FeeLedger::open_book(tx, &who, 10, 11),
            Err(FeeError::InsufficientFees {
                required: 11,
                provided: 10
            })
        );
        let book = FeeLedger::open_book(tx, &who, 11, 11).unwrap();
        assert_eq!(book.balance(), 11);
    }

    #[test]
    fn staged_requires_existing_book() {
        let mut ledger = FeeLedger::new();
        let tx = TxHash::new([2u8; 32]);
        assert!(matches!(ledger.staged(&tx), Err(FeeError::UnknownTransaction(_))));
        ledger.install(FeeBook::new(tx, Address::new("vrd_s"), 5));
        assert_eq!(ledger.staged(&tx).unwrap().balance(), 5);
    }
}
