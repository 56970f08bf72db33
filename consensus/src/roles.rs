//! Who may call which operation.
//!
//! Every mutating operation names the [`Role`] its caller must hold.
//! [`authorize`] resolves that role against the transaction's current
//! state, so a leader rotation or a new round changes who passes without
//! any bookkeeping of its own.

use serde::{Deserialize, Serialize};
use verdict_types::Address;
use verdict_validators::ValidatorPool;

use crate::error::ConsensusError;
use crate::transaction::Transaction;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// The identity drawn from the transaction's genesis seed.
    Activator,
    /// The leader of the active round's current rotation.
    Leader,
    /// A member of the active round's committee.
    Validator,
    /// The sender that submitted the transaction.
    Submitter,
    /// Any staked, unbanned validator in the current snapshot.
    AnyValidator,
    /// No restriction.
    Anyone,
}

/// Caller-facing operations that change a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Activate,
    ProposeReceipt,
    CommitVote,
    RevealVote,
    Appeal,
    Finalize,
    Cancel,
}

impl Operation {
    pub fn required_role(self) -> Role {
        match self {
            Self::Activate => Role::Activator,
            Self::ProposeReceipt => Role::Leader,
            Self::CommitVote | Self::RevealVote => Role::Validator,
            Self::Appeal => Role::AnyValidator,
            Self::Finalize => Role::Anyone,
            Self::Cancel => Role::Submitter,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Activate => "activate",
            Self::ProposeReceipt => "propose_receipt",
            Self::CommitVote => "commit_vote",
            Self::RevealVote => "reveal_vote",
            Self::Appeal => "appeal",
            Self::Finalize => "finalize",
            Self::Cancel => "cancel",
        }
    }
}

/// Whether `caller` holds `role` for `tx` right now.
pub fn holds_role(tx: &Transaction, caller: &Address, role: Role, pool: &dyn ValidatorPool) -> bool {
    match role {
        Role::Activator => &tx.activator == caller,
        Role::Leader => tx.active_round().is_some_and(|r| r.leader() == caller),
        Role::Validator => tx
            .active_round()
            .is_some_and(|r| r.position(caller).is_some()),
        Role::Submitter => &tx.sender == caller,
        Role::AnyValidator => pool.is_validator(caller),
        Role::Anyone => true,
    }
}

/// Reject `caller` unless it holds the role `op` requires.
pub fn authorize(
    tx: &Transaction,
    caller: &Address,
    op: Operation,
    pool: &dyn ValidatorPool,
) -> Result<(), ConsensusError> {
    let role = op.required_role();
    if holds_role(tx, caller, role, pool) {
        Ok(())
    } else {
        Err(ConsensusError::NotAuthorized {
            caller: caller.to_string(),
            role,
        })
    }
}
