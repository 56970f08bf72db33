//! Signals emitted by the coordinator after each committed operation.

use serde::{Deserialize, Serialize};
use verdict_fees::FeeDistribution;
use verdict_messages::MessagePhase;
use verdict_types::{Address, TransactionStatus, TxHash};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineEvent {
    /// A transaction moved (or stayed, for in-phase progress) to `status`.
    /// `previous` is `None` for a new submission.
    StatusChanged {
        tx: TxHash,
        previous: Option<TransactionStatus>,
        status: TransactionStatus,
    },
    LeaderRotated {
        tx: TxHash,
        round: u32,
        previous: Address,
        leader: Address,
        rotations_left: u32,
    },
    /// A successful appeal invalidated transactions that ran on top of
    /// `tx`'s result; they return to `Pending` and must be re-run.
    RecomputationRequired { tx: TxHash, invalidated: Vec<TxHash> },
    MessagesDispatched {
        tx: TxHash,
        phase: MessagePhase,
        internal: usize,
        external: usize,
    },
    FeesDeposited {
        tx: TxHash,
        depositor: Address,
        amount: u128,
    },
    FeesDistributed {
        tx: TxHash,
        distribution: FeeDistribution,
    },
}

impl EngineEvent {
    pub fn tx(&self) -> &TxHash {
        match self {
            Self::StatusChanged { tx, .. }
            | Self::LeaderRotated { tx, .. }
            | Self::RecomputationRequired { tx, .. }
            | Self::MessagesDispatched { tx, .. }
            | Self::FeesDeposited { tx, .. }
            | Self::FeesDistributed { tx, .. } => tx,
        }
    }
}
