use thiserror::Error;
use verdict_fees::FeeError;
use verdict_queues::QueueError;
use verdict_store::StoreError;
use verdict_types::{Timestamp, TransactionStatus};
use verdict_validators::PoolError;
use verdict_vrf::VrfError;

use crate::roles::Role;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConsensusError {
    #[error("transaction {0} not found")]
    TransactionNotFound(String),

    #[error("{operation} is not allowed while the transaction is {status:?}")]
    InvalidStateTransition {
        operation: &'static str,
        status: TransactionStatus,
    },

    #[error("{caller} does not hold the {role:?} role")]
    NotAuthorized { caller: String, role: Role },

    #[error("validator {0} already committed a vote this round")]
    AlreadyVoted(String),

    #[error("validator {0} already revealed its vote this round")]
    VoteAlreadyRevealed(String),

    #[error("vote reveal by {0} does not match its commitment")]
    InvalidVoteProof(String),

    #[error("queue ordering violated: {0}")]
    QueueOrderingViolation(String),

    #[error("no validators available")]
    NoValidatorsAvailable,

    #[error("validator pool exhausted: {requested} requested, {available} available")]
    AllValidatorsConsumed { requested: usize, available: usize },

    #[error("insufficient appeal bond: needed {required}, provided {provided}")]
    InsufficientBond { required: u128, provided: u128 },

    #[error("insufficient fees: needed {required}, provided {provided}")]
    InsufficientFees { required: u128, provided: u128 },

    #[error("invalid randomness proof: {0}")]
    InvalidRandomnessProof(#[from] VrfError),

    #[error("deadline {deadline} not reached")]
    DeadlineNotReached { deadline: Timestamp },

    #[error("appeal window closed for transaction {0}")]
    AppealWindowClosed(String),

    #[error("validator pool error: {0}")]
    Pool(String),

    #[error("queue error: {0}")]
    Queue(String),

    #[error("fee ledger error: {0}")]
    Fees(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<PoolError> for ConsensusError {
    fn from(e: PoolError) -> Self {
        match e {
            PoolError::NoValidatorsAvailable => Self::NoValidatorsAvailable,
            PoolError::AllValidatorsConsumed {
                requested,
                available,
            } => Self::AllValidatorsConsumed {
                requested,
                available,
            },
            other => Self::Pool(other.to_string()),
        }
    }
}

impl From<QueueError> for ConsensusError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::NotAtHead { .. } => Self::QueueOrderingViolation(e.to_string()),
            other => Self::Queue(other.to_string()),
        }
    }
}

impl From<FeeError> for ConsensusError {
    fn from(e: FeeError) -> Self {
        match e {
            FeeError::InsufficientFees { required, provided } => {
                Self::InsufficientFees { required, provided }
            }
            FeeError::InsufficientBond { required, provided } => {
                Self::InsufficientBond { required, provided }
            }
            other => Self::Fees(other.to_string()),
        }
    }
}

impl From<bincode::Error> for ConsensusError {
    fn from(e: bincode::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
