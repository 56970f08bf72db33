//! Status, vote, and round-result enums.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a transaction.
///
/// ```text
/// Pending → Proposing → Committing → Revealing → {Accepted | Undetermined} → Finalized
///    │          ↺ (leader rotation)        │
///    └→ Canceled                           └→ Proposing (rotation after a failed vote)
/// {Accepted | Undetermined} → AppealCommitting → AppealRevealing
///                                   → {Accepted | Undetermined}  (appeal unsuccessful)
///                                   → Pending                    (appeal successful)
/// ```
///
/// Any activated, non-terminal status may also be relabeled `Pending` by a
/// recomputation cascade.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionStatus {
    Pending,
    Proposing,
    Committing,
    Revealing,
    Accepted,
    Undetermined,
    Finalized,
    Canceled,
    AppealCommitting,
    AppealRevealing,
}

impl TransactionStatus {
    /// `Finalized` and `Canceled` accept no further operations.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finalized | Self::Canceled)
    }

    /// The transaction has left `Pending` and not yet reached a terminal status.
    pub fn is_activated(self) -> bool {
        !self.is_terminal() && self != Self::Pending
    }

    /// Whether this status is an appeal phase.
    pub fn is_appeal(self) -> bool {
        matches!(self, Self::AppealCommitting | Self::AppealRevealing)
    }

    /// The declared transition graph. Self-loops are the in-phase signals
    /// emitted by non-final votes and leader rotation.
    pub fn can_transition_to(self, next: Self) -> bool {
        use TransactionStatus::*;
        if next == Pending && self.is_activated() {
            return true;
        }
        matches!(
            (self, next),
            (Pending, Proposing)
                | (Pending, Canceled)
                | (Proposing, Proposing)
                | (Proposing, Committing)
                | (Proposing, Undetermined)
                | (Committing, Committing)
                | (Committing, Revealing)
                | (Revealing, Revealing)
                | (Revealing, Accepted)
                | (Revealing, Undetermined)
                | (Revealing, Proposing)
                | (Accepted, AppealCommitting)
                | (Accepted, Finalized)
                | (Undetermined, AppealCommitting)
                | (Undetermined, Finalized)
                | (AppealCommitting, AppealCommitting)
                | (AppealCommitting, AppealRevealing)
                | (AppealRevealing, AppealRevealing)
                | (AppealRevealing, Accepted)
                | (AppealRevealing, Undetermined)
        )
    }
}

/// A validator's vote on the leader's receipt.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VoteType {
    #[default]
    NotVoted,
    Agree,
    Disagree,
    /// The validator's own execution timed out.
    Timeout,
    /// The receipt broke determinism (e.g. differing outputs for the same input).
    DeterministicViolation,
}

impl VoteType {
    /// Stable one-byte encoding used inside vote commitments.
    pub fn as_byte(self) -> u8 {
        match self {
            Self::NotVoted => 0,
            Self::Agree => 1,
            Self::Disagree => 2,
            Self::Timeout => 3,
            Self::DeterministicViolation => 4,
        }
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::NotVoted),
            1 => Some(Self::Agree),
            2 => Some(Self::Disagree),
            3 => Some(Self::Timeout),
            4 => Some(Self::DeterministicViolation),
            _ => None,
        }
    }
}

/// The classified outcome of a round's revealed votes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoundResult {
    /// Not yet classified.
    #[default]
    Idle,
    Agree,
    Disagree,
    Timeout,
    DeterministicViolation,
    NoMajority,
    /// Every validator agreed.
    MajorityAgree,
    /// Every validator disagreed.
    MajorityDisagree,
}

impl RoundResult {
    /// The vote direction this result stands for. Unanimous and simple
    /// majorities share a polarity; `Idle` and `NoMajority` have none.
    pub fn polarity(self) -> Option<VoteType> {
        match self {
            Self::Agree | Self::MajorityAgree => Some(VoteType::Agree),
            Self::Disagree | Self::MajorityDisagree => Some(VoteType::Disagree),
            Self::Timeout => Some(VoteType::Timeout),
            Self::DeterministicViolation => Some(VoteType::DeterministicViolation),
            Self::Idle | Self::NoMajority => None,
        }
    }

    /// Two results are equivalent when they share a polarity.
    pub fn is_equivalent(self, other: RoundResult) -> bool {
        match (self.polarity(), other.polarity()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Whether this result accepts the leader's receipt.
    pub fn is_accepting(self) -> bool {
        self.polarity() == Some(VoteType::Agree)
    }

    /// Whether a validator who voted `vote` sided with this result.
    pub fn aligns_with(self, vote: VoteType) -> bool {
        vote != VoteType::NotVoted && self.polarity() == Some(vote)
    }
}
