//! The transaction record and its rounds.

use serde::{Deserialize, Serialize};
use verdict_fees::AppealOutcome;
use verdict_messages::DownstreamMessage;
use verdict_types::{Address, RoundResult, Timestamp, TransactionStatus, TxHash, VoteType};
use verdict_vrf::RandomSeed;

/// One round of validation. Even indices are normal rounds with a leader;
/// odd indices are appeals of the last normal round before them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundRecord {
    pub index: u32,
    pub validators: Vec<Address>,
    pub leader_index: usize,
    /// Vote commitment per validator position.
    pub commits: Vec<Option<[u8; 32]>>,
    /// Revealed vote per validator position; `NotVoted` until revealed.
    pub votes: Vec<VoteType>,
    pub votes_committed: usize,
    pub votes_revealed: usize,
    /// Rotations performed so far in this round.
    pub rotation: u32,
    pub rotations_left: u32,
    pub result: RoundResult,
}

impl RoundRecord {
    pub fn new(index: u32, validators: Vec<Address>, leader_index: usize, rotations_left: u32) -> Self {
        let n = validators.len();
        Self {
            index,
            validators,
            leader_index,
            commits: vec![None; n],
            votes: vec![VoteType::NotVoted; n],
            votes_committed: 0,
            votes_revealed: 0,
            rotation: 0,
            rotations_left,
            result: RoundResult::Idle,
        }
    }

    pub fn is_appeal(&self) -> bool {
        self.index % 2 == 1
    }

    pub fn leader(&self) -> &Address {
        &self.validators[self.leader_index]
    }

    pub fn position(&self, validator: &Address) -> Option<usize> {
        self.validators.iter().position(|v| v == validator)
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Clear every vote, for a fresh rotation or committee.
    pub fn reset_votes(&mut self) {
        let n = self.validators.len();
        self.commits = vec![None; n];
        self.votes = vec![VoteType::NotVoted; n];
        self.votes_committed = 0;
        self.votes_revealed = 0;
        self.result = RoundResult::Idle;
    }
}

/// An appeal against a decided normal round.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appeal {
    /// Index of the appeal round (always odd).
    pub round: u32,
    pub challenged_round: u32,
    pub appellant: Address,
    pub bond: u128,
    /// Status the transaction returns to if the appeal fails.
    pub prior_status: TransactionStatus,
    pub outcome: Option<AppealOutcome>,
}

/// How the next activation starts its round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NextRound {
    /// Round 0 from a fresh committee.
    Initial,
    /// After a successful appeal: both committees merged, old leader out.
    Continuity { index: u32 },
    /// After a cascade: a fresh committee of `size` at `index`.
    Rerun { index: u32, size: usize },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TxHash,
    pub sender: Address,
    pub recipient: Address,
    /// The recipient was derived for this transaction rather than named.
    pub creates_account: bool,
    pub activator: Address,
    pub status: TransactionStatus,
    pub payload: Vec<u8>,
    pub validator_count: u32,
    pub max_rotations: u32,
    pub seed: RandomSeed,
    pub rounds: Vec<RoundRecord>,
    /// Every validator ever drawn for this transaction.
    pub consumed: Vec<Address>,
    pub appeals: Vec<Appeal>,
    pub receipt: Option<Vec<u8>>,
    pub messages: Vec<DownstreamMessage>,
    pub next_round: NextRound,
    /// Transaction whose message spawned this one.
    pub origin: Option<TxHash>,
    /// Start of the current phase; deadlines run from here.
    pub phase_started: Timestamp,
    /// When the last round or appeal resolved; opens the grace window.
    pub last_vote: Option<Timestamp>,
    /// Every status change with the time it happened.
    pub history: Vec<(TransactionStatus, Timestamp)>,
}

impl Transaction {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: TxHash,
        sender: Address,
        recipient: Address,
        creates_account: bool,
        activator: Address,
        validator_count: u32,
        max_rotations: u32,
        payload: Vec<u8>,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            sender,
            recipient,
            creates_account,
            activator,
            status: TransactionStatus::Pending,
            payload,
            validator_count,
            max_rotations,
            seed: RandomSeed::genesis(&id),
            rounds: Vec::new(),
            consumed: Vec::new(),
            appeals: Vec::new(),
            receipt: None,
            messages: Vec::new(),
            next_round: NextRound::Initial,
            origin: None,
            phase_started: now,
            last_vote: None,
            history: vec![(TransactionStatus::Pending, now)],
        }
    }

    /// The round votes currently go to: the last one.
    pub fn active_round(&self) -> Option<&RoundRecord> {
        self.rounds.last()
    }

    pub fn active_round_mut(&mut self) -> Option<&mut RoundRecord> {
        self.rounds.last_mut()
    }

    /// The active round, which an activated transaction always has.
    pub(crate) fn expect_round(&self) -> &RoundRecord {
        match self.rounds.last() {
            Some(round) => round,
            None => broken(&self.id, "activated transaction has no round"),
        }
    }

    pub(crate) fn expect_round_mut(&mut self) -> &mut RoundRecord {
        let id = self.id;
        match self.rounds.last_mut() {
            Some(round) => round,
            None => broken(&id, "activated transaction has no round"),
        }
    }

    pub fn round(&self, index: u32) -> Option<&RoundRecord> {
        self.rounds.iter().find(|r| r.index == index)
    }

    /// The most recent normal (even) round.
    pub fn last_normal_round(&self) -> Option<&RoundRecord> {
        self.rounds.iter().rev().find(|r| !r.is_appeal())
    }

    pub fn open_appeal(&self) -> Option<&Appeal> {
        self.appeals.last().filter(|a| a.outcome.is_none())
    }

    pub(crate) fn open_appeal_mut(&mut self) -> Option<&mut Appeal> {
        self.appeals.last_mut().filter(|a| a.outcome.is_none())
    }

    /// Move to `next`, returning the previous status. Leaving a status
    /// restarts the phase clock and appends to the history.
    pub fn transition(&mut self, next: TransactionStatus, now: Timestamp) -> TransactionStatus {
        let previous = self.status;
        if !previous.can_transition_to(next) {
            broken(
                &self.id,
                &format!("illegal transition {previous:?} -> {next:?}"),
            );
        }
        self.status = next;
        if previous != next {
            self.phase_started = now;
            self.history.push((next, now));
        }
        previous
    }

    /// When the acceptance grace window closes, if it has opened.
    pub fn finality_deadline(&self, window_secs: u64) -> Option<Timestamp> {
        self.last_vote.map(|t| t.plus(window_secs))
    }
}

/// A broken internal invariant. The engine cannot continue safely.
pub(crate) fn broken(tx: &TxHash, what: &str) -> ! {
    tracing::error!(tx = %tx, what, "transaction invariant violated");
    panic!("transaction {tx} invariant violated: {what}");
}
