//! Transaction coordinator.
//!
//! The coordinator owns every transaction record, the per-recipient queue
//! sets and the fee books, and is the only entry point that changes them.
//! Each operation works on staged copies: it clones what it needs,
//! validates and mutates the copies, encodes them into one
//! [`WriteBatch`], commits the batch, and only then swaps the copies into
//! memory. A rejected operation or a failed commit leaves both memory and
//! storage exactly as they were.
//!
//! The engine never reads a clock. Deadlines are checked against the `now`
//! each call supplies, and timeouts only take effect through
//! [`Coordinator::check_timeout`].

use std::collections::HashMap;
use std::sync::Arc;

use verdict_crypto::{derive_account_address, transaction_id, VoteNonce};
use verdict_fees::{AppealOutcome, FeeBook, FeeLedger, FeeSchedule};
use verdict_messages::{for_phase, DownstreamMessage, MessageDispatcher, MessageKind, MessagePhase};
use verdict_queues::{QueueManager, RecipientQueueSet};
use verdict_store::{
    check_schema_version, load_all, recipient_key, stage_schema_version, tx_key, ConsensusStore,
    KeySpace, WriteBatch,
};
use verdict_types::{Address, EngineParams, Timestamp, TransactionStatus, TxHash, VoteType};
use verdict_utils::{StatsCounter, StatsSnapshot};
use verdict_validators::ValidatorPool;
use verdict_vrf::{ProofVerifier, RandomSeed, RandomnessProof};

use crate::appeals::{open_appeal, reconcile, required_bond};
use crate::error::ConsensusError;
use crate::events::EngineEvent;
use crate::roles::{authorize, Operation};
use crate::rounds::{close_round, commit, reveal, rotate_leader, start_continuity_round, start_round};
use crate::transaction::{broken, NextRound, Transaction};

use TransactionStatus::*;

const STATS: &[&str] = &[
    "submit",
    "deposit",
    "activate",
    "propose",
    "commit_vote",
    "reveal_vote",
    "appeal",
    "finalize",
    "cancel",
    "timeout",
    "rejected",
    "rotations",
    "accepted",
    "undetermined",
    "appeals_successful",
    "appeals_unsuccessful",
    "recomputations",
    "messages_internal",
    "messages_external",
    "messages_failed",
];

/// A request to run a payload against a recipient.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Submission {
    pub sender: Address,
    /// `None` creates a managed account derived from the sender.
    pub recipient: Option<Address>,
    /// Round-0 committee size; zero uses the configured default.
    pub validator_count: u32,
    pub max_rotations: u32,
    pub payload: Vec<u8>,
    pub fee_deposit: u128,
}

/// Everything one operation changes, committed together.
#[derive(Default)]
struct Changes {
    transactions: Vec<Transaction>,
    queues: Vec<RecipientQueueSet>,
    books: Vec<FeeBook>,
    nonces: Vec<(Address, u64)>,
    events: Vec<EngineEvent>,
    /// Stats bumped only once the batch is committed.
    counters: Vec<&'static str>,
}

impl Changes {
    fn tx(tx: Transaction, events: Vec<EngineEvent>) -> Self {
        Self {
            transactions: vec![tx],
            events,
            ..Self::default()
        }
    }
}

pub struct Coordinator<P: ValidatorPool> {
    params: EngineParams,
    pool: P,
    store: Arc<dyn ConsensusStore>,
    verifier: Arc<dyn ProofVerifier>,
    dispatcher: Arc<dyn MessageDispatcher>,
    transactions: HashMap<TxHash, Transaction>,
    queues: QueueManager,
    fees: FeeLedger,
    nonces: HashMap<Address, u64>,
    events: Vec<EngineEvent>,
    stats: StatsCounter,
}

impl<P: ValidatorPool> Coordinator<P> {
    pub fn new(
        params: EngineParams,
        pool: P,
        store: Arc<dyn ConsensusStore>,
        verifier: Arc<dyn ProofVerifier>,
        dispatcher: Arc<dyn MessageDispatcher>,
    ) -> Self {
        Self {
            params,
            pool,
            store,
            verifier,
            dispatcher,
            transactions: HashMap::new(),
            queues: QueueManager::new(),
            fees: FeeLedger::new(),
            nonces: HashMap::new(),
            events: Vec::new(),
            stats: StatsCounter::new(STATS),
        }
    }

    /// Rebuild an engine from everything `store` holds.
    pub fn restore(
        params: EngineParams,
        pool: P,
        store: Arc<dyn ConsensusStore>,
        verifier: Arc<dyn ProofVerifier>,
        dispatcher: Arc<dyn MessageDispatcher>,
    ) -> Result<Self, ConsensusError> {
        check_schema_version(store.as_ref())?;
        let transactions: Vec<Transaction> = load_all(store.as_ref(), KeySpace::Transactions)?;
        let queues: Vec<RecipientQueueSet> = load_all(store.as_ref(), KeySpace::QueueSets)?;
        let books: Vec<FeeBook> = load_all(store.as_ref(), KeySpace::FeeBooks)?;
        let nonces: Vec<(Address, u64)> = load_all(store.as_ref(), KeySpace::SenderNonces)?;

        let mut engine = Self::new(params, pool, store, verifier, dispatcher);
        tracing::info!(
            transactions = transactions.len(),
            recipients = queues.len(),
            "engine state restored"
        );
        engine.transactions = transactions.into_iter().map(|tx| (tx.id, tx)).collect();
        for set in queues {
            engine.queues.install(set);
        }
        for book in books {
            engine.fees.install(book);
        }
        engine.nonces = nonces.into_iter().collect();
        Ok(engine)
    }

    // ── Accessors ────────────────────────────────────────────────────────

    pub fn params(&self) -> &EngineParams {
        &self.params
    }

    pub fn pool(&self) -> &P {
        &self.pool
    }

    /// Stake changes made here reach sampling at the next finalization.
    pub fn pool_mut(&mut self) -> &mut P {
        &mut self.pool
    }

    pub fn transaction(&self, id: &TxHash) -> Option<&Transaction> {
        self.transactions.get(id)
    }

    pub fn queue(&self, recipient: &Address) -> Option<&RecipientQueueSet> {
        self.queues.get(recipient)
    }

    pub fn fee_book(&self, id: &TxHash) -> Option<&FeeBook> {
        self.fees.get(id)
    }

    /// Take every event emitted since the last drain, oldest first.
    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    // ── Operations ───────────────────────────────────────────────────────

    /// Create a transaction and queue it behind its recipient's earlier
    /// submissions.
    pub fn submit(&mut self, submission: Submission, now: Timestamp) -> Result<TxHash, ConsensusError> {
        let result = self.submit_staged(submission, None, now);
        self.track("submit", result)
    }

    /// Add funds to a live transaction's fee book.
    pub fn deposit_fees(
        &mut self,
        id: &TxHash,
        depositor: &Address,
        amount: u128,
    ) -> Result<(), ConsensusError> {
        let result = self.deposit_staged(id, depositor, amount);
        self.track("deposit", result)
    }

    /// Start the first (or next) round of the transaction at the head of
    /// its recipient's pending queue.
    pub fn activate(
        &mut self,
        id: &TxHash,
        caller: &Address,
        proof: &RandomnessProof,
        now: Timestamp,
    ) -> Result<(), ConsensusError> {
        let result = self.activate_staged(id, caller, proof, now);
        self.track("activate", result)
    }

    /// The leader's execution result. An empty receipt counts as a leader
    /// failure.
    pub fn propose_receipt(
        &mut self,
        id: &TxHash,
        caller: &Address,
        receipt: Vec<u8>,
        messages: Vec<DownstreamMessage>,
        proof: &RandomnessProof,
        now: Timestamp,
    ) -> Result<TransactionStatus, ConsensusError> {
        let result = self.propose_staged(id, caller, receipt, messages, proof, now);
        self.track("propose", result)
    }

    pub fn commit_vote(
        &mut self,
        id: &TxHash,
        caller: &Address,
        commitment: [u8; 32],
        now: Timestamp,
    ) -> Result<TransactionStatus, ConsensusError> {
        let result = self.commit_staged(id, caller, commitment, now);
        self.track("commit_vote", result)
    }

    pub fn reveal_vote(
        &mut self,
        id: &TxHash,
        caller: &Address,
        commitment: [u8; 32],
        vote: VoteType,
        nonce: VoteNonce,
        now: Timestamp,
    ) -> Result<TransactionStatus, ConsensusError> {
        let result = self.reveal_staged(id, caller, commitment, vote, nonce, now);
        self.track("reveal_vote", result)
    }

    /// Challenge the decision of the transaction's last normal round.
    pub fn appeal(
        &mut self,
        id: &TxHash,
        caller: &Address,
        bond: u128,
        now: Timestamp,
    ) -> Result<(), ConsensusError> {
        let result = self.appeal_staged(id, caller, bond, now);
        self.track("appeal", result)
    }

    /// Close a decided transaction once its grace window has passed and
    /// every earlier transaction for the same recipient is closed.
    pub fn finalize(&mut self, id: &TxHash, now: Timestamp) -> Result<(), ConsensusError> {
        let result = self.finalize_staged(id, now);
        self.track("finalize", result)
    }

    /// Withdraw a transaction that was never activated. Refunds every deposit.
    pub fn cancel(&mut self, id: &TxHash, caller: &Address, now: Timestamp) -> Result<(), ConsensusError> {
        let result = self.cancel_staged(id, caller, now);
        self.track("cancel", result)
    }

    /// Apply the deadline of the current phase if it has passed.
    pub fn check_timeout(&mut self, id: &TxHash, now: Timestamp) -> Result<TransactionStatus, ConsensusError> {
        let result = self.timeout_staged(id, now);
        self.track("timeout", result)
    }

    // ── Staged implementations ───────────────────────────────────────────

    fn submit_staged(
        &mut self,
        submission: Submission,
        origin: Option<TxHash>,
        now: Timestamp,
    ) -> Result<TxHash, ConsensusError> {
        let Submission {
            sender,
            recipient,
            validator_count,
            max_rotations,
            payload,
            fee_deposit,
        } = submission;
        let validator_count = if validator_count == 0 {
            self.params.default_validator_count
        } else {
            validator_count
        };

        let nonce = self.nonces.get(&sender).copied().unwrap_or(0);
        let (recipient, creates_account) = match recipient {
            Some(recipient) => (recipient, false),
            None => (derive_account_address(&sender, nonce), true),
        };
        let id = transaction_id(&sender, &recipient, nonce, &payload);

        let required = self.params.min_fee_deposit(validator_count, max_rotations);
        let book = FeeLedger::open_book(id, &sender, fee_deposit, required)?;
        let activator = self.pool.activator_for_seed(&RandomSeed::genesis(&id))?;
        let mut queue = self.queues.staged(&recipient);
        queue.enqueue(id)?;

        let mut tx = Transaction::new(
            id,
            sender.clone(),
            recipient,
            creates_account,
            activator,
            validator_count,
            max_rotations,
            payload,
            now,
        );
        tx.origin = origin;
        tracing::info!(
            tx = %id,
            sender = %tx.sender,
            recipient = %tx.recipient,
            activator = %tx.activator,
            creates_account,
            "transaction submitted"
        );

        self.apply(Changes {
            transactions: vec![tx],
            queues: vec![queue],
            books: vec![book],
            nonces: vec![(sender, nonce + 1)],
            events: vec![EngineEvent::StatusChanged {
                tx: id,
                previous: None,
                status: Pending,
            }],
            ..Changes::default()
        })?;
        Ok(id)
    }

    fn deposit_staged(
        &mut self,
        id: &TxHash,
        depositor: &Address,
        amount: u128,
    ) -> Result<(), ConsensusError> {
        let tx = self.get(id)?;
        if tx.status.is_terminal() {
            return Err(ConsensusError::InvalidStateTransition {
                operation: "deposit_fees",
                status: tx.status,
            });
        }
        let mut book = self.fees.staged(id)?;
        book.deposit(depositor, amount)?;
        self.apply(Changes {
            books: vec![book],
            events: vec![EngineEvent::FeesDeposited {
                tx: *id,
                depositor: depositor.clone(),
                amount,
            }],
            ..Changes::default()
        })
    }

    fn activate_staged(
        &mut self,
        id: &TxHash,
        caller: &Address,
        proof: &RandomnessProof,
        now: Timestamp,
    ) -> Result<(), ConsensusError> {
        let mut tx = self.staged(id)?;
        require(&tx, Operation::Activate, &[Pending])?;
        authorize(&tx, caller, Operation::Activate, &self.pool)?;
        let mut queue = self.queues.staged(&tx.recipient);
        if !queue.is_pending_head(id) {
            return Err(ConsensusError::QueueOrderingViolation(format!(
                "{id} is not at the head of the pending queue"
            )));
        }
        tx.seed = self.verifier.verify(caller, &tx.seed, proof)?;

        match tx.next_round {
            NextRound::Initial => {
                let size = tx.validator_count as usize;
                start_round(&mut tx, &self.pool, 0, size)?;
            }
            NextRound::Continuity { index } => {
                start_continuity_round(&mut tx, &self.pool, &self.params, index)?;
            }
            NextRound::Rerun { index, size } => start_round(&mut tx, &self.pool, index, size)?,
        }

        let mut book = self.fees.staged(id)?;
        let round = tx.expect_round();
        book.record_round_start(round.index, round.leader(), &round.validators);
        tracing::info!(
            tx = %id,
            round = round.index,
            leader = %round.leader(),
            validators = round.len(),
            "transaction activated"
        );
        queue.activate(id)?;
        let previous = tx.transition(Proposing, now);
        let events = vec![status_changed(&tx, previous)];

        self.apply(Changes {
            transactions: vec![tx],
            queues: vec![queue],
            books: vec![book],
            events,
            ..Changes::default()
        })
    }

    fn propose_staged(
        &mut self,
        id: &TxHash,
        caller: &Address,
        receipt: Vec<u8>,
        messages: Vec<DownstreamMessage>,
        proof: &RandomnessProof,
        now: Timestamp,
    ) -> Result<TransactionStatus, ConsensusError> {
        let mut tx = self.staged(id)?;
        require(&tx, Operation::ProposeReceipt, &[Proposing])?;
        authorize(&tx, caller, Operation::ProposeReceipt, &self.pool)?;
        tx.seed = self.verifier.verify(caller, &tx.seed, proof)?;

        let mut book = self.fees.staged(id)?;
        let mut queue = self.queues.staged(&tx.recipient);
        let mut changes = Changes::default();
        let index = tx.expect_round().index;

        if receipt.is_empty() {
            tracing::info!(tx = %id, round = index, leader = %caller, "leader proposed an empty receipt");
            book.record_proposal(index, false)?;
            self.leader_failed(&mut tx, &mut book, &mut queue, &mut changes, now)?;
        } else {
            book.record_proposal(index, true)?;
            tx.receipt = Some(receipt);
            tx.messages = messages;
            let previous = tx.transition(Committing, now);
            changes.events.push(status_changed(&tx, previous));
        }

        let status = tx.status;
        self.apply(Changes {
            transactions: vec![tx],
            queues: vec![queue],
            books: vec![book],
            ..changes
        })?;
        Ok(status)
    }

    fn commit_staged(
        &mut self,
        id: &TxHash,
        caller: &Address,
        commitment: [u8; 32],
        now: Timestamp,
    ) -> Result<TransactionStatus, ConsensusError> {
        let mut tx = self.staged(id)?;
        require(&tx, Operation::CommitVote, &[Committing, AppealCommitting])?;
        authorize(&tx, caller, Operation::CommitVote, &self.pool)?;

        let complete = commit(tx.expect_round_mut(), caller, commitment)?;
        let next = match (tx.status, complete) {
            (Committing, true) => Revealing,
            (AppealCommitting, true) => AppealRevealing,
            (status, _) => status,
        };
        let previous = tx.transition(next, now);
        let events = vec![status_changed(&tx, previous)];
        self.apply(Changes::tx(tx, events))?;
        Ok(next)
    }

    fn reveal_staged(
        &mut self,
        id: &TxHash,
        caller: &Address,
        commitment: [u8; 32],
        vote: VoteType,
        nonce: VoteNonce,
        now: Timestamp,
    ) -> Result<TransactionStatus, ConsensusError> {
        let mut tx = self.staged(id)?;
        require(&tx, Operation::RevealVote, &[Revealing, AppealRevealing])?;
        authorize(&tx, caller, Operation::RevealVote, &self.pool)?;

        let complete = reveal(tx.expect_round_mut(), caller, &commitment, vote, &nonce)?;
        if complete {
            return self.resolve(tx, now, false);
        }
        let status = tx.status;
        let previous = tx.transition(status, now);
        let events = vec![status_changed(&tx, previous)];
        self.apply(Changes::tx(tx, events))?;
        Ok(status)
    }

    fn appeal_staged(
        &mut self,
        id: &TxHash,
        caller: &Address,
        bond: u128,
        now: Timestamp,
    ) -> Result<(), ConsensusError> {
        let mut tx = self.staged(id)?;
        require(&tx, Operation::Appeal, &[Accepted, Undetermined])?;
        authorize(&tx, caller, Operation::Appeal, &self.pool)?;

        if self.queues.get(&tx.recipient).is_some_and(|q| q.is_reopened(id)) {
            return Err(ConsensusError::AppealWindowClosed(format!("{id} was reopened")));
        }
        match tx.finality_deadline(self.params.finality_window_secs) {
            Some(deadline) if now < deadline => {}
            _ => {
                return Err(ConsensusError::AppealWindowClosed(format!(
                    "{id} grace window has ended"
                )))
            }
        }
        let required = required_bond(&self.params, &tx);
        if bond < required {
            return Err(ConsensusError::InsufficientBond {
                required,
                provided: bond,
            });
        }

        let mut book = self.fees.staged(id)?;
        let index = open_appeal(&mut tx, &self.pool, caller, bond)?;
        let Some(challenged) = tx.open_appeal().map(|a| a.challenged_round) else {
            broken(id, "opened appeal left no record");
        };
        book.record_appeal(index, challenged, caller, bond, &tx.expect_round().validators)?;
        let previous = tx.transition(AppealCommitting, now);
        let events = vec![status_changed(&tx, previous)];

        self.apply(Changes {
            transactions: vec![tx],
            books: vec![book],
            events,
            ..Changes::default()
        })
    }

    fn finalize_staged(&mut self, id: &TxHash, now: Timestamp) -> Result<(), ConsensusError> {
        let mut tx = self.staged(id)?;
        require(&tx, Operation::Finalize, &[Accepted, Undetermined])?;
        let mut queue = self.queues.staged(&tx.recipient);
        if !queue.is_finalization_head(id) {
            return Err(ConsensusError::QueueOrderingViolation(format!(
                "{id} has earlier transactions still open"
            )));
        }
        let Some(deadline) = tx.finality_deadline(self.params.finality_window_secs) else {
            broken(id, "decided transaction has no last vote time");
        };
        if now < deadline {
            return Err(ConsensusError::DeadlineNotReached { deadline });
        }

        queue.finalize(id)?;
        let mut book = self.fees.staged(id)?;
        let distribution = book.commit_final_fees(FeeSchedule::from(&self.params))?;
        let was_accepted = tx.status == Accepted;
        let previous = tx.transition(Finalized, now);
        let events = vec![
            status_changed(&tx, previous),
            EngineEvent::FeesDistributed {
                tx: *id,
                distribution,
            },
        ];

        self.apply(Changes {
            transactions: vec![tx],
            queues: vec![queue],
            books: vec![book],
            events,
            ..Changes::default()
        })?;
        self.pool.refresh_snapshot(now);
        if was_accepted {
            self.release_messages(id, MessagePhase::OnFinalization, now);
        }
        Ok(())
    }

    fn cancel_staged(&mut self, id: &TxHash, caller: &Address, now: Timestamp) -> Result<(), ConsensusError> {
        let mut tx = self.staged(id)?;
        require(&tx, Operation::Cancel, &[Pending])?;
        authorize(&tx, caller, Operation::Cancel, &self.pool)?;
        if !tx.rounds.is_empty() {
            return Err(ConsensusError::InvalidStateTransition {
                operation: Operation::Cancel.name(),
                status: tx.status,
            });
        }

        let mut queue = self.queues.staged(&tx.recipient);
        queue.cancel(id)?;
        let mut book = self.fees.staged(id)?;
        let distribution = book.refund()?;
        let previous = tx.transition(Canceled, now);
        let events = vec![
            status_changed(&tx, previous),
            EngineEvent::FeesDistributed {
                tx: *id,
                distribution,
            },
        ];

        self.apply(Changes {
            transactions: vec![tx],
            queues: vec![queue],
            books: vec![book],
            events,
            ..Changes::default()
        })
    }

    fn timeout_staged(&mut self, id: &TxHash, now: Timestamp) -> Result<TransactionStatus, ConsensusError> {
        let mut tx = self.staged(id)?;
        let window = match tx.status {
            Proposing => self.params.leader_timeout_secs,
            Committing => self.params.commit_timeout_secs,
            Revealing => self.params.reveal_timeout_secs,
            AppealCommitting => self.params.appeal_commit_timeout_secs,
            AppealRevealing => self.params.appeal_reveal_timeout_secs,
            status => {
                return Err(ConsensusError::InvalidStateTransition {
                    operation: "check_timeout",
                    status,
                })
            }
        };
        let deadline = tx.phase_started.plus(window);
        if now < deadline {
            return Err(ConsensusError::DeadlineNotReached { deadline });
        }
        tracing::info!(tx = %id, status = ?tx.status, deadline = %deadline, "phase timed out");

        match tx.status {
            Proposing => {
                let mut book = self.fees.staged(id)?;
                let mut queue = self.queues.staged(&tx.recipient);
                let mut changes = Changes::default();
                book.record_proposal(tx.expect_round().index, false)?;
                self.leader_failed(&mut tx, &mut book, &mut queue, &mut changes, now)?;
                let status = tx.status;
                self.apply(Changes {
                    transactions: vec![tx],
                    queues: vec![queue],
                    books: vec![book],
                    ..changes
                })?;
                Ok(status)
            }
            Committing | AppealCommitting => {
                let next = if tx.status == Committing {
                    Revealing
                } else {
                    AppealRevealing
                };
                let previous = tx.transition(next, now);
                let events = vec![status_changed(&tx, previous)];
                self.apply(Changes::tx(tx, events))?;
                Ok(next)
            }
            _ => self.resolve(tx, now, true),
        }
    }

    // ── Resolution ───────────────────────────────────────────────────────

    /// Close the active round once its reveals are in (or timed out).
    fn resolve(
        &mut self,
        tx: Transaction,
        now: Timestamp,
        closed_by_timeout: bool,
    ) -> Result<TransactionStatus, ConsensusError> {
        if tx.status == AppealRevealing {
            self.resolve_appeal(tx, now, closed_by_timeout)
        } else {
            self.resolve_round(tx, now)
        }
    }

    fn resolve_round(&mut self, mut tx: Transaction, now: Timestamp) -> Result<TransactionStatus, ConsensusError> {
        let id = tx.id;
        let mut book = self.fees.staged(&id)?;
        let mut queue = self.queues.staged(&tx.recipient);
        let mut changes = Changes::default();

        let round = tx.expect_round_mut();
        let result = close_round(round);
        let (index, rotations_left) = (round.index, round.rotations_left);
        book.record_votes(index, &round.votes, result)?;
        tracing::info!(tx = %id, round = index, ?result, "round closed");

        if result.is_accepting() {
            self.conclude(&mut tx, &mut book, &mut queue, &mut changes, Accepted, now)?;
        } else if rotations_left > 0 {
            self.rotate(&mut tx, &mut book, &mut changes, now)?;
        } else {
            self.conclude(&mut tx, &mut book, &mut queue, &mut changes, Undetermined, now)?;
        }

        let status = tx.status;
        self.apply(Changes {
            transactions: vec![tx],
            queues: vec![queue],
            books: vec![book],
            ..changes
        })?;
        if status == Accepted {
            self.release_messages(&id, MessagePhase::OnAcceptance, now);
        }
        Ok(status)
    }

    fn resolve_appeal(
        &mut self,
        mut tx: Transaction,
        now: Timestamp,
        closed_by_timeout: bool,
    ) -> Result<TransactionStatus, ConsensusError> {
        let id = tx.id;
        let mut book = self.fees.staged(&id)?;
        let mut events = Vec::new();

        let round = tx.expect_round_mut();
        let result = close_round(round);
        let index = round.index;
        book.record_votes(index, &round.votes, result)?;
        let outcome = reconcile(&mut tx, closed_by_timeout);
        book.reclassify_appeal(index, outcome)?;

        if outcome == AppealOutcome::Unsuccessful {
            let Some(prior) = tx.appeals.last().map(|a| a.prior_status) else {
                broken(&id, "resolved appeal has no record");
            };
            tx.last_vote = Some(now);
            let previous = tx.transition(prior, now);
            events.push(status_changed(&tx, previous));
            self.apply(Changes {
                transactions: vec![tx],
                books: vec![book],
                events,
                counters: vec!["appeals_unsuccessful"],
                ..Changes::default()
            })?;
            return Ok(prior);
        }

        let mut queue = self.queues.staged(&tx.recipient);
        let invalidated = queue.reopen(&id)?;
        tx.next_round = NextRound::Continuity { index: index + 1 };
        tx.receipt = None;
        tx.messages.clear();
        tx.last_vote = None;
        let previous = tx.transition(Pending, now);
        events.push(status_changed(&tx, previous));

        let mut transactions = vec![tx];
        let mut books = vec![book];
        for other in &invalidated {
            let mut other_tx = self.staged(other)?;
            let mut other_book = self.fees.staged(other)?;
            let previous = invalidate(&mut other_tx, &mut other_book, now);
            events.push(status_changed(&other_tx, previous));
            transactions.push(other_tx);
            books.push(other_book);
        }
        if !invalidated.is_empty() {
            tracing::info!(
                tx = %id,
                invalidated = invalidated.len(),
                "successful appeal invalidated later transactions"
            );
            events.push(EngineEvent::RecomputationRequired {
                tx: id,
                invalidated: invalidated.clone(),
            });
        }

        self.apply(Changes {
            transactions,
            queues: vec![queue],
            books,
            events,
            counters: vec!["appeals_successful"],
            ..Changes::default()
        })?;
        self.stats.add("recomputations", invalidated.len() as u64);
        Ok(Pending)
    }

    /// The leader produced nothing: rotate if the budget allows, otherwise
    /// the round ends undetermined.
    fn leader_failed(
        &self,
        tx: &mut Transaction,
        book: &mut FeeBook,
        queue: &mut RecipientQueueSet,
        changes: &mut Changes,
        now: Timestamp,
    ) -> Result<(), ConsensusError> {
        if tx.expect_round().rotations_left > 0 {
            self.rotate(tx, book, changes, now)
        } else {
            self.conclude(tx, book, queue, changes, Undetermined, now)
        }
    }

    fn rotate(
        &self,
        tx: &mut Transaction,
        book: &mut FeeBook,
        changes: &mut Changes,
        now: Timestamp,
    ) -> Result<(), ConsensusError> {
        let (previous_leader, leader) = rotate_leader(tx, &self.pool)?;
        let round = tx.expect_round();
        book.record_round_start(round.index, round.leader(), &round.validators);
        tracing::info!(
            tx = %tx.id,
            round = round.index,
            previous = %previous_leader,
            leader = %leader,
            rotations_left = round.rotations_left,
            "leader rotated"
        );
        changes.events.push(EngineEvent::LeaderRotated {
            tx: tx.id,
            round: round.index,
            previous: previous_leader,
            leader,
            rotations_left: round.rotations_left,
        });

        tx.receipt = None;
        tx.messages.clear();
        let previous = tx.transition(Proposing, now);
        tx.phase_started = now;
        changes.events.push(status_changed(tx, previous));
        changes.counters.push("rotations");
        Ok(())
    }

    fn conclude(
        &self,
        tx: &mut Transaction,
        book: &mut FeeBook,
        queue: &mut RecipientQueueSet,
        changes: &mut Changes,
        status: TransactionStatus,
        now: Timestamp,
    ) -> Result<(), ConsensusError> {
        if status == Accepted {
            queue.mark_accepted(&tx.id);
            changes.counters.push("accepted");
        } else {
            queue.mark_undetermined(&tx.id);
            changes.counters.push("undetermined");
        }
        book.reclassify(tx.expect_round().index)?;
        tx.last_vote = Some(now);
        let previous = tx.transition(status, now);
        changes.events.push(status_changed(tx, previous));
        Ok(())
    }

    // ── Messages ─────────────────────────────────────────────────────────

    /// Hand out the messages of `id` released in `phase`. Runs after the
    /// releasing operation has committed; a message that cannot be
    /// delivered is logged and dropped.
    fn release_messages(&mut self, id: &TxHash, phase: MessagePhase, now: Timestamp) {
        let Some(tx) = self.transactions.get(id) else {
            return;
        };
        let released: Vec<DownstreamMessage> =
            for_phase(&tx.messages, phase).into_iter().cloned().collect();
        if released.is_empty() {
            return;
        }
        let sender = tx.recipient.clone();

        let (mut internal, mut external) = (0, 0);
        for message in released {
            match message.kind {
                MessageKind::Internal => {
                    let submission = Submission {
                        sender: sender.clone(),
                        recipient: Some(message.target.clone()),
                        validator_count: self.params.default_validator_count,
                        max_rotations: self.params.default_max_rotations,
                        payload: message.payload,
                        fee_deposit: message.fee_deposit,
                    };
                    match self.submit_staged(submission, Some(*id), now) {
                        Ok(child) => {
                            internal += 1;
                            tracing::debug!(tx = %id, child = %child, "internal message submitted");
                        }
                        Err(e) => {
                            self.stats.increment("messages_failed");
                            tracing::warn!(tx = %id, target = %message.target, error = %e, "internal message rejected");
                        }
                    }
                }
                MessageKind::External => match self.dispatcher.dispatch(id, &message) {
                    Ok(()) => external += 1,
                    Err(e) => {
                        self.stats.increment("messages_failed");
                        tracing::warn!(tx = %id, target = %message.target, error = %e, "external message rejected");
                    }
                },
            }
        }

        self.stats.add("messages_internal", internal as u64);
        self.stats.add("messages_external", external as u64);
        self.events.push(EngineEvent::MessagesDispatched {
            tx: *id,
            phase,
            internal,
            external,
        });
    }

    // ── Persistence ──────────────────────────────────────────────────────

    /// Commit `changes` to the store, then install them in memory.
    fn apply(&mut self, changes: Changes) -> Result<(), ConsensusError> {
        let mut batch = WriteBatch::new();
        stage_schema_version(&mut batch);
        for tx in &changes.transactions {
            batch.put_encoded(KeySpace::Transactions, tx_key(&tx.id), tx)?;
        }
        for set in &changes.queues {
            batch.put_encoded(KeySpace::QueueSets, recipient_key(set.recipient()), set)?;
        }
        for book in &changes.books {
            batch.put_encoded(KeySpace::FeeBooks, tx_key(book.tx()), book)?;
        }
        for entry in &changes.nonces {
            batch.put_encoded(KeySpace::SenderNonces, recipient_key(&entry.0), entry)?;
        }
        self.store.commit(batch)?;

        for tx in changes.transactions {
            self.transactions.insert(tx.id, tx);
        }
        for set in changes.queues {
            self.queues.install(set);
        }
        for book in changes.books {
            self.fees.install(book);
        }
        self.nonces.extend(changes.nonces);
        self.events.extend(changes.events);
        for counter in changes.counters {
            self.stats.increment(counter);
        }
        Ok(())
    }

    fn get(&self, id: &TxHash) -> Result<&Transaction, ConsensusError> {
        self.transactions
            .get(id)
            .ok_or_else(|| ConsensusError::TransactionNotFound(id.to_string()))
    }

    /// A working copy of `id`.
    fn staged(&self, id: &TxHash) -> Result<Transaction, ConsensusError> {
        self.get(id).cloned()
    }

    fn track<T>(&self, counter: &'static str, result: Result<T, ConsensusError>) -> Result<T, ConsensusError> {
        match &result {
            Ok(_) => self.stats.increment(counter),
            Err(e) => {
                self.stats.increment("rejected");
                tracing::debug!(operation = counter, error = %e, "operation rejected");
            }
        }
        result
    }
}

fn require(
    tx: &Transaction,
    op: Operation,
    allowed: &[TransactionStatus],
) -> Result<(), ConsensusError> {
    if allowed.contains(&tx.status) {
        Ok(())
    } else {
        Err(ConsensusError::InvalidStateTransition {
            operation: op.name(),
            status: tx.status,
        })
    }
}

fn status_changed(tx: &Transaction, previous: TransactionStatus) -> EngineEvent {
    if previous == tx.status {
        tracing::debug!(tx = %tx.id, status = ?tx.status, "phase progressed");
    } else {
        tracing::info!(tx = %tx.id, from = ?previous, to = ?tx.status, "status changed");
    }
    EngineEvent::StatusChanged {
        tx: tx.id,
        previous: Some(previous),
        status: tx.status,
    }
}

/// Send a transaction that ran on top of an overturned result back to
/// `Pending`. Its latest normal round and every appeal after it stop
/// earning fees, and it will re-run at the next normal index with a fresh
/// committee of the same size.
fn invalidate(tx: &mut Transaction, book: &mut FeeBook, now: Timestamp) -> TransactionStatus {
    let last_index = tx.expect_round().index;
    let (from, size) = tx
        .last_normal_round()
        .map(|r| (r.index, r.len()))
        .unwrap_or((last_index, tx.validator_count as usize));
    for round in from..=last_index {
        book.abandon_round(round);
    }
    let index = if last_index % 2 == 0 {
        last_index + 2
    } else {
        last_index + 1
    };

    tx.appeals.retain(|a| a.outcome.is_some());
    tx.next_round = NextRound::Rerun { index, size };
    tx.receipt = None;
    tx.messages.clear();
    tx.last_vote = None;
    tracing::debug!(tx = %tx.id, rerun = index, size, "transaction sent back for recomputation");
    tx.transition(Pending, now)
}
