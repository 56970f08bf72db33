//! End-to-end transaction lifecycles through the coordinator.

use std::sync::Arc;

use verdict_consensus::{ConsensusError, Coordinator, EngineEvent, NextRound, Role, Submission};
use verdict_crypto::{derive_account_address, derive_address, keypair_from_seed, vote_commitment};
use verdict_fees::{PayoutReason, RoundFeeType};
use verdict_messages::{DownstreamMessage, MessagePhase};
use verdict_nullables::{NullClock, NullDispatcher, NullStore, NullVerifier};
use verdict_store::KeySpace;
use verdict_types::{Address, EngineParams, KeyPair, TransactionStatus, TxHash, VoteType};
use verdict_validators::{StakeRegistry, ValidatorPool};
use verdict_vrf::{prove, RandomnessProof, SignatureVerifier};

use TransactionStatus::*;
use VoteType::*;

const DEPOSIT: u128 = 10_000;
const BOND: u128 = 1_000;

fn v(name: &str) -> Address {
    Address::new(format!("vrd_{name}"))
}

fn validator(i: usize) -> Address {
    v(&format!("val{i:02}"))
}

fn proof() -> RandomnessProof {
    RandomnessProof(vec![7u8; 64])
}

struct Harness {
    engine: Coordinator<StakeRegistry>,
    store: Arc<NullStore>,
    dispatcher: Arc<NullDispatcher>,
    clock: NullClock,
}

fn harness_with(params: EngineParams, validators: usize) -> Harness {
    let clock = NullClock::new(1_000);
    let pool = StakeRegistry::with_stakes((0..validators).map(|i| (validator(i), 100)), clock.now());
    let store = Arc::new(NullStore::new());
    let dispatcher = Arc::new(NullDispatcher::new());
    let engine = Coordinator::new(
        params,
        pool,
        store.clone(),
        Arc::new(NullVerifier::new()),
        dispatcher.clone(),
    );
    Harness {
        engine,
        store,
        dispatcher,
        clock,
    }
}

fn harness() -> Harness {
    harness_with(EngineParams::default(), 40)
}

fn submission(sender: &str, recipient: &str, max_rotations: u32) -> Submission {
    Submission {
        sender: v(sender),
        recipient: Some(v(recipient)),
        validator_count: 5,
        max_rotations,
        payload: b"call".to_vec(),
        fee_deposit: DEPOSIT,
    }
}

impl Harness {
    fn submit(&mut self, sender: &str, recipient: &str, max_rotations: u32) -> TxHash {
        let now = self.clock.now();
        self.engine
            .submit(submission(sender, recipient, max_rotations), now)
            .unwrap()
    }

    fn status(&self, id: &TxHash) -> TransactionStatus {
        self.engine.transaction(id).unwrap().status
    }

    fn committee(&self, id: &TxHash) -> Vec<Address> {
        self.engine
            .transaction(id)
            .unwrap()
            .active_round()
            .unwrap()
            .validators
            .clone()
    }

    fn leader(&self, id: &TxHash) -> Address {
        self.engine
            .transaction(id)
            .unwrap()
            .active_round()
            .unwrap()
            .leader()
            .clone()
    }

    fn activate(&mut self, id: &TxHash) {
        let activator = self.engine.transaction(id).unwrap().activator.clone();
        let now = self.clock.advance(1);
        self.engine.activate(id, &activator, &proof(), now).unwrap();
    }

    fn propose(&mut self, id: &TxHash, messages: Vec<DownstreamMessage>) -> TransactionStatus {
        let leader = self.leader(id);
        let now = self.clock.advance(1);
        self.engine
            .propose_receipt(id, &leader, b"receipt".to_vec(), messages, &proof(), now)
            .unwrap()
    }

    /// Commit then reveal `votes` in committee order; positions past the
    /// end of `votes` stay silent. Returns the status after the last call.
    fn vote(&mut self, id: &TxHash, votes: &[VoteType]) -> TransactionStatus {
        let committee = self.committee(id);
        let mut status = self.status(id);
        for (i, (member, vote)) in committee.iter().zip(votes).enumerate() {
            let commitment = vote_commitment(member, *vote, &[i as u8; 32]);
            let now = self.clock.advance(1);
            status = self.engine.commit_vote(id, member, commitment, now).unwrap();
        }
        if votes.len() < committee.len() {
            return status;
        }
        for (i, (member, vote)) in committee.iter().zip(votes).enumerate() {
            let commitment = vote_commitment(member, *vote, &[i as u8; 32]);
            let now = self.clock.advance(1);
            status = self
                .engine
                .reveal_vote(id, member, commitment, *vote, [i as u8; 32], now)
                .unwrap();
        }
        status
    }

    fn accept(&mut self, id: &TxHash) {
        self.activate(id);
        self.propose(id, Vec::new());
        assert_eq!(self.vote(id, &[Agree; 5]), Accepted);
    }

    fn status_events(&mut self) -> Vec<(TxHash, TransactionStatus)> {
        self.engine
            .drain_events()
            .into_iter()
            .filter_map(|e| match e {
                EngineEvent::StatusChanged { tx, status, .. } => Some((tx, status)),
                _ => None,
            })
            .collect()
    }
}

// ── Scenario A: happy path ───────────────────────────────────────────────

#[test]
fn unanimous_round_accepts_and_finalizes() {
    let mut h = harness();
    let id = h.submit("alice", "counter", 2);
    assert_eq!(h.status(&id), Pending);

    h.activate(&id);
    assert_eq!(h.status(&id), Proposing);
    assert_eq!(h.committee(&id).len(), 5);

    assert_eq!(h.propose(&id, Vec::new()), Committing);
    assert_eq!(h.vote(&id, &[Agree; 5]), Accepted);
    let round = h.engine.transaction(&id).unwrap().active_round().unwrap().clone();
    assert_eq!(round.result, verdict_types::RoundResult::MajorityAgree);

    let early = h.clock.now();
    assert!(matches!(
        h.engine.finalize(&id, early),
        Err(ConsensusError::DeadlineNotReached { .. })
    ));

    let now = h.clock.advance(1_800);
    h.engine.finalize(&id, now).unwrap();
    assert_eq!(h.status(&id), Finalized);

    let events = h.engine.drain_events();
    let distribution = events
        .iter()
        .find_map(|e| match e {
            EngineEvent::FeesDistributed { distribution, .. } => Some(distribution.clone()),
            _ => None,
        })
        .unwrap();
    let leader = round.leader().clone();
    assert_eq!(distribution.total(), DEPOSIT);
    assert_eq!(distribution.paid_to(&leader), 100 + 10);
    assert_eq!(distribution.paid_to(&v("alice")), DEPOSIT - 150);
}

#[test]
fn every_operation_signals_one_status_change() {
    let mut h = harness();
    let id = h.submit("alice", "counter", 2);
    h.accept(&id);
    let now = h.clock.advance(1_800);
    h.engine.finalize(&id, now).unwrap();

    let statuses: Vec<_> = h.status_events().into_iter().map(|(_, s)| s).collect();
    // submit, activate, propose, 5 commits, 5 reveals, finalize
    assert_eq!(statuses.len(), 14);
    assert_eq!(statuses[..3], [Pending, Proposing, Committing]);
    assert_eq!(statuses[7], Revealing);
    assert_eq!(statuses[12], Accepted);
    assert_eq!(statuses[13], Finalized);
}

// ── Scenario B: leader rotation ──────────────────────────────────────────

#[test]
fn empty_receipt_rotates_the_leader() {
    let mut h = harness();
    let id = h.submit("alice", "counter", 2);
    h.activate(&id);
    let old_leader = h.leader(&id);

    let now = h.clock.advance(1);
    let status = h
        .engine
        .propose_receipt(&id, &old_leader, Vec::new(), Vec::new(), &proof(), now)
        .unwrap();
    assert_eq!(status, Proposing);

    let tx = h.engine.transaction(&id).unwrap();
    let round = tx.active_round().unwrap();
    assert_ne!(round.leader(), &old_leader);
    assert!(!round.validators.contains(&old_leader));
    assert_eq!(round.rotations_left, 1);
    assert_eq!(round.len(), 5);
    assert!(tx.consumed.contains(&old_leader));
    assert_eq!(tx.consumed.len(), 6);

    let rotated = h.engine.drain_events().into_iter().any(|e| {
        matches!(e, EngineEvent::LeaderRotated { previous, rotations_left: 1, .. } if previous == old_leader)
    });
    assert!(rotated);

    let book = h.engine.fee_book(&id).unwrap();
    assert_eq!(book.round(0).unwrap().rotations.len(), 2);
    assert_eq!(
        book.round(0).unwrap().rotations[0].fee_type,
        RoundFeeType::LeaderTimeout50Percent
    );
}

#[test]
fn only_the_leader_may_propose() {
    let mut h = harness();
    let id = h.submit("alice", "counter", 0);
    h.activate(&id);
    let leader = h.leader(&id);
    let outsider = h
        .committee(&id)
        .into_iter()
        .find(|m| *m != leader)
        .unwrap();

    let now = h.clock.advance(1);
    let err = h
        .engine
        .propose_receipt(&id, &outsider, b"r".to_vec(), Vec::new(), &proof(), now)
        .unwrap_err();
    assert!(matches!(err, ConsensusError::NotAuthorized { role: Role::Leader, .. }));
    assert_eq!(h.status(&id), Proposing);
}

#[test]
fn exhausted_rotations_end_undetermined() {
    let mut h = harness();
    let id = h.submit("alice", "counter", 0);
    h.activate(&id);
    let leader = h.leader(&id);
    let now = h.clock.advance(1);
    let status = h
        .engine
        .propose_receipt(&id, &leader, Vec::new(), Vec::new(), &proof(), now)
        .unwrap();
    assert_eq!(status, Undetermined);
    assert!(h.engine.queue(&v("counter")).unwrap().undetermined().contains(&id));
}

#[test]
fn failed_vote_rotates_then_accepts() {
    let mut h = harness();
    let id = h.submit("alice", "counter", 1);
    h.activate(&id);
    h.propose(&id, Vec::new());
    assert_eq!(h.vote(&id, &[Disagree, Disagree, Disagree, Agree, Agree]), Proposing);
    assert_eq!(h.engine.transaction(&id).unwrap().receipt, None);

    h.propose(&id, Vec::new());
    assert_eq!(h.vote(&id, &[Agree; 5]), Accepted);
    assert_eq!(h.engine.stats().get("rotations"), 1);
}

#[test]
fn rotation_fails_cleanly_when_the_pool_runs_dry() {
    let mut h = harness_with(EngineParams::default(), 5);
    let id = h.submit("alice", "counter", 1);
    h.activate(&id);
    let before = h.engine.transaction(&id).unwrap().clone();
    let leader = h.leader(&id);

    let now = h.clock.advance(1);
    assert_eq!(
        h.engine
            .propose_receipt(&id, &leader, Vec::new(), Vec::new(), &proof(), now),
        Err(ConsensusError::AllValidatorsConsumed {
            requested: 1,
            available: 0
        })
    );
    assert_eq!(h.engine.transaction(&id).unwrap(), &before);
}

// ── Scenario C: successful appeal and cascade ────────────────────────────

#[test]
fn successful_appeal_reopens_and_cascades() {
    let mut h = harness();
    let first = h.submit("alice", "counter", 0);
    let second = h.submit("bob", "counter", 1);
    let third = h.submit("carol", "counter", 1);

    h.activate(&first);
    h.propose(&first, Vec::new());
    assert_eq!(h.vote(&first, &[Agree, Agree, Agree, Disagree, Disagree]), Accepted);
    let challenged_leader = h.leader(&first);
    h.accept(&second);
    h.activate(&third);
    h.engine.drain_events();

    let now = h.clock.advance(1);
    h.engine.appeal(&first, &validator(39), BOND, now).unwrap();
    assert_eq!(h.status(&first), AppealCommitting);
    assert_eq!(h.committee(&first).len(), 7);

    assert_eq!(h.vote(&first, &[Disagree; 7]), Pending);
    assert_eq!(h.status(&second), Pending);
    assert_eq!(h.status(&third), Pending);

    let invalidated = h.engine.drain_events().into_iter().find_map(|e| match e {
        EngineEvent::RecomputationRequired { tx, invalidated } if tx == first => Some(invalidated),
        _ => None,
    });
    assert_eq!(invalidated, Some(vec![second, third]));

    let queue = h.engine.queue(&v("counter")).unwrap();
    assert!(queue.is_pending_head(&first));
    assert!(queue.accepted().is_empty());

    let tx = h.engine.transaction(&first).unwrap();
    assert_eq!(tx.next_round, NextRound::Continuity { index: 2 });
    let second_tx = h.engine.transaction(&second).unwrap();
    assert_eq!(second_tx.next_round, NextRound::Rerun { index: 2, size: 5 });
    let book = h.engine.fee_book(&second).unwrap();
    assert_eq!(book.round_type(0), RoundFeeType::SkipRewards);

    // Re-run: merged committee without the challenged leader.
    h.activate(&first);
    let committee = h.committee(&first);
    assert_eq!(committee.len(), 11);
    assert!(!committee.contains(&challenged_leader));
    assert_eq!(h.engine.transaction(&first).unwrap().active_round().unwrap().index, 2);

    // The cascaded transactions follow in queue order.
    h.propose(&first, Vec::new());
    assert_eq!(h.vote(&first, &[Disagree; 11]), Undetermined);
    h.activate(&second);
    assert_eq!(h.engine.transaction(&second).unwrap().active_round().unwrap().index, 2);
    assert_eq!(h.engine.fee_book(&second).unwrap().round_type(1), RoundFeeType::EmptyRound);
    assert_eq!(h.engine.stats().get("recomputations"), 2);
}

// ── Scenario D: unsuccessful appeals ─────────────────────────────────────

fn forfeited_bonds(h: &mut Harness) -> usize {
    h.engine
        .drain_events()
        .into_iter()
        .find_map(|e| match e {
            EngineEvent::FeesDistributed { distribution, .. } => Some(distribution),
            _ => None,
        })
        .unwrap()
        .payouts
        .iter()
        .filter(|p| p.reason == PayoutReason::ForfeitedBond)
        .count()
}

#[test]
fn failed_appeals_can_be_followed_by_another() {
    let mut h = harness();
    let id = h.submit("alice", "counter", 1);
    h.accept(&id);

    let now = h.clock.advance(1);
    h.engine.appeal(&id, &validator(39), BOND, now).unwrap();
    assert_eq!(h.vote(&id, &[Agree; 7]), Accepted);
    assert_eq!(
        h.engine.fee_book(&id).unwrap().round_type(1),
        RoundFeeType::AppealUnsuccessful
    );

    // The reopened grace window admits a second appeal of round 0.
    let now = h.clock.advance(1);
    h.engine.appeal(&id, &validator(38), BOND, now).unwrap();
    let tx = h.engine.transaction(&id).unwrap();
    assert_eq!(tx.active_round().unwrap().index, 3);
    assert_eq!(tx.open_appeal().unwrap().challenged_round, 0);
    assert_eq!(h.committee(&id).len(), 12 + 2);
    let book = h.engine.fee_book(&id).unwrap();
    assert_eq!(book.round_type(2), RoundFeeType::EmptyRound);
    assert_eq!(book.round(3).unwrap().challenged, Some(0));

    assert_eq!(h.vote(&id, &[Agree; 14]), Accepted);
    assert_eq!(h.engine.stats().get("appeals_unsuccessful"), 2);

    let now = h.clock.advance(1_800);
    h.engine.finalize(&id, now).unwrap();
    assert_eq!(forfeited_bonds(&mut h), 2);
}

#[test]
fn second_appeal_can_overturn_the_decision() {
    let mut h = harness();
    let first = h.submit("alice", "counter", 1);
    let later = h.submit("bob", "counter", 1);
    h.accept(&first);
    let challenged = h.engine.transaction(&first).unwrap().active_round().unwrap().clone();

    let now = h.clock.advance(1);
    h.engine.appeal(&first, &validator(39), BOND, now).unwrap();
    assert_eq!(h.vote(&first, &[Agree; 7]), Accepted);
    h.accept(&later);

    let now = h.clock.advance(1);
    h.engine.appeal(&first, &validator(38), BOND, now).unwrap();
    assert_eq!(h.vote(&first, &[Disagree; 14]), Pending);
    assert_eq!(h.status(&later), Pending);

    let tx = h.engine.transaction(&first).unwrap();
    assert_eq!(tx.next_round, NextRound::Continuity { index: 4 });
    let book = h.engine.fee_book(&first).unwrap();
    assert_eq!(book.round_type(0), RoundFeeType::SkipRewards);
    assert_eq!(book.round_type(1), RoundFeeType::AppealUnsuccessful);
    assert_eq!(book.round_type(3), RoundFeeType::AppealSuccessful);

    // Continuity merges round 0 and the second appeal, topped up to 23.
    let second_appeal = h.committee(&first);
    h.activate(&first);
    let committee = h.committee(&first);
    assert_eq!(h.engine.transaction(&first).unwrap().active_round().unwrap().index, 4);
    assert_eq!(committee.len(), 23);
    assert!(!committee.contains(challenged.leader()));
    assert!(second_appeal.iter().all(|m| committee.contains(m)));
    assert_eq!(h.engine.stats().get("appeals_successful"), 1);
}

#[test]
fn appeal_after_a_rotation_counts_every_consumed_validator() {
    let mut h = harness();
    let id = h.submit("alice", "counter", 1);
    h.activate(&id);
    let leader = h.leader(&id);
    let now = h.clock.advance(1);
    h.engine
        .propose_receipt(&id, &leader, Vec::new(), Vec::new(), &proof(), now)
        .unwrap();
    h.propose(&id, Vec::new());
    assert_eq!(h.vote(&id, &[Agree; 5]), Accepted);
    assert_eq!(h.engine.transaction(&id).unwrap().consumed.len(), 6);

    let now = h.clock.advance(1);
    assert_eq!(
        h.engine.appeal(&id, &validator(39), 179, now),
        Err(ConsensusError::InsufficientBond {
            required: 180,
            provided: 179
        })
    );
    h.engine.appeal(&id, &validator(39), BOND, now).unwrap();
    assert_eq!(h.committee(&id).len(), 8);
    assert_eq!(h.engine.transaction(&id).unwrap().consumed.len(), 14);
}

#[test]
fn appeal_needs_bond_and_open_window() {
    let mut h = harness();
    let id = h.submit("alice", "counter", 1);
    h.accept(&id);

    let now = h.clock.advance(1);
    assert_eq!(
        h.engine.appeal(&id, &validator(39), 169, now),
        Err(ConsensusError::InsufficientBond {
            required: 170,
            provided: 169
        })
    );
    assert!(matches!(
        h.engine.appeal(&id, &v("nobody"), BOND, now),
        Err(ConsensusError::NotAuthorized { role: Role::AnyValidator, .. })
    ));

    let late = h.clock.advance(1_800);
    assert!(matches!(
        h.engine.appeal(&id, &validator(39), BOND, late),
        Err(ConsensusError::AppealWindowClosed(_))
    ));
    assert_eq!(h.status(&id), Accepted);
}

// ── Timeouts ─────────────────────────────────────────────────────────────

#[test]
fn leader_timeout_rotates_after_deadline() {
    let mut h = harness();
    let id = h.submit("alice", "counter", 1);
    h.activate(&id);
    let leader = h.leader(&id);

    let now = h.clock.advance(10);
    assert!(matches!(
        h.engine.check_timeout(&id, now),
        Err(ConsensusError::DeadlineNotReached { .. })
    ));

    let now = h.clock.advance(300);
    assert_eq!(h.engine.check_timeout(&id, now).unwrap(), Proposing);
    assert_ne!(h.leader(&id), leader);

    let now = h.clock.advance(300);
    assert_eq!(h.engine.check_timeout(&id, now).unwrap(), Undetermined);
}

#[test]
fn commit_timeout_reveals_what_was_committed() {
    let mut h = harness();
    let id = h.submit("alice", "counter", 0);
    h.activate(&id);
    h.propose(&id, Vec::new());

    let committee = h.committee(&id);
    let votes = [Agree, Agree, Agree];
    assert_eq!(h.vote(&id, &votes), Committing);

    let now = h.clock.advance(300);
    assert_eq!(h.engine.check_timeout(&id, now).unwrap(), Revealing);

    let mut status = Revealing;
    for (i, member) in committee.iter().take(3).enumerate() {
        let commitment = vote_commitment(member, Agree, &[i as u8; 32]);
        let now = h.clock.advance(1);
        status = h
            .engine
            .reveal_vote(&id, member, commitment, Agree, [i as u8; 32], now)
            .unwrap();
    }
    // 3 of 5 agree: a simple majority.
    assert_eq!(status, Accepted);
}

#[test]
fn reveal_timeout_counts_silence_as_abstention() {
    let mut h = harness();
    let id = h.submit("alice", "counter", 0);
    h.activate(&id);
    h.propose(&id, Vec::new());

    let committee = h.committee(&id);
    for (i, member) in committee.iter().enumerate() {
        let commitment = vote_commitment(member, Agree, &[i as u8; 32]);
        let now = h.clock.advance(1);
        h.engine.commit_vote(&id, member, commitment, now).unwrap();
    }
    for (i, member) in committee.iter().take(2).enumerate() {
        let commitment = vote_commitment(member, Agree, &[i as u8; 32]);
        let now = h.clock.advance(1);
        h.engine
            .reveal_vote(&id, member, commitment, Agree, [i as u8; 32], now)
            .unwrap();
    }

    let now = h.clock.advance(300);
    assert_eq!(h.engine.check_timeout(&id, now).unwrap(), Undetermined);
    let round = h.engine.transaction(&id).unwrap().active_round().unwrap().clone();
    assert_eq!(round.result, verdict_types::RoundResult::NoMajority);
}

#[test]
fn timeout_on_pending_is_rejected() {
    let mut h = harness();
    let id = h.submit("alice", "counter", 0);
    let now = h.clock.advance(10_000);
    assert_eq!(
        h.engine.check_timeout(&id, now),
        Err(ConsensusError::InvalidStateTransition {
            operation: "check_timeout",
            status: Pending
        })
    );
}

// ── Votes ────────────────────────────────────────────────────────────────

#[test]
fn mismatched_reveal_is_rejected_without_change() {
    let mut h = harness();
    let id = h.submit("alice", "counter", 0);
    h.activate(&id);
    h.propose(&id, Vec::new());
    let committee = h.committee(&id);

    for (i, member) in committee.iter().enumerate() {
        let commitment = vote_commitment(member, Agree, &[i as u8; 32]);
        let now = h.clock.advance(1);
        h.engine.commit_vote(&id, member, commitment, now).unwrap();
    }
    let before = h.engine.transaction(&id).unwrap().clone();

    let member = &committee[0];
    let commitment = vote_commitment(member, Agree, &[0u8; 32]);
    let now = h.clock.advance(1);
    assert!(matches!(
        h.engine.reveal_vote(&id, member, commitment, Disagree, [0u8; 32], now),
        Err(ConsensusError::InvalidVoteProof(_))
    ));
    assert_eq!(h.engine.transaction(&id).unwrap(), &before);
}

#[test]
fn double_commit_is_rejected() {
    let mut h = harness();
    let id = h.submit("alice", "counter", 0);
    h.activate(&id);
    h.propose(&id, Vec::new());
    let member = h.committee(&id)[0].clone();
    let now = h.clock.advance(1);
    h.engine.commit_vote(&id, &member, [1u8; 32], now).unwrap();
    assert_eq!(
        h.engine.commit_vote(&id, &member, [2u8; 32], now),
        Err(ConsensusError::AlreadyVoted(member.to_string()))
    );
}

// ── Queues ───────────────────────────────────────────────────────────────

#[test]
fn activation_and_finalization_follow_queue_order() {
    let mut h = harness();
    let first = h.submit("alice", "counter", 0);
    let second = h.submit("bob", "counter", 0);

    let activator = h.engine.transaction(&second).unwrap().activator.clone();
    let now = h.clock.advance(1);
    assert!(matches!(
        h.engine.activate(&second, &activator, &proof(), now),
        Err(ConsensusError::QueueOrderingViolation(_))
    ));

    h.activate(&first);
    h.propose(&first, Vec::new());
    h.accept(&second);
    h.vote(&first, &[Agree; 5]);

    let now = h.clock.advance(2_000);
    assert!(matches!(
        h.engine.finalize(&second, now),
        Err(ConsensusError::QueueOrderingViolation(_))
    ));
    h.engine.finalize(&first, now).unwrap();
    h.engine.finalize(&second, now).unwrap();
    assert_eq!(h.engine.queue(&v("counter")).unwrap().finalized_count(), 2);
}

#[test]
fn recipients_do_not_block_each_other() {
    let mut h = harness();
    let _blocked = h.submit("alice", "one", 0);
    let other = h.submit("bob", "two", 0);
    h.activate(&other);
    assert_eq!(h.status(&other), Proposing);
}

#[test]
fn cancel_refunds_pending_head() {
    let mut h = harness();
    let first = h.submit("alice", "counter", 0);
    let second = h.submit("bob", "counter", 0);

    let now = h.clock.advance(1);
    assert!(matches!(
        h.engine.cancel(&second, &v("bob"), now),
        Err(ConsensusError::QueueOrderingViolation(_))
    ));
    assert!(matches!(
        h.engine.cancel(&first, &v("bob"), now),
        Err(ConsensusError::NotAuthorized { role: Role::Submitter, .. })
    ));

    h.engine.cancel(&first, &v("alice"), now).unwrap();
    assert_eq!(h.status(&first), Canceled);
    let refund = h.engine.drain_events().into_iter().find_map(|e| match e {
        EngineEvent::FeesDistributed { distribution, .. } => Some(distribution),
        _ => None,
    });
    assert_eq!(refund.unwrap().paid_to(&v("alice")), DEPOSIT);

    // The next transaction becomes the head, for activation and finality.
    h.activate(&second);
    assert_eq!(h.status(&second), Proposing);
}

#[test]
fn activated_transaction_cannot_be_canceled() {
    let mut h = harness();
    let id = h.submit("alice", "counter", 0);
    h.activate(&id);
    let now = h.clock.advance(1);
    assert_eq!(
        h.engine.cancel(&id, &v("alice"), now),
        Err(ConsensusError::InvalidStateTransition {
            operation: "cancel",
            status: Proposing
        })
    );
}

// ── Fees and submission ──────────────────────────────────────────────────

#[test]
fn submission_requires_minimum_fees() {
    let mut h = harness();
    let mut low = submission("alice", "counter", 2);
    low.fee_deposit = 449;
    let now = h.clock.now();
    assert_eq!(
        h.engine.submit(low, now),
        Err(ConsensusError::InsufficientFees {
            required: 450,
            provided: 449
        })
    );
    assert_eq!(h.engine.stats().get("rejected"), 1);
}

#[test]
fn later_depositor_receives_residual() {
    let mut h = harness();
    let id = h.submit("alice", "counter", 0);
    h.engine.deposit_fees(&id, &v("sponsor"), 500).unwrap();
    h.accept(&id);
    let now = h.clock.advance(1_800);
    h.engine.finalize(&id, now).unwrap();

    let distribution = h
        .engine
        .drain_events()
        .into_iter()
        .find_map(|e| match e {
            EngineEvent::FeesDistributed { distribution, .. } => Some(distribution),
            _ => None,
        })
        .unwrap();
    assert_eq!(distribution.paid_to(&v("sponsor")), DEPOSIT + 500 - 150);
    assert_eq!(distribution.paid_to(&v("alice")), 0);
}

#[test]
fn missing_recipient_creates_managed_account() {
    let mut h = harness();
    let mut sub = submission("alice", "unused", 0);
    sub.recipient = None;
    let now = h.clock.now();
    let first = h.engine.submit(sub.clone(), now).unwrap();
    let second = h.engine.submit(sub, now).unwrap();

    let tx = h.engine.transaction(&first).unwrap();
    assert!(tx.creates_account);
    assert_eq!(tx.recipient, derive_account_address(&v("alice"), 0));
    let tx2 = h.engine.transaction(&second).unwrap();
    assert_eq!(tx2.recipient, derive_account_address(&v("alice"), 1));
    assert_ne!(first, second);
}

// ── Messages ─────────────────────────────────────────────────────────────

#[test]
fn receipt_messages_are_released_by_phase() {
    let mut h = harness();
    let id = h.submit("alice", "counter", 0);
    h.activate(&id);
    let messages = vec![
        DownstreamMessage::internal(v("ledger"), b"credit".to_vec(), MessagePhase::OnAcceptance, DEPOSIT),
        DownstreamMessage::external(v("bridge"), b"notify".to_vec(), MessagePhase::OnFinalization),
    ];
    h.propose(&id, messages);
    assert_eq!(h.vote(&id, &[Agree; 5]), Accepted);

    let child = h
        .engine
        .queue(&v("ledger"))
        .unwrap()
        .pending()
        .head_id()
        .unwrap();
    let child_tx = h.engine.transaction(&child).unwrap();
    assert_eq!(child_tx.sender, v("counter"));
    assert_eq!(child_tx.origin, Some(id));
    assert!(h.dispatcher.sent().is_empty());

    let now = h.clock.advance(1_800);
    h.engine.finalize(&id, now).unwrap();
    let sent = h.dispatcher.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, id);
    assert_eq!(sent[0].1.target, v("bridge"));

    let dispatched: Vec<_> = h
        .engine
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, EngineEvent::MessagesDispatched { .. }))
        .collect();
    assert_eq!(dispatched.len(), 2);
}

#[test]
fn underfunded_internal_message_is_dropped() {
    let mut h = harness();
    let id = h.submit("alice", "counter", 0);
    h.activate(&id);
    let messages = vec![DownstreamMessage::internal(
        v("ledger"),
        b"credit".to_vec(),
        MessagePhase::OnAcceptance,
        1,
    )];
    h.propose(&id, messages);
    assert_eq!(h.vote(&id, &[Agree; 5]), Accepted);
    assert!(h.engine.queue(&v("ledger")).is_none());
    assert_eq!(h.engine.stats().get("messages_failed"), 1);
}

// ── Persistence ──────────────────────────────────────────────────────────

#[test]
fn failed_commit_leaves_state_untouched() {
    let mut h = harness();
    let id = h.submit("alice", "counter", 0);
    let before_tx = h.engine.transaction(&id).unwrap().clone();
    let before_store = h.store.dump();
    let commits = h.store.commit_count();

    h.store.fail_next_commit();
    let activator = before_tx.activator.clone();
    let now = h.clock.advance(1);
    assert!(matches!(
        h.engine.activate(&id, &activator, &proof(), now),
        Err(ConsensusError::Store(_))
    ));
    assert_eq!(h.engine.transaction(&id).unwrap(), &before_tx);
    assert_eq!(h.store.dump(), before_store);
    assert_eq!(h.store.commit_count(), commits);
    assert!(h.engine.queue(&v("counter")).unwrap().is_pending_head(&id));

    h.engine.activate(&id, &activator, &proof(), now).unwrap();
    assert_eq!(h.status(&id), Proposing);
}

#[test]
fn failed_commit_leaves_outcome_counters_alone() {
    let mut h = harness();
    let id = h.submit("alice", "counter", 1);
    h.activate(&id);

    let leader = h.leader(&id);
    let now = h.clock.advance(1);
    h.store.fail_next_commit();
    assert!(h
        .engine
        .propose_receipt(&id, &leader, Vec::new(), Vec::new(), &proof(), now)
        .is_err());
    assert_eq!(h.engine.stats().get("rotations"), 0);

    h.propose(&id, Vec::new());
    let committee = h.committee(&id);
    let commitments: Vec<[u8; 32]> = committee
        .iter()
        .enumerate()
        .map(|(i, m)| vote_commitment(m, Agree, &[i as u8; 32]))
        .collect();
    for (member, commitment) in committee.iter().zip(&commitments) {
        let now = h.clock.advance(1);
        h.engine.commit_vote(&id, member, *commitment, now).unwrap();
    }
    for (i, member) in committee.iter().enumerate().take(4) {
        let now = h.clock.advance(1);
        h.engine
            .reveal_vote(&id, member, commitments[i], Agree, [i as u8; 32], now)
            .unwrap();
    }

    let now = h.clock.advance(1);
    h.store.fail_next_commit();
    assert!(matches!(
        h.engine.reveal_vote(&id, &committee[4], commitments[4], Agree, [4u8; 32], now),
        Err(ConsensusError::Store(_))
    ));
    assert_eq!(h.status(&id), Revealing);
    assert_eq!(h.engine.stats().get("accepted"), 0);

    let status = h
        .engine
        .reveal_vote(&id, &committee[4], commitments[4], Agree, [4u8; 32], now)
        .unwrap();
    assert_eq!(status, Accepted);
    assert_eq!(h.engine.stats().get("accepted"), 1);
}

#[test]
fn restore_rebuilds_engine_from_store() {
    let mut h = harness();
    let first = h.submit("alice", "counter", 0);
    let second = h.submit("alice", "counter", 0);
    h.accept(&first);
    assert_eq!(h.store.len(KeySpace::Transactions), 2);

    let pool = StakeRegistry::with_stakes((0..40).map(|i| (validator(i), 100)), h.clock.now());
    let mut restored = Coordinator::restore(
        EngineParams::default(),
        pool,
        h.store.clone(),
        Arc::new(NullVerifier::new()),
        Arc::new(NullDispatcher::new()),
    )
    .unwrap();
    assert_eq!(restored.transaction(&first), h.engine.transaction(&first));
    assert_eq!(restored.transaction(&second).unwrap().status, Pending);

    // The sender nonce survived: a third submission gets a fresh id.
    let now = h.clock.advance(1);
    let third = restored.submit(submission("alice", "counter", 0), now).unwrap();
    assert!(third != first && third != second);

    let now = h.clock.advance(1_800);
    restored.finalize(&first, now).unwrap();
    assert_eq!(restored.transaction(&first).unwrap().status, Finalized);
}

#[test]
fn finalization_refreshes_the_validator_snapshot() {
    let mut h = harness();
    let id = h.submit("alice", "counter", 0);
    h.accept(&id);
    h.engine.pool_mut().stake(&v("newcomer"), 100);
    assert!(!h.engine.pool().is_validator(&v("newcomer")));

    let now = h.clock.advance(1_800);
    h.engine.finalize(&id, now).unwrap();
    assert!(h.engine.pool().is_validator(&v("newcomer")));
}

// ── Randomness proofs ────────────────────────────────────────────────────

#[test]
fn signature_verifier_gates_activation_and_proposal() {
    let keys: Vec<KeyPair> = (1..=30u8).map(|i| keypair_from_seed(&[i; 32])).collect();
    let address_of = |kp: &KeyPair| derive_address(&kp.public);
    let key_for = |who: &Address| keys.iter().find(|kp| &address_of(kp) == who).unwrap();

    let clock = NullClock::new(1_000);
    let pool = StakeRegistry::with_stakes(keys.iter().map(|kp| (address_of(kp), 100)), clock.now());
    let mut engine = Coordinator::new(
        EngineParams::default(),
        pool,
        Arc::new(NullStore::new()),
        Arc::new(SignatureVerifier),
        Arc::new(NullDispatcher::new()),
    );
    let id = engine
        .submit(submission("alice", "counter", 0), clock.now())
        .unwrap();

    let tx = engine.transaction(&id).unwrap().clone();
    let activator = tx.activator.clone();
    let forged = prove(&keypair_from_seed(&[99u8; 32]).private, &tx.seed);
    assert!(matches!(
        engine.activate(&id, &activator, &forged, clock.advance(1)),
        Err(ConsensusError::InvalidRandomnessProof(_))
    ));

    let genuine = prove(&key_for(&activator).private, &tx.seed);
    engine.activate(&id, &activator, &genuine, clock.advance(1)).unwrap();

    let tx = engine.transaction(&id).unwrap().clone();
    let leader = tx.active_round().unwrap().leader().clone();
    let leader_proof = prove(&key_for(&leader).private, &tx.seed);
    let status = engine
        .propose_receipt(&id, &leader, b"r".to_vec(), Vec::new(), &leader_proof, clock.advance(1))
        .unwrap();
    assert_eq!(status, Committing);
    assert_ne!(engine.transaction(&id).unwrap().seed, tx.seed);
}
