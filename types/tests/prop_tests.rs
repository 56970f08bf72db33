use proptest::prelude::*;

use verdict_types::{EngineParams, RoundResult, Timestamp, TransactionStatus};

fn any_result() -> impl Strategy<Value = RoundResult> {
    prop_oneof![
        Just(RoundResult::Idle),
        Just(RoundResult::Agree),
        Just(RoundResult::Disagree),
        Just(RoundResult::Timeout),
        Just(RoundResult::DeterministicViolation),
        Just(RoundResult::NoMajority),
        Just(RoundResult::MajorityAgree),
        Just(RoundResult::MajorityDisagree),
    ]
}

fn any_status() -> impl Strategy<Value = TransactionStatus> {
    prop_oneof![
        Just(TransactionStatus::Pending),
        Just(TransactionStatus::Proposing),
        Just(TransactionStatus::Committing),
        Just(TransactionStatus::Revealing),
        Just(TransactionStatus::Accepted),
        Just(TransactionStatus::Undetermined),
        Just(TransactionStatus::Finalized),
        Just(TransactionStatus::Canceled),
        Just(TransactionStatus::AppealCommitting),
        Just(TransactionStatus::AppealRevealing),
    ]
}

proptest! {
    /// Result equivalence is symmetric.
    #[test]
    fn equivalence_is_symmetric(a in any_result(), b in any_result()) {
        prop_assert_eq!(a.is_equivalent(b), b.is_equivalent(a));
    }

    /// A result with a polarity is equivalent to itself; one without is not.
    #[test]
    fn equivalence_is_reflexive_only_for_decided_results(a in any_result()) {
        prop_assert_eq!(a.is_equivalent(a), a.polarity().is_some());
    }

    /// Expiry is monotonic in `now`.
    #[test]
    fn expiry_is_monotonic(start in 0u64..1_000_000, dur in 0u64..10_000, dt in 0u64..20_000) {
        let t = Timestamp::new(start);
        let now = Timestamp::new(start + dt);
        if t.has_expired(dur, now) {
            prop_assert!(t.has_expired(dur, now.plus(1)));
        }
    }

    /// Nothing leaves a terminal status.
    #[test]
    fn terminal_statuses_are_sinks(from in any_status(), to in any_status()) {
        if from.is_terminal() {
            prop_assert!(!from.can_transition_to(to));
        }
    }

    /// The deposit floor grows with both committee size and rotation budget.
    #[test]
    fn deposit_floor_is_monotonic(v in 1u32..200, r in 0u32..10) {
        let p = EngineParams::default();
        prop_assert!(p.min_fee_deposit(v + 1, r) >= p.min_fee_deposit(v, r));
        prop_assert!(p.min_fee_deposit(v, r + 1) >= p.min_fee_deposit(v, r));
    }
}
