//! Vote classification.

use verdict_types::{RoundResult, VoteType};

/// Classify a round's revealed votes.
///
/// Unrevealed positions (`NotVoted`) count toward the committee size but
/// never toward a direction. A direction held by every position is a
/// unanimous result, one held by more than half is a simple majority, and
/// anything else is `NoMajority`. The result does not depend on vote order.
pub fn classify_votes(votes: &[VoteType]) -> RoundResult {
    let n = votes.len();
    if n == 0 {
        return RoundResult::NoMajority;
    }

    let mut counts = [0usize; 5];
    for vote in votes {
        counts[vote.as_byte() as usize] += 1;
    }

    let leading = [
        VoteType::Agree,
        VoteType::Disagree,
        VoteType::Timeout,
        VoteType::DeterministicViolation,
    ]
    .into_iter()
    .map(|vote| (vote, counts[vote.as_byte() as usize]))
    .find(|&(_, count)| count * 2 > n);

    match leading {
        Some((VoteType::Agree, count)) if count == n => RoundResult::MajorityAgree,
        Some((VoteType::Disagree, count)) if count == n => RoundResult::MajorityDisagree,
        Some((VoteType::Agree, _)) => RoundResult::Agree,
        Some((VoteType::Disagree, _)) => RoundResult::Disagree,
        Some((VoteType::Timeout, _)) => RoundResult::Timeout,
        Some((VoteType::DeterministicViolation, _)) => RoundResult::DeterministicViolation,
        Some((VoteType::NotVoted, _)) | None => RoundResult::NoMajority,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use VoteType::*;

    #[test]
    fn unanimous_agreement_is_majority_agree() {
        assert_eq!(classify_votes(&[Agree; 5]), RoundResult::MajorityAgree);
        assert_eq!(classify_votes(&[Disagree; 7]), RoundResult::MajorityDisagree);
    }

    #[test]
    fn split_vote_takes_simple_majority() {
        let votes = [Agree, Disagree, Agree, Disagree, Agree];
        assert_eq!(classify_votes(&votes), RoundResult::Agree);
    }

    #[test]
    fn exact_half_is_no_majority() {
        assert_eq!(classify_votes(&[Agree, Agree, Disagree, Disagree]), RoundResult::NoMajority);
    }

    #[test]
    fn missing_reveals_block_unanimity() {
        assert_eq!(classify_votes(&[Agree, Agree, NotVoted]), RoundResult::Agree);
        assert_eq!(classify_votes(&[Agree, NotVoted, NotVoted]), RoundResult::NoMajority);
        assert_eq!(classify_votes(&[NotVoted; 3]), RoundResult::NoMajority);
    }

    #[test]
    fn timeout_and_violation_majorities() {
        assert_eq!(classify_votes(&[Timeout, Timeout, Agree]), RoundResult::Timeout);
        assert_eq!(
            classify_votes(&[DeterministicViolation; 3]),
            RoundResult::DeterministicViolation
        );
    }

    #[test]
    fn empty_committee_has_no_majority() {
        assert_eq!(classify_votes(&[]), RoundResult::NoMajority);
    }
}
