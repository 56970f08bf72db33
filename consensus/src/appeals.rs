//! Appeal ledger: opening appeals and reconciling their outcome.

use verdict_fees::AppealOutcome;
use verdict_types::{Address, EngineParams, RoundResult};
use verdict_validators::ValidatorPool;

use crate::error::ConsensusError;
use crate::transaction::{broken, Appeal, RoundRecord, Transaction};

/// An appeal committee has two more members than every validator the
/// transaction has consumed so far, rotations and earlier appeals included.
pub fn appeal_size(tx: &Transaction) -> usize {
    tx.consumed.len() + 2
}

/// The smallest bond that pays every appeal validator plus a leader fee.
pub fn required_bond(params: &EngineParams, tx: &Transaction) -> u128 {
    params.min_appeal_bond(appeal_size(tx) as u32)
}

/// The round the next appeal challenges and the index it opens at.
///
/// The first appeal of a decision sits right after the normal round it
/// challenges. Once that appeal has failed, the next one challenges the
/// same normal round from the following odd index.
pub fn next_appeal(tx: &Transaction) -> (u32, u32) {
    let last = tx.expect_round();
    if !last.is_appeal() {
        return (last.index, last.index + 1);
    }
    if tx.open_appeal().is_some() {
        broken(&tx.id, "appeal opened while another is unresolved");
    }
    let Some(challenged) = tx.last_normal_round() else {
        broken(&tx.id, "appeal round without a normal round before it");
    };
    (challenged.index, last.index + 2)
}

/// Whether two round results agree.
pub fn is_equivalent(a: RoundResult, b: RoundResult) -> bool {
    a.is_equivalent(b)
}

/// Draw the appeal committee and open the next appeal of the last normal
/// round. Returns the appeal round index.
pub fn open_appeal(
    tx: &mut Transaction,
    pool: &dyn ValidatorPool,
    appellant: &Address,
    bond: u128,
) -> Result<u32, ConsensusError> {
    let (challenged_round, index) = next_appeal(tx);
    let size = appeal_size(tx);

    let sample = pool.sample_validators(&tx.seed.appeal(index), size, &tx.consumed)?;
    tx.consumed.extend(sample.validators.iter().cloned());
    tx.rounds.push(RoundRecord::new(index, sample.validators, 0, 0));
    tx.appeals.push(Appeal {
        round: index,
        challenged_round,
        appellant: appellant.clone(),
        bond,
        prior_status: tx.status,
        outcome: None,
    });
    tracing::info!(
        tx = %tx.id,
        round = index,
        challenged = challenged_round,
        appellant = %appellant,
        bond,
        size,
        "appeal opened"
    );
    Ok(index)
}

/// Decide the open appeal from its closed round.
///
/// A result equivalent to the challenged round's upholds the original
/// decision. An appeal whose reveal window expired without any strict
/// majority also fails; the challenged decision stands unless outvoted.
pub fn reconcile(tx: &mut Transaction, closed_by_timeout: bool) -> AppealOutcome {
    let appeal_result = tx.expect_round().result;
    let Some(challenged_round) = tx.open_appeal().map(|a| a.challenged_round) else {
        broken(&tx.id, "reconciling without an open appeal");
    };
    let Some(challenged) = tx.round(challenged_round) else {
        broken(&tx.id, "appeal challenges a missing round");
    };

    let outcome = if closed_by_timeout && appeal_result.polarity().is_none() {
        AppealOutcome::Unsuccessful
    } else if is_equivalent(appeal_result, challenged.result) {
        AppealOutcome::Unsuccessful
    } else {
        AppealOutcome::Successful
    };

    let id = tx.id;
    if let Some(appeal) = tx.open_appeal_mut() {
        appeal.outcome = Some(outcome);
    }
    tracing::info!(tx = %id, ?appeal_result, ?outcome, "appeal reconciled");
    outcome
}
