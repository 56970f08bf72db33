//! Round engine: committee draws, leader rotation and commit-reveal voting.
//!
//! These functions mutate a staged [`Transaction`] and touch nothing else;
//! the coordinator decides when to call them and persists the result.
//! Every validator drawn for a transaction joins its consumed list and is
//! excluded from every later draw for that transaction.

use verdict_crypto::{verify_vote_commitment, VoteNonce};
use verdict_types::{Address, EngineParams, RoundResult, VoteType};
use verdict_validators::ValidatorPool;

use crate::error::ConsensusError;
use crate::majority::classify_votes;
use crate::roles::Role;
use crate::transaction::{broken, RoundRecord, Transaction};

/// Committee size for normal round `index`.
pub fn validators_for_round(params: &EngineParams, index: u32) -> usize {
    params.validators_for_round(index) as usize
}

/// Draw `size` fresh validators and open normal round `index`.
pub fn start_round(
    tx: &mut Transaction,
    pool: &dyn ValidatorPool,
    index: u32,
    size: usize,
) -> Result<(), ConsensusError> {
    if index % 2 == 1 {
        broken(&tx.id, "normal round started at an odd index");
    }
    let sample = pool.sample_validators(&tx.seed, size, &tx.consumed)?;
    tx.consumed.extend(sample.validators.iter().cloned());
    tx.rounds.push(RoundRecord::new(
        index,
        sample.validators,
        sample.leader_index,
        tx.max_rotations,
    ));
    tracing::debug!(tx = %tx.id, round = index, size, "round started");
    Ok(())
}

/// Open the normal round that follows a successful appeal.
///
/// The committee is the challenged round's committee without its leader,
/// plus the appeal committee, topped up with fresh draws when the merge
/// falls short of the size table. The appeal sits at `index - 1`; the
/// round it challenged is read from its appeal record, since a failed
/// earlier appeal pushes later ones further from their normal round.
pub fn start_continuity_round(
    tx: &mut Transaction,
    pool: &dyn ValidatorPool,
    params: &EngineParams,
    index: u32,
) -> Result<(), ConsensusError> {
    if index < 2 || index % 2 == 1 {
        broken(&tx.id, "continuity round needs an even index after an appeal");
    }
    let Some(challenged_round) = tx
        .appeals
        .iter()
        .find(|a| a.round == index - 1)
        .map(|a| a.challenged_round)
    else {
        broken(&tx.id, "continuity round without its appeal record");
    };
    let (Some(challenged), Some(appeal)) = (tx.round(challenged_round), tx.round(index - 1)) else {
        broken(&tx.id, "continuity round without its appeal pair");
    };

    let old_leader = challenged.leader().clone();
    let mut validators: Vec<Address> = challenged
        .validators
        .iter()
        .filter(|v| **v != old_leader)
        .cloned()
        .collect();
    for v in &appeal.validators {
        if !validators.contains(v) {
            validators.push(v.clone());
        }
    }

    let target = validators_for_round(params, index);
    if validators.len() < target {
        let topup = pool.sample_validators(&tx.seed, target - validators.len(), &tx.consumed)?;
        tx.consumed.extend(topup.validators.iter().cloned());
        validators.extend(topup.validators);
    }

    let leader_index = (tx.seed.as_u128() % validators.len() as u128) as usize;
    let size = validators.len();
    tx.rounds.push(RoundRecord::new(
        index,
        validators,
        leader_index,
        tx.max_rotations,
    ));
    tracing::debug!(tx = %tx.id, round = index, size, "continuity round started");
    Ok(())
}

/// Replace the active round's leader with one fresh draw and pick a new
/// leader over the updated committee. Returns `(old, new)` leaders.
pub fn rotate_leader(
    tx: &mut Transaction,
    pool: &dyn ValidatorPool,
) -> Result<(Address, Address), ConsensusError> {
    let (index, rotation, rotations_left) = {
        let round = tx.expect_round();
        (round.index, round.rotation, round.rotations_left)
    };
    if rotations_left == 0 {
        broken(&tx.id, "leader rotation with no rotations left");
    }

    let seed = tx.seed.rotation(index, rotation + 1);
    let sample = pool.sample_validators(&seed, 1, &tx.consumed)?;
    let Some(replacement) = sample.validators.into_iter().next() else {
        broken(&tx.id, "pool returned an empty single draw");
    };
    tx.seed = seed;
    tx.consumed.push(replacement.clone());

    let round = tx.expect_round_mut();
    let slot = round.leader_index;
    let old = std::mem::replace(&mut round.validators[slot], replacement);
    round.leader_index = (seed.as_u128() % round.len() as u128) as usize;
    round.rotation += 1;
    round.rotations_left -= 1;
    round.reset_votes();
    let new = round.leader().clone();
    Ok((old, new))
}

/// Record `validator`'s vote commitment. Returns true on the commit that
/// completes the committee.
pub fn commit(
    round: &mut RoundRecord,
    validator: &Address,
    commitment: [u8; 32],
) -> Result<bool, ConsensusError> {
    let pos = position(round, validator)?;
    if round.commits[pos].is_some() {
        return Err(ConsensusError::AlreadyVoted(validator.to_string()));
    }
    round.commits[pos] = Some(commitment);
    round.votes_committed += 1;
    Ok(round.votes_committed == round.len())
}

/// Open `validator`'s commitment. Returns true on the reveal that matches
/// the number of commitments made.
pub fn reveal(
    round: &mut RoundRecord,
    validator: &Address,
    commitment: &[u8; 32],
    vote: VoteType,
    nonce: &VoteNonce,
) -> Result<bool, ConsensusError> {
    let pos = position(round, validator)?;
    let Some(stored) = round.commits[pos] else {
        return Err(ConsensusError::InvalidVoteProof(validator.to_string()));
    };
    if round.votes[pos] != VoteType::NotVoted {
        return Err(ConsensusError::VoteAlreadyRevealed(validator.to_string()));
    }
    if vote == VoteType::NotVoted
        || &stored != commitment
        || !verify_vote_commitment(&stored, validator, vote, nonce)
    {
        return Err(ConsensusError::InvalidVoteProof(validator.to_string()));
    }
    round.votes[pos] = vote;
    round.votes_revealed += 1;
    Ok(round.votes_revealed == round.votes_committed)
}

/// Classify the round's votes and store the result.
pub fn close_round(round: &mut RoundRecord) -> RoundResult {
    round.result = classify_votes(&round.votes);
    round.result
}

fn position(round: &RoundRecord, validator: &Address) -> Result<usize, ConsensusError> {
    round
        .position(validator)
        .ok_or_else(|| ConsensusError::NotAuthorized {
            caller: validator.to_string(),
            role: Role::Validator,
        })
}
