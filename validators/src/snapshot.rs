//! Frozen weight snapshot and the weighted sampler.
//!
//! Sampling is a pure function of `(snapshot, seed, count, excluded)`, so any
//! node holding the same snapshot reproduces the same committee.
//!
//! Algorithm (without replacement): candidates are every staked validator not
//! in `excluded`, in address order. Draw `i` takes
//! `u128_le(blake2b(seed || i)[..16]) mod remaining_weight` and walks the
//! cumulative weights to a candidate. Banned validators keep their weight in
//! the walk; a draw that lands on one moves forward (wrapping) to the next
//! unbanned candidate. The chosen candidate leaves the pool before the next
//! draw. The leader is `seed mod count`.

use crate::error::PoolError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use verdict_crypto::blake2b_256_multi;
use verdict_types::Address;
use verdict_vrf::RandomSeed;

/// A sampled committee.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sample {
    pub validators: Vec<Address>,
    /// Index of the leader within `validators`.
    pub leader_index: usize,
}

/// Stake weights and bans as of the last finalization boundary.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightSnapshot {
    weights: BTreeMap<Address, u128>,
    banned: BTreeSet<Address>,
    /// Incremented on every refresh.
    epoch: u64,
}

impl WeightSnapshot {
    pub fn new(weights: BTreeMap<Address, u128>, banned: BTreeSet<Address>, epoch: u64) -> Self {
        Self {
            weights: weights.into_iter().filter(|(_, w)| *w > 0).collect(),
            banned,
            epoch,
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn weight(&self, validator: &Address) -> u128 {
        self.weights.get(validator).copied().unwrap_or(0)
    }

    pub fn is_banned(&self, validator: &Address) -> bool {
        self.banned.contains(validator)
    }

    /// Staked and not banned.
    pub fn is_eligible(&self, validator: &Address) -> bool {
        self.weights.contains_key(validator) && !self.is_banned(validator)
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Draw `count` distinct validators, none of them in `excluded`.
    pub fn sample(
        &self,
        seed: &RandomSeed,
        count: usize,
        excluded: &[Address],
    ) -> Result<Sample, PoolError> {
        if !self.weights.keys().any(|v| !self.is_banned(v)) {
            return Err(PoolError::NoValidatorsAvailable);
        }
        let excluded: HashSet<&Address> = excluded.iter().collect();
        let mut candidates: Vec<(&Address, u128)> = self
            .weights
            .iter()
            .filter(|(v, _)| !excluded.contains(v))
            .map(|(v, w)| (v, *w))
            .collect();

        let available = candidates.iter().filter(|(v, _)| !self.is_banned(v)).count();
        if available < count {
            return Err(PoolError::AllValidatorsConsumed {
                requested: count,
                available,
            });
        }

        let mut validators = Vec::with_capacity(count);
        for draw in 0..count as u64 {
            let total: u128 = candidates.iter().map(|(_, w)| *w).sum();
            let target = draw_value(seed, b"sample", draw) % total;
            let landed = cumulative_index(&candidates, target);
            let chosen = self.next_unbanned(&candidates, landed);
            validators.push(candidates.remove(chosen).0.clone());
        }

        let leader_index = if count == 0 {
            0
        } else {
            (seed.as_u128() % count as u128) as usize
        };
        Ok(Sample {
            validators,
            leader_index,
        })
    }

    /// Weighted draw of the single identity responsible for activating
    /// transactions carrying `seed`.
    pub fn activator(&self, seed: &RandomSeed) -> Result<Address, PoolError> {
        let candidates: Vec<(&Address, u128)> = self.weights.iter().map(|(v, w)| (v, *w)).collect();
        if !candidates.iter().any(|(v, _)| !self.is_banned(v)) {
            return Err(PoolError::NoValidatorsAvailable);
        }
        let total: u128 = candidates.iter().map(|(_, w)| *w).sum();
        let target = draw_value(seed, b"activator", 0) % total;
        let landed = cumulative_index(&candidates, target);
        let chosen = self.next_unbanned(&candidates, landed);
        Ok(candidates[chosen].0.clone())
    }

    /// First unbanned candidate at or after `start`, wrapping. Callers
    /// guarantee one exists.
    fn next_unbanned(&self, candidates: &[(&Address, u128)], start: usize) -> usize {
        (0..candidates.len())
            .map(|offset| (start + offset) % candidates.len())
            .find(|&i| !self.is_banned(candidates[i].0))
            .unwrap_or(start)
    }
}

fn draw_value(seed: &RandomSeed, domain: &[u8], draw: u64) -> u128 {
    let digest = blake2b_256_multi(&[domain, seed.as_bytes(), &draw.to_le_bytes()]);
    let mut buf = [0u8; 16];
    buf.copy_from_slice(&digest[..16]);
    u128::from_le_bytes(buf)
}

fn cumulative_index(candidates: &[(&Address, u128)], target: u128) -> usize {
    let mut acc = 0u128;
    for (i, (_, w)) in candidates.iter().enumerate() {
        acc = acc.saturating_add(*w);
        if target < acc {
            return i;
        }
    }
    candidates.len() - 1
}
