//! Live stake registry.
//!
//! Stake changes, slashes and bans apply to the live tables immediately but
//! only reach sampling through [`StakeRegistry::refresh_snapshot`], which the
//! engine calls at each finalization boundary.

use crate::error::PoolError;
use crate::snapshot::{Sample, WeightSnapshot};
use crate::ValidatorPool;
use std::collections::{BTreeMap, BTreeSet};
use verdict_types::{Address, Timestamp};
use verdict_vrf::RandomSeed;

/// Stake and ban bookkeeping with a frozen snapshot for sampling.
#[derive(Debug, Default)]
pub struct StakeRegistry {
    stakes: BTreeMap<Address, u128>,
    /// validator → ban expiry.
    bans: BTreeMap<Address, Timestamp>,
    snapshot: WeightSnapshot,
}

impl StakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry and take its first snapshot.
    pub fn with_stakes(stakes: impl IntoIterator<Item = (Address, u128)>, now: Timestamp) -> Self {
        let mut registry = Self::new();
        for (validator, amount) in stakes {
            registry.stake(&validator, amount);
        }
        registry.refresh_snapshot(now);
        registry
    }

    pub fn stake(&mut self, validator: &Address, amount: u128) {
        let entry = self.stakes.entry(validator.clone()).or_insert(0);
        *entry = entry.saturating_add(amount);
    }

    pub fn unstake(&mut self, validator: &Address, amount: u128) -> Result<(), PoolError> {
        let staked = self
            .stakes
            .get_mut(validator)
            .ok_or_else(|| PoolError::UnknownValidator(validator.to_string()))?;
        if *staked < amount {
            return Err(PoolError::InsufficientStake {
                validator: validator.to_string(),
                requested: amount,
                staked: *staked,
            });
        }
        *staked -= amount;
        if *staked == 0 {
            self.stakes.remove(validator);
        }
        Ok(())
    }

    /// Remove up to `amount` of stake. Returns the amount actually slashed.
    pub fn slash(&mut self, validator: &Address, amount: u128) -> u128 {
        let Some(staked) = self.stakes.get_mut(validator) else {
            return 0;
        };
        let slashed = amount.min(*staked);
        *staked -= slashed;
        if *staked == 0 {
            self.stakes.remove(validator);
        }
        tracing::info!(validator = %validator, slashed, "validator slashed");
        slashed
    }

    pub fn ban(&mut self, validator: &Address, until: Timestamp) {
        tracing::info!(validator = %validator, until = %until, "validator banned");
        self.bans.insert(validator.clone(), until);
    }

    pub fn unban(&mut self, validator: &Address) {
        self.bans.remove(validator);
    }

    pub fn stake_of(&self, validator: &Address) -> u128 {
        self.stakes.get(validator).copied().unwrap_or(0)
    }

    pub fn snapshot(&self) -> &WeightSnapshot {
        &self.snapshot
    }
}

impl ValidatorPool for StakeRegistry {
    fn sample_validators(
        &self,
        seed: &RandomSeed,
        count: usize,
        excluded: &[Address],
    ) -> Result<Sample, PoolError> {
        let sample = self.snapshot.sample(seed, count, excluded)?;
        tracing::debug!(
            count,
            excluded = excluded.len(),
            epoch = self.snapshot.epoch(),
            "validators sampled"
        );
        Ok(sample)
    }

    fn activator_for_seed(&self, seed: &RandomSeed) -> Result<Address, PoolError> {
        self.snapshot.activator(seed)
    }

    fn is_validator(&self, who: &Address) -> bool {
        self.snapshot.is_eligible(who)
    }

    fn is_banned(&self, who: &Address) -> bool {
        self.snapshot.is_banned(who)
    }

    fn refresh_snapshot(&mut self, now: Timestamp) {
        self.bans.retain(|_, until| *until > now);
        let banned: BTreeSet<Address> = self.bans.keys().cloned().collect();
        let epoch = self.snapshot.epoch() + 1;
        self.snapshot = WeightSnapshot::new(self.stakes.clone(), banned, epoch);
        tracing::debug!(
            epoch,
            validators = self.snapshot.len(),
            "validator snapshot refreshed"
        );
    }
}
