//! Validator pool.
//!
//! The consensus engine consumes validators only through [`ValidatorPool`]:
//! weighted sampling without replacement, activator lookup, and membership
//! checks, all answered from a snapshot frozen at the last finalization.
//! [`StakeRegistry`] is the in-process implementation.

pub mod error;
pub mod registry;
pub mod snapshot;

pub use error::PoolError;
pub use registry::StakeRegistry;
pub use snapshot::{Sample, WeightSnapshot};

use verdict_types::{Address, Timestamp};
use verdict_vrf::RandomSeed;

/// Weighted-sampling oracle over a frozen stake snapshot.
pub trait ValidatorPool: Send + Sync {
    /// Draw `count` distinct validators not in `excluded`, plus a leader index.
    fn sample_validators(
        &self,
        seed: &RandomSeed,
        count: usize,
        excluded: &[Address],
    ) -> Result<Sample, PoolError>;

    /// The identity that must activate a transaction carrying `seed`.
    fn activator_for_seed(&self, seed: &RandomSeed) -> Result<Address, PoolError>;

    /// Staked and not banned in the current snapshot.
    fn is_validator(&self, who: &Address) -> bool;

    fn is_banned(&self, who: &Address) -> bool;

    /// Freeze the live registry into a new snapshot.
    fn refresh_snapshot(&mut self, now: Timestamp);
}
