use proptest::prelude::*;
use std::collections::HashSet;

use verdict_types::{Address, Timestamp};
use verdict_validators::{StakeRegistry, ValidatorPool};
use verdict_vrf::RandomSeed;

fn addr(i: usize) -> Address {
    Address::new(format!("vrd_v{i:04}"))
}

proptest! {
    /// A sample never repeats a validator and never includes an excluded one.
    #[test]
    fn sample_is_distinct_and_disjoint(
        weights in prop::collection::vec(1u128..10_000, 8..40),
        seed in prop::array::uniform32(0u8..),
        excluded_count in 0usize..8,
    ) {
        let pool = StakeRegistry::with_stakes(
            weights.iter().enumerate().map(|(i, w)| (addr(i), *w)),
            Timestamp::new(0),
        );
        let excluded: Vec<Address> = (0..excluded_count).map(addr).collect();
        let count = weights.len() - excluded_count;
        let sample = pool.sample_validators(&RandomSeed(seed), count, &excluded).unwrap();

        let unique: HashSet<_> = sample.validators.iter().collect();
        prop_assert_eq!(unique.len(), count);
        prop_assert!(sample.validators.iter().all(|v| !excluded.contains(v)));
    }

    /// The same inputs always produce the same committee and leader.
    #[test]
    fn sampling_is_reproducible(
        weights in prop::collection::vec(1u128..1_000, 5..20),
        seed in prop::array::uniform32(0u8..),
    ) {
        let pool = StakeRegistry::with_stakes(
            weights.iter().enumerate().map(|(i, w)| (addr(i), *w)),
            Timestamp::new(0),
        );
        let a = pool.sample_validators(&RandomSeed(seed), 5, &[]).unwrap();
        let b = pool.sample_validators(&RandomSeed(seed), 5, &[]).unwrap();
        prop_assert_eq!(a, b);
    }
}
