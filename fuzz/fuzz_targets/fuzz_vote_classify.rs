#![no_main]

use libfuzzer_sys::fuzz_target;
use verdict_types::VoteType;

// Classify arbitrary vote vectors. The result must not depend on order and
// a reported direction must hold a strict majority.
fuzz_target!(|data: &[u8]| {
    let votes: Vec<VoteType> = data
        .iter()
        .filter_map(|b| VoteType::from_byte(b % 5))
        .collect();

    let result = verdict_consensus::classify_votes(&votes);

    let mut reversed = votes.clone();
    reversed.reverse();
    assert_eq!(result, verdict_consensus::classify_votes(&reversed));

    if let Some(direction) = result.polarity() {
        let count = votes.iter().filter(|v| **v == direction).count();
        assert!(count * 2 > votes.len());
    }
});
