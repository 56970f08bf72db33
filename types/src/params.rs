//! Engine parameters: committee sizing, phase timeouts, and fee schedule.
//!
//! Every field has a default so partial TOML configuration files work.

use serde::{Deserialize, Serialize};

/// Committee size for each round index. Only even (normal) entries are
/// drawn against. An appeal committee is sized from the validators its
/// transaction has consumed, plus two, so each odd entry is only the
/// smallest appeal of the round before it (no rotations, no earlier
/// appeal). The next normal entry merges that pair minus the old leader.
pub const DEFAULT_VALIDATORS_PER_ROUND: [u32; 17] = [
    5, 7, 11, 13, 23, 25, 47, 49, 95, 97, 191, 193, 383, 385, 767, 769, 1000,
];

/// All tunables consulted by the engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineParams {
    // ── Committees ───────────────────────────────────────────────────────
    /// Validators per round, indexed by round. Rounds past the end reuse
    /// the last entry.
    pub validators_per_round: Vec<u32>,

    /// Round-0 committee size used for internally spawned transactions.
    pub default_validator_count: u32,

    /// Leader rotation budget used for internally spawned transactions.
    pub default_max_rotations: u32,

    // ── Deadlines (seconds) ──────────────────────────────────────────────
    /// How long the current leader has to propose a receipt.
    pub leader_timeout_secs: u64,

    /// Commit window after a receipt is proposed.
    pub commit_timeout_secs: u64,

    /// Reveal window after the commit phase closes.
    pub reveal_timeout_secs: u64,

    /// Commit window of an appeal round.
    pub appeal_commit_timeout_secs: u64,

    /// Reveal window of an appeal round.
    pub appeal_reveal_timeout_secs: u64,

    /// Acceptance grace period: appeals must arrive before it ends,
    /// finalization is only allowed after it ends.
    pub finality_window_secs: u64,

    // ── Fees (raw units) ─────────────────────────────────────────────────
    /// Paid to a leader whose receipt is accepted (half on leader timeout).
    pub leader_fee: u64,

    /// Paid to each aligned validator, per rotation.
    pub validator_fee: u64,
}

impl EngineParams {
    /// Committee size for `round`.
    pub fn validators_for_round(&self, round: u32) -> u32 {
        self.validators_per_round
            .get(round as usize)
            .or_else(|| self.validators_per_round.last())
            .copied()
            .unwrap_or(self.default_validator_count)
    }

    /// Minimum deposit a submitter must post to cover every rotation of the
    /// first round.
    pub fn min_fee_deposit(&self, validators: u32, max_rotations: u32) -> u128 {
        let per_rotation = (self.validator_fee as u128)
            .saturating_mul(validators as u128)
            .saturating_add(self.leader_fee as u128);
        per_rotation.saturating_mul(max_rotations as u128 + 1)
    }

    /// Minimum bond for an appeal round of `appeal_size` validators: a
    /// validator fee per appeal seat plus one leader fee.
    pub fn min_appeal_bond(&self, appeal_size: u32) -> u128 {
        (self.validator_fee as u128)
            .saturating_mul(appeal_size as u128)
            .saturating_add(self.leader_fee as u128)
    }
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            validators_per_round: DEFAULT_VALIDATORS_PER_ROUND.to_vec(),
            default_validator_count: 5,
            default_max_rotations: 3,

            leader_timeout_secs: 300,
            commit_timeout_secs: 300,
            reveal_timeout_secs: 300,
            appeal_commit_timeout_secs: 600,
            appeal_reveal_timeout_secs: 600,
            finality_window_secs: 1800, // 30 minutes

            leader_fee: 100,
            validator_fee: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_entries_cover_the_smallest_appeal_pair() {
        let p = EngineParams::default();
        // Round 0 consumes 5, so its first appeal draws 7.
        assert_eq!(p.validators_for_round(1), 7);
        for round in (0..14).step_by(2) {
            let normal = p.validators_for_round(round);
            let smallest_appeal = p.validators_for_round(round + 1);
            let next = p.validators_for_round(round + 2);
            assert_eq!(smallest_appeal, normal + 2);
            assert!(next >= normal - 1 + smallest_appeal);
        }
    }

    #[test]
    fn rounds_past_the_table_reuse_the_last_entry() {
        let p = EngineParams::default();
        assert_eq!(p.validators_for_round(16), 1000);
        assert_eq!(p.validators_for_round(40), 1000);
    }

    #[test]
    fn empty_table_falls_back_to_default_count() {
        let p = EngineParams {
            validators_per_round: Vec::new(),
            ..EngineParams::default()
        };
        assert_eq!(p.validators_for_round(3), p.default_validator_count);
    }

    #[test]
    fn deposit_covers_every_rotation() {
        let p = EngineParams::default();
        // (100 + 10 * 5) * (2 + 1)
        assert_eq!(p.min_fee_deposit(5, 2), 450);
        assert_eq!(p.min_appeal_bond(7), 170);
    }
}
