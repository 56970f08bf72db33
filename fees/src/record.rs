//! Fee records kept per round and rotation.

use serde::{Deserialize, Serialize};
use verdict_types::{Address, EngineParams, RoundResult, VoteType};

/// How a round (or one rotation of it) is paid out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoundFeeType {
    /// Leader proposed a receipt: leader and aligned validators are paid.
    NormalRewards,
    /// Leader failed to propose: the leader receives half the leader fee.
    LeaderTimeout50Percent,
    /// Nothing happened at this index (placeholder or not yet resolved).
    EmptyRound,
    /// Superseded by a later outcome: nobody is paid.
    SkipRewards,
    /// Normal rewards plus the previous appeal's forfeited bond, split
    /// among this round's aligned validators.
    SplitPreviousAppealBond,
    AppealSuccessful,
    AppealUnsuccessful,
}

impl RoundFeeType {
    pub fn is_appeal(self) -> bool {
        matches!(self, Self::AppealSuccessful | Self::AppealUnsuccessful)
    }
}

/// One rotation's fee record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundFeeRecord {
    pub rotation: u32,
    pub fee_type: RoundFeeType,
    /// The type assigned at proposal time, restored when a later re-vote
    /// vindicates this round.
    pub provisional: RoundFeeType,
    pub leader: Option<Address>,
    pub validators: Vec<Address>,
    pub votes: Vec<VoteType>,
    pub result: RoundResult,
}

impl RoundFeeRecord {
    pub fn new(rotation: u32, leader: Option<Address>, validators: Vec<Address>) -> Self {
        let votes = vec![VoteType::NotVoted; validators.len()];
        Self {
            rotation,
            fee_type: RoundFeeType::EmptyRound,
            provisional: RoundFeeType::EmptyRound,
            leader,
            validators,
            votes,
            result: RoundResult::Idle,
        }
    }

    /// Validators whose vote sided with this rotation's result.
    pub fn aligned_validators(&self) -> impl Iterator<Item = &Address> {
        self.validators
            .iter()
            .zip(&self.votes)
            .filter(|(_, vote)| self.result.aligns_with(**vote))
            .map(|(v, _)| v)
    }
}

/// All fee records for one round index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundFees {
    pub round: u32,
    /// Indexed by rotation; appeal rounds have exactly one.
    pub rotations: Vec<RoundFeeRecord>,
    pub appealer: Option<Address>,
    pub bond: u128,
    /// Normal round an appeal round challenges.
    #[serde(default)]
    pub challenged: Option<u32>,
}

impl RoundFees {
    pub fn empty(round: u32) -> Self {
        Self {
            round,
            rotations: Vec::new(),
            appealer: None,
            bond: 0,
            challenged: None,
        }
    }

    /// The rotation that decided the round.
    pub fn last(&self) -> Option<&RoundFeeRecord> {
        self.rotations.last()
    }

    pub fn last_mut(&mut self) -> Option<&mut RoundFeeRecord> {
        self.rotations.last_mut()
    }

    /// The round's type is the deciding rotation's type.
    pub fn fee_type(&self) -> RoundFeeType {
        self.last()
            .map(|r| r.fee_type)
            .unwrap_or(RoundFeeType::EmptyRound)
    }

    pub fn result(&self) -> RoundResult {
        self.last().map(|r| r.result).unwrap_or_default()
    }
}

/// Fixed fees applied at settlement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeeSchedule {
    pub leader_fee: u128,
    pub validator_fee: u128,
}

impl From<&EngineParams> for FeeSchedule {
    fn from(params: &EngineParams) -> Self {
        Self {
            leader_fee: params.leader_fee as u128,
            validator_fee: params.validator_fee as u128,
        }
    }
}

/// Why a payout was made.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayoutReason {
    LeaderFee,
    LeaderTimeoutFee,
    ValidatorFee,
    AppealBondReturn,
    AppealReward,
    ForfeitedBond,
    BondSplit,
    Refund,
    Residual,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub recipient: Address,
    pub amount: u128,
    pub reason: PayoutReason,
}

/// The result of settling or refunding a fee book.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeDistribution {
    pub payouts: Vec<Payout>,
}

impl FeeDistribution {
    pub fn total(&self) -> u128 {
        self.payouts.iter().map(|p| p.amount).sum()
    }

    /// Sum paid to `who` across all reasons.
    pub fn paid_to(&self, who: &Address) -> u128 {
        self.payouts
            .iter()
            .filter(|p| &p.recipient == who)
            .map(|p| p.amount)
            .sum()
    }
}
