//! Per-transaction fee book: deposits, round records, reclassification
//! and settlement.

use crate::error::FeeError;
use crate::record::{
    FeeDistribution, FeeSchedule, Payout, PayoutReason, RoundFeeRecord, RoundFeeType, RoundFees,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use verdict_types::{Address, RoundResult, TxHash, VoteType};

/// How many appeal/ancestor pairs a re-vote may revisit, not counting
/// pairs of placeholder rounds walked through.
const LOOKBACK_PAIRS: u32 = 2;

/// Outcome of an appeal as decided by the appeal ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppealOutcome {
    Successful,
    Unsuccessful,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    pub depositor: Address,
    pub amount: u128,
}

/// Every fee fact about one transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBook {
    tx: TxHash,
    submitter: Address,
    deposits: Vec<Deposit>,
    rounds: BTreeMap<u32, RoundFees>,
    settled: bool,
}

impl FeeBook {
    pub fn new(tx: TxHash, submitter: Address, amount: u128) -> Self {
        Self {
            tx,
            deposits: vec![Deposit {
                depositor: submitter.clone(),
                amount,
            }],
            submitter,
            rounds: BTreeMap::new(),
            settled: false,
        }
    }

    pub fn tx(&self) -> &TxHash {
        &self.tx
    }

    pub fn balance(&self) -> u128 {
        self.deposits
            .iter()
            .fold(0u128, |acc, d| acc.saturating_add(d.amount))
    }

    pub fn deposits(&self) -> &[Deposit] {
        &self.deposits
    }

    pub fn last_depositor(&self) -> &Address {
        self.deposits
            .last()
            .map(|d| &d.depositor)
            .unwrap_or(&self.submitter)
    }

    pub fn is_settled(&self) -> bool {
        self.settled
    }

    pub fn round(&self, round: u32) -> Option<&RoundFees> {
        self.rounds.get(&round)
    }

    pub fn round_type(&self, round: u32) -> RoundFeeType {
        self.rounds
            .get(&round)
            .map(RoundFees::fee_type)
            .unwrap_or(RoundFeeType::EmptyRound)
    }

    pub fn deposit(&mut self, depositor: &Address, amount: u128) -> Result<(), FeeError> {
        if self.settled {
            return Err(FeeError::AlreadySettled);
        }
        self.deposits.push(Deposit {
            depositor: depositor.clone(),
            amount,
        });
        Ok(())
    }

    /// Open a rotation record for `round`. The first call for a round
    /// creates it (filling skipped indices with placeholders); later calls
    /// append a rotation.
    pub fn record_round_start(&mut self, round: u32, leader: &Address, validators: &[Address]) {
        self.fill_gaps(round);
        let fees = self
            .rounds
            .entry(round)
            .or_insert_with(|| RoundFees::empty(round));
        let rotation = fees.rotations.len() as u32;
        fees.rotations.push(RoundFeeRecord::new(
            rotation,
            Some(leader.clone()),
            validators.to_vec(),
        ));
    }

    /// Tag the current rotation by whether the leader produced a receipt.
    pub fn record_proposal(&mut self, round: u32, proposed: bool) -> Result<(), FeeError> {
        let fee_type = if proposed {
            RoundFeeType::NormalRewards
        } else {
            RoundFeeType::LeaderTimeout50Percent
        };
        let record = self.last_record_mut(round)?;
        record.fee_type = fee_type;
        record.provisional = fee_type;
        Ok(())
    }

    /// Snapshot the current rotation's revealed votes and result.
    pub fn record_votes(
        &mut self,
        round: u32,
        votes: &[VoteType],
        result: RoundResult,
    ) -> Result<(), FeeError> {
        let record = self.last_record_mut(round)?;
        record.votes = votes.to_vec();
        record.result = result;
        Ok(())
    }

    /// Open appeal round `round` against normal round `challenged` and take
    /// the appealer's bond.
    pub fn record_appeal(
        &mut self,
        round: u32,
        challenged: u32,
        appealer: &Address,
        bond: u128,
        validators: &[Address],
    ) -> Result<(), FeeError> {
        if round % 2 == 0 {
            return Err(FeeError::WrongRoundParity(round));
        }
        if challenged % 2 == 1 || challenged >= round {
            return Err(FeeError::WrongRoundParity(challenged));
        }
        self.fill_gaps(round);
        let mut fees = RoundFees::empty(round);
        fees.appealer = Some(appealer.clone());
        fees.bond = bond;
        fees.challenged = Some(challenged);
        fees.rotations
            .push(RoundFeeRecord::new(0, None, validators.to_vec()));
        self.rounds.insert(round, fees);
        self.deposit(appealer, bond)
    }

    /// Void every rotation of a round whose results were discarded.
    pub fn abandon_round(&mut self, round: u32) {
        if let Some(fees) = self.rounds.get_mut(&round) {
            for record in &mut fees.rotations {
                record.fee_type = RoundFeeType::SkipRewards;
            }
        }
    }

    /// Tag a resolved appeal round and its challenged round.
    pub fn reclassify_appeal(&mut self, round: u32, outcome: AppealOutcome) -> Result<(), FeeError> {
        if round % 2 == 0 {
            return Err(FeeError::WrongRoundParity(round));
        }
        match outcome {
            AppealOutcome::Successful => {
                let challenged = self.challenged_by(round);
                self.set_type(round, RoundFeeType::AppealSuccessful)?;
                self.set_type(challenged, RoundFeeType::SkipRewards)?;
            }
            AppealOutcome::Unsuccessful => {
                self.set_type(round, RoundFeeType::AppealUnsuccessful)?;
            }
        }
        tracing::debug!(tx = ?self.tx, round, ?outcome, "appeal round reclassified");
        Ok(())
    }

    /// Revisit earlier appeal pairs once normal round `round` has resolved.
    ///
    /// Walking back, each step looks at the appeal at `p - 1` and the round
    /// it challenged, normally `p - 2`. If this round's
    /// result matches the challenged round, the appeal was wrong after all:
    /// it becomes unsuccessful, the challenged round gets its proposal-time
    /// type back, and the re-vote that vindicated it takes the forfeited
    /// bond. Otherwise the appeal stands and the challenged round is
    /// skipped. The walk then continues from the challenged round, so
    /// earlier failed appeals of that round are left as decided. Pairs of
    /// placeholder rounds are walked through freely.
    pub fn reclassify(&mut self, round: u32) -> Result<(), FeeError> {
        use RoundFeeType::*;

        if round % 2 == 1 {
            return Err(FeeError::WrongRoundParity(round));
        }
        let anchor = self
            .rounds
            .get(&round)
            .ok_or(FeeError::UnknownRound(round))?
            .result();

        let mut p = round;
        let mut pairs = 0;
        while p >= 2 && pairs < LOOKBACK_PAIRS {
            let appeal = p - 1;
            let ancestor = self.challenged_by(appeal);
            match (self.round_type(appeal), self.round_type(ancestor)) {
                (EmptyRound, EmptyRound) => {
                    p -= 2;
                }
                (EmptyRound, _) | (SkipRewards, _) => break,
                (AppealSuccessful | AppealUnsuccessful, EmptyRound) => {
                    invariant_violation(&self.tx, appeal, "appeal challenges an empty round")
                }
                (AppealSuccessful | AppealUnsuccessful, _) => {
                    let ancestor_result = self.round_result(ancestor);
                    if anchor.is_equivalent(ancestor_result) {
                        self.set_type(appeal, AppealUnsuccessful)?;
                        self.restore_provisional(ancestor)?;
                        if self.round_type(p) == NormalRewards {
                            self.set_type(p, SplitPreviousAppealBond)?;
                        }
                    } else {
                        self.set_type(appeal, AppealSuccessful)?;
                        self.set_type(ancestor, SkipRewards)?;
                    }
                    pairs += 1;
                    p = ancestor;
                }
                (NormalRewards | LeaderTimeout50Percent | SplitPreviousAppealBond, _) => {
                    invariant_violation(&self.tx, appeal, "odd round carries a normal-round type")
                }
            }
        }
        tracing::debug!(tx = ?self.tx, round, pairs, "fees reclassified");
        Ok(())
    }

    /// Pay every round once and return the residual to the last depositor.
    ///
    /// Payouts are capped by the remaining balance.
    pub fn commit_final_fees(&mut self, schedule: FeeSchedule) -> Result<FeeDistribution, FeeError> {
        if self.settled {
            return Err(FeeError::AlreadySettled);
        }
        let mut purse = Purse::new(self.balance());

        for (round, fees) in &self.rounds {
            for record in &fees.rotations {
                match record.fee_type {
                    RoundFeeType::EmptyRound | RoundFeeType::SkipRewards => {}
                    RoundFeeType::NormalRewards => {
                        pay_normal(&mut purse, record, schedule);
                    }
                    RoundFeeType::LeaderTimeout50Percent => {
                        if let Some(leader) = &record.leader {
                            purse.pay(leader, schedule.leader_fee / 2, PayoutReason::LeaderTimeoutFee);
                        }
                    }
                    RoundFeeType::SplitPreviousAppealBond => {
                        pay_normal(&mut purse, record, schedule);
                        let forfeited = round
                            .checked_sub(1)
                            .and_then(|r| self.rounds.get(&r))
                            .map(|appeal| forfeited_bond(appeal, schedule))
                            .unwrap_or(0);
                        let aligned: Vec<&Address> = record.aligned_validators().collect();
                        if let Some(share) = forfeited.checked_div(aligned.len() as u128) {
                            for validator in aligned {
                                purse.pay(validator, share, PayoutReason::BondSplit);
                            }
                        }
                    }
                    RoundFeeType::AppealSuccessful => {
                        pay_validators(&mut purse, record, schedule);
                        if let Some(appealer) = &fees.appealer {
                            purse.pay(appealer, fees.bond, PayoutReason::AppealBondReturn);
                            purse.pay(appealer, schedule.leader_fee, PayoutReason::AppealReward);
                        }
                    }
                    RoundFeeType::AppealUnsuccessful => {
                        pay_validators(&mut purse, record, schedule);
                        if self.round_type(round + 1) != RoundFeeType::SplitPreviousAppealBond {
                            let counterpart = fees
                                .challenged
                                .or_else(|| round.checked_sub(1))
                                .and_then(|r| self.rounds.get(&r))
                                .and_then(|challenged| challenged.last())
                                .and_then(|r| r.leader.clone())
                                .unwrap_or_else(|| self.submitter.clone());
                            purse.pay(
                                &counterpart,
                                forfeited_bond(fees, schedule),
                                PayoutReason::ForfeitedBond,
                            );
                        }
                    }
                }
            }
        }

        let residual = purse.remaining;
        let last = self.last_depositor().clone();
        purse.pay(&last, residual, PayoutReason::Residual);
        self.settled = true;

        let distribution = FeeDistribution {
            payouts: purse.payouts,
        };
        tracing::info!(
            tx = ?self.tx,
            payouts = distribution.payouts.len(),
            total = distribution.total(),
            "fees settled"
        );
        Ok(distribution)
    }

    /// Return every deposit to its depositor.
    pub fn refund(&mut self) -> Result<FeeDistribution, FeeError> {
        if self.settled {
            return Err(FeeError::AlreadySettled);
        }
        self.settled = true;
        let payouts = self
            .deposits
            .iter()
            .filter(|d| d.amount > 0)
            .map(|d| Payout {
                recipient: d.depositor.clone(),
                amount: d.amount,
                reason: PayoutReason::Refund,
            })
            .collect();
        Ok(FeeDistribution { payouts })
    }

    fn fill_gaps(&mut self, round: u32) {
        let next = self
            .rounds
            .keys()
            .next_back()
            .map(|last| last + 1)
            .unwrap_or(0);
        for missing in next..round {
            self.rounds.insert(missing, RoundFees::empty(missing));
        }
    }

    /// The normal round appeal `round` challenges. Placeholders point at
    /// the round just before.
    fn challenged_by(&self, round: u32) -> u32 {
        self.rounds
            .get(&round)
            .and_then(|fees| fees.challenged)
            .unwrap_or_else(|| round.saturating_sub(1))
    }

    fn round_result(&self, round: u32) -> RoundResult {
        self.rounds
            .get(&round)
            .map(RoundFees::result)
            .unwrap_or_default()
    }

    fn last_record_mut(&mut self, round: u32) -> Result<&mut RoundFeeRecord, FeeError> {
        self.rounds
            .get_mut(&round)
            .and_then(RoundFees::last_mut)
            .ok_or(FeeError::UnknownRound(round))
    }

    fn set_type(&mut self, round: u32, fee_type: RoundFeeType) -> Result<(), FeeError> {
        self.last_record_mut(round)?.fee_type = fee_type;
        Ok(())
    }

    fn restore_provisional(&mut self, round: u32) -> Result<(), FeeError> {
        let record = self.last_record_mut(round)?;
        record.fee_type = record.provisional;
        Ok(())
    }
}

/// Balance being paid out, with every payout recorded.
struct Purse {
    remaining: u128,
    payouts: Vec<Payout>,
}

impl Purse {
    fn new(balance: u128) -> Self {
        Self {
            remaining: balance,
            payouts: Vec::new(),
        }
    }

    fn pay(&mut self, recipient: &Address, amount: u128, reason: PayoutReason) {
        let paid = amount.min(self.remaining);
        if paid < amount {
            tracing::warn!(
                recipient = %recipient,
                owed = amount,
                paid,
                ?reason,
                "fee balance exhausted, payout truncated"
            );
        }
        if paid == 0 {
            return;
        }
        self.remaining -= paid;
        self.payouts.push(Payout {
            recipient: recipient.clone(),
            amount: paid,
            reason,
        });
    }
}

fn pay_validators(purse: &mut Purse, record: &RoundFeeRecord, schedule: FeeSchedule) {
    for validator in record.aligned_validators() {
        purse.pay(validator, schedule.validator_fee, PayoutReason::ValidatorFee);
    }
}

fn pay_normal(purse: &mut Purse, record: &RoundFeeRecord, schedule: FeeSchedule) {
    if record.result.is_accepting() {
        if let Some(leader) = &record.leader {
            purse.pay(leader, schedule.leader_fee, PayoutReason::LeaderFee);
        }
    }
    pay_validators(purse, record, schedule);
}

/// What remains of an unsuccessful appeal's bond after its aligned
/// validators are paid.
fn forfeited_bond(appeal: &RoundFees, schedule: FeeSchedule) -> u128 {
    let aligned = appeal
        .last()
        .map(|r| r.aligned_validators().count() as u128)
        .unwrap_or(0);
    appeal
        .bond
        .saturating_sub(aligned.saturating_mul(schedule.validator_fee))
}

fn invariant_violation(tx: &TxHash, round: u32, what: &str) -> ! {
    tracing::error!(tx = ?tx, round, what, "fee record invariant violated");
    panic!("fee record invariant violated for {tx:?} at round {round}: {what}");
}
