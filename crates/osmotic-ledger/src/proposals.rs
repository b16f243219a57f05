//! Stake-weighted proposal funding.
//!
//! Voters stake on proposals. Depending on the book's [`DecayParameters`]
//! a proposal either streams at a rate that eases toward its stake-derived
//! target ([`Threshold::MinStakeRatio`]) or accumulates conviction that is
//! converted to a reward ([`Threshold::Weight`]). A rate-mode target depends
//! on the total stake, so any stake change checkpoints every active proposal;
//! in conviction mode only the proposal whose stake changes is checkpointed.
//!
//! [`Threshold::MinStakeRatio`]: osmotic_core::Threshold::MinStakeRatio
//! [`Threshold::Weight`]: osmotic_core::Threshold::Weight
//!
//! Writers are serialised by a single `RwLock`; the engine itself is
//! stateless.

use std::collections::HashMap;
use std::sync::Arc;

use osmotic_core::error::{DecayError, LedgerError};
use osmotic_core::{AccumulationMode, AccumulationState, DecayParameters, FixedPoint, RateCalculator};
use osmotic_decay::DecayEngine;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::flows::ensure_forward;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: u64,
    pub link: String,
    pub beneficiary: String,
    pub submitter: String,
    /// Sum of all voters' stake on this proposal.
    pub staked: FixedPoint,
    /// Last rate or conviction, per the book's mode.
    pub state: AccumulationState,
    pub active: bool,
}

struct BookState {
    params: DecayParameters,
    available_funds: FixedPoint,
    proposals: Vec<Proposal>,
    stakes: HashMap<(u64, String), FixedPoint>,
    voter_totals: HashMap<String, FixedPoint>,
    /// Stake on active proposals only.
    total_staked: FixedPoint,
}

impl BookState {
    fn proposal(&self, id: u64) -> Result<&Proposal, LedgerError> {
        usize::try_from(id)
            .ok()
            .and_then(|idx| self.proposals.get(idx))
            .ok_or(LedgerError::ProposalNotFound(id))
    }

    fn proposal_mut(&mut self, id: u64) -> Result<&mut Proposal, LedgerError> {
        usize::try_from(id)
            .ok()
            .and_then(|idx| self.proposals.get_mut(idx))
            .ok_or(LedgerError::ProposalNotFound(id))
    }

    fn active_proposal(&self, id: u64) -> Result<&Proposal, LedgerError> {
        let proposal = self.proposal(id)?;
        if !proposal.active {
            return Err(LedgerError::ProposalInactive(id));
        }
        Ok(proposal)
    }
}

pub struct ProposalBook {
    calculator: Arc<dyn RateCalculator>,
    state: RwLock<BookState>,
}

impl ProposalBook {
    /// An empty book using the production engine.
    pub fn new(params: DecayParameters) -> Result<Self, LedgerError> {
        Self::with_calculator(Arc::new(DecayEngine::new()), params)
    }

    pub fn with_calculator(
        calculator: Arc<dyn RateCalculator>,
        params: DecayParameters,
    ) -> Result<Self, LedgerError> {
        params.validate()?;
        Ok(Self {
            calculator,
            state: RwLock::new(BookState {
                params,
                available_funds: FixedPoint::ZERO,
                proposals: Vec::new(),
                stakes: HashMap::new(),
                voter_totals: HashMap::new(),
                total_staked: FixedPoint::ZERO,
            }),
        })
    }

    /// Register a proposal and return its id. Ids are assigned sequentially
    /// from zero.
    pub fn add_proposal(
        &self,
        link: impl Into<String>,
        beneficiary: impl Into<String>,
        submitter: impl Into<String>,
    ) -> u64 {
        let mut book = self.state.write();
        let id = book.proposals.len() as u64;
        book.proposals.push(Proposal {
            id,
            link: link.into(),
            beneficiary: beneficiary.into(),
            submitter: submitter.into(),
            staked: FixedPoint::ZERO,
            state: AccumulationState::EMPTY,
            active: true,
        });
        info!(id, "proposal added");
        id
    }

    pub fn proposal(&self, id: u64) -> Result<Proposal, LedgerError> {
        self.state.read().proposal(id).cloned()
    }

    pub fn proposal_count(&self) -> usize {
        self.state.read().proposals.len()
    }

    pub fn stake_to_proposal(
        &self,
        id: u64,
        voter: &str,
        amount: FixedPoint,
        now: i64,
    ) -> Result<(), LedgerError> {
        if amount.is_zero() {
            return Err(DecayError::InvalidArgument("stake amount must be positive".to_string()).into());
        }
        let mut book = self.state.write();
        book.active_proposal(id)?;

        let total_staked = book.total_staked.try_add(amount)?;
        let voter_total = voter_stake_in(&book.voter_totals, voter).try_add(amount)?;
        let stake = book
            .stakes
            .get(&(id, voter.to_string()))
            .copied()
            .unwrap_or_default()
            .try_add(amount)?;

        self.checkpoint_stake_change(&mut book, id, now)?;
        let proposal = book.proposal_mut(id)?;
        proposal.staked = proposal.staked.try_add(amount)?;
        book.total_staked = total_staked;
        book.voter_totals.insert(voter.to_string(), voter_total);
        book.stakes.insert((id, voter.to_string()), stake);

        debug!(id, voter, %amount, "stake added");
        Ok(())
    }

    pub fn withdraw_from_proposal(
        &self,
        id: u64,
        voter: &str,
        amount: FixedPoint,
        now: i64,
    ) -> Result<(), LedgerError> {
        let mut book = self.state.write();
        book.active_proposal(id)?;

        let key = (id, voter.to_string());
        let have = book.stakes.get(&key).copied().unwrap_or_default();
        let Some(remaining) = have.checked_sub(amount) else {
            return Err(LedgerError::InsufficientStake {
                have: have.to_string(),
                need: amount.to_string(),
            });
        };

        self.checkpoint_stake_change(&mut book, id, now)?;
        let proposal = book.proposal_mut(id)?;
        proposal.staked = proposal.staked.saturating_sub(amount);
        book.total_staked = book.total_staked.saturating_sub(amount);
        let voter_total = voter_stake_in(&book.voter_totals, voter).saturating_sub(amount);
        set_or_remove(&mut book.voter_totals, voter.to_string(), voter_total);
        set_or_remove(&mut book.stakes, key, remaining);

        debug!(id, voter, %amount, "stake withdrawn");
        Ok(())
    }

    /// Release everything `voter` still has staked on inactive proposals.
    /// Returns the amount released.
    pub fn withdraw_inactive_stake(&self, voter: &str) -> FixedPoint {
        let mut book = self.state.write();
        let inactive: Vec<u64> = book
            .stakes
            .keys()
            .filter(|(id, who)| {
                who == voter && book.proposal(*id).is_ok_and(|proposal| !proposal.active)
            })
            .map(|(id, _)| *id)
            .collect();

        let mut released = FixedPoint::ZERO;
        for id in inactive {
            let Some(stake) = book.stakes.remove(&(id, voter.to_string())) else {
                continue;
            };
            if let Ok(proposal) = book.proposal_mut(id) {
                proposal.staked = proposal.staked.saturating_sub(stake);
            }
            released = released.saturating_add(stake);
        }

        let voter_total = voter_stake_in(&book.voter_totals, voter).saturating_sub(released);
        set_or_remove(&mut book.voter_totals, voter.to_string(), voter_total);
        if !released.is_zero() {
            info!(voter, %released, "inactive stake withdrawn");
        }
        released
    }

    /// Close a proposal at `now`. Its stake leaves the active total but stays
    /// attributed to voters until they withdraw it.
    pub fn execute_proposal(&self, id: u64, now: i64) -> Result<Proposal, LedgerError> {
        let mut book = self.state.write();
        book.active_proposal(id)?;
        self.checkpoint_stake_change(&mut book, id, now)?;
        let staked = book.proposal(id)?.staked;
        book.total_staked = book.total_staked.saturating_sub(staked);

        let proposal = book.proposal_mut(id)?;
        proposal.active = false;
        proposal.state.clear();
        info!(id, "proposal executed");
        Ok(proposal.clone())
    }

    /// Replace the funding settings, checkpointing every active proposal under
    /// the old ones first. Switching between rate and conviction restarts
    /// every proposal's accumulation at `now`.
    pub fn set_funding_settings(
        &self,
        params: DecayParameters,
        now: i64,
    ) -> Result<(), LedgerError> {
        params.validate()?;
        let mut book = self.state.write();
        self.checkpoint_active(&mut book, now)?;

        let restart = book.params.mode() != params.mode();
        book.params = params;
        if restart {
            for proposal in book.proposals.iter_mut().filter(|p| p.active) {
                proposal.state = AccumulationState::new(FixedPoint::ZERO, now);
            }
        }
        info!(decay = %params.decay, max_ratio = %params.max_ratio, "funding settings changed");
        Ok(())
    }

    pub fn funding_settings(&self) -> DecayParameters {
        self.state.read().params
    }

    /// What each proposal's state accumulates under the current settings.
    pub fn mode(&self) -> AccumulationMode {
        self.state.read().params.mode()
    }

    /// Set the pool the proposals draw from. Rates accrued so far are
    /// checkpointed against the previous amount.
    pub fn set_available_funds(&self, funds: FixedPoint, now: i64) -> Result<(), LedgerError> {
        let mut book = self.state.write();
        if book.params.mode() == AccumulationMode::Rate {
            self.checkpoint_active(&mut book, now)?;
        }
        book.available_funds = funds;
        debug!(%funds, "available funds changed");
        Ok(())
    }

    pub fn available_funds(&self) -> FixedPoint {
        self.state.read().available_funds
    }

    pub fn total_staked(&self) -> FixedPoint {
        self.state.read().total_staked
    }

    pub fn voter_stake(&self, id: u64, voter: &str) -> FixedPoint {
        self.state
            .read()
            .stakes
            .get(&(id, voter.to_string()))
            .copied()
            .unwrap_or_default()
    }

    pub fn total_voter_stake(&self, voter: &str) -> FixedPoint {
        voter_stake_in(&self.state.read().voter_totals, voter)
    }

    /// The funding rate the proposal is heading toward at `now`: derived from
    /// its stake in rate mode, from its conviction in conviction mode.
    pub fn target_rate(&self, id: u64, now: i64) -> Result<FixedPoint, LedgerError> {
        let book = self.state.read();
        let proposal = book.active_proposal(id)?;
        let amount = match book.params.mode() {
            AccumulationMode::Rate => proposal.staked,
            AccumulationMode::Conviction => self.accumulated(&book, proposal, now)?,
        };
        Ok(self
            .calculator
            .target_for(&book.params, amount, book.total_staked, book.available_funds)?)
    }

    /// The proposal's smoothed funding rate at `now`. Rate mode only.
    pub fn current_rate(&self, id: u64, now: i64) -> Result<FixedPoint, LedgerError> {
        let book = self.state.read();
        require_mode(&book.params, AccumulationMode::Rate)?;
        let proposal = book.active_proposal(id)?;
        self.accumulated(&book, proposal, now)
    }

    /// The proposal's conviction at `now`. Conviction mode only.
    pub fn conviction(&self, id: u64, now: i64) -> Result<FixedPoint, LedgerError> {
        let book = self.state.read();
        require_mode(&book.params, AccumulationMode::Conviction)?;
        let proposal = book.active_proposal(id)?;
        self.accumulated(&book, proposal, now)
    }

    /// What the recurrence is fed: the target rate in rate mode, the stake in
    /// conviction mode.
    fn input_for(&self, book: &BookState, proposal: &Proposal) -> Result<FixedPoint, LedgerError> {
        match book.params.mode() {
            AccumulationMode::Rate => Ok(self.calculator.target_for(
                &book.params,
                proposal.staked,
                book.total_staked,
                book.available_funds,
            )?),
            AccumulationMode::Conviction => Ok(proposal.staked),
        }
    }

    fn accumulated(
        &self,
        book: &BookState,
        proposal: &Proposal,
        now: i64,
    ) -> Result<FixedPoint, LedgerError> {
        ensure_forward(&proposal.state, now)?;
        let input = self.input_for(book, proposal)?;
        Ok(proposal.state.value_at(
            &*self.calculator,
            book.params.mode(),
            now,
            input,
            book.params.decay,
        )?)
    }

    fn checkpoint(&self, book: &mut BookState, id: u64, now: i64) -> Result<(), LedgerError> {
        let proposal = book.proposal(id)?;
        ensure_forward(&proposal.state, now)?;
        let input = self.input_for(book, proposal)?;
        let state = proposal.state.advance(
            &*self.calculator,
            book.params.mode(),
            now,
            input,
            book.params.decay,
        )?;
        book.proposal_mut(id)?.state = state;
        Ok(())
    }

    /// Settle what accrued under the current stake before `id`'s stake moves.
    fn checkpoint_stake_change(
        &self,
        book: &mut BookState,
        id: u64,
        now: i64,
    ) -> Result<(), LedgerError> {
        match book.params.mode() {
            AccumulationMode::Rate => self.checkpoint_active(book, now),
            AccumulationMode::Conviction => self.checkpoint(book, id, now),
        }
    }

    fn checkpoint_active(&self, book: &mut BookState, now: i64) -> Result<(), LedgerError> {
        let active: Vec<u64> = book
            .proposals
            .iter()
            .filter(|p| p.active)
            .map(|p| p.id)
            .collect();
        // All or nothing: reject a regressed `now` before any state moves.
        for id in &active {
            ensure_forward(&book.proposal(*id)?.state, now)?;
        }
        for id in active {
            self.checkpoint(book, id, now)?;
        }
        Ok(())
    }
}

fn require_mode(params: &DecayParameters, expected: AccumulationMode) -> Result<(), LedgerError> {
    if params.mode() != expected {
        return Err(LedgerError::WrongMode { expected });
    }
    Ok(())
}

fn voter_stake_in(totals: &HashMap<String, FixedPoint>, voter: &str) -> FixedPoint {
    totals.get(voter).copied().unwrap_or_default()
}

fn set_or_remove<K: std::hash::Hash + Eq>(
    map: &mut HashMap<K, FixedPoint>,
    key: K,
    value: FixedPoint,
) {
    if value.is_zero() {
        map.remove(&key);
    } else {
        map.insert(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use osmotic_core::constants::DAY;
    use osmotic_core::Threshold;
    use proptest::prelude::*;

    const START: i64 = 1_700_000_000;

    fn fp(s: &str) -> FixedPoint {
        s.parse().unwrap()
    }

    fn funding_params() -> DecayParameters {
        DecayParameters::new(fp("0.99999"), fp("0.1"), Threshold::MinStakeRatio(fp("0.002"))).unwrap()
    }

    fn conviction_params() -> DecayParameters {
        DecayParameters::new(fp("0.9999999"), fp("0.2"), Threshold::Weight(fp("0.025"))).unwrap()
    }

    fn funded_book(params: DecayParameters) -> ProposalBook {
        let book = ProposalBook::new(params).unwrap();
        book.set_available_funds(fp("100"), START).unwrap();
        book
    }

    #[test]
    fn add_proposal_starts_empty() {
        let book = funded_book(funding_params());
        let id = book.add_proposal("https://ipfs.io/ipfs/Qm", "beneficiary", "owner");
        assert_eq!(id, 0);
        let proposal = book.proposal(0).unwrap();
        assert_eq!(proposal.staked, FixedPoint::ZERO);
        assert_eq!(proposal.state, AccumulationState::EMPTY);
        assert!(proposal.active);
        assert_eq!(proposal.submitter, "owner");
        assert_eq!(book.add_proposal("link", "b", "s"), 1);
        assert_eq!(book.proposal_count(), 2);
    }

    #[test]
    fn stake_updates_all_totals() {
        let book = funded_book(funding_params());
        book.add_proposal("link", "beneficiary", "owner");
        book.stake_to_proposal(0, "owner", fp("1"), START).unwrap();

        assert_eq!(book.proposal(0).unwrap().staked, fp("1"));
        assert_eq!(book.voter_stake(0, "owner"), fp("1"));
        assert_eq!(book.total_voter_stake("owner"), fp("1"));
        assert_eq!(book.total_staked(), fp("1"));
    }

    #[test]
    fn stake_rejects_zero_and_unknown() {
        let book = funded_book(funding_params());
        book.add_proposal("link", "beneficiary", "owner");
        assert!(matches!(
            book.stake_to_proposal(0, "owner", FixedPoint::ZERO, START),
            Err(LedgerError::Decay(DecayError::InvalidArgument(_)))
        ));
        assert_eq!(
            book.stake_to_proposal(7, "owner", fp("1"), START),
            Err(LedgerError::ProposalNotFound(7))
        );
    }

    #[test]
    fn withdraw_partial_stake() {
        let book = funded_book(funding_params());
        book.add_proposal("link", "beneficiary", "owner");
        book.stake_to_proposal(0, "owner", fp("1"), START).unwrap();
        book.withdraw_from_proposal(0, "owner", fp("0.6"), START + 10).unwrap();

        assert_eq!(book.proposal(0).unwrap().staked, fp("0.4"));
        assert_eq!(book.voter_stake(0, "owner"), fp("0.4"));
        assert_eq!(book.total_voter_stake("owner"), fp("0.4"));
        assert_eq!(book.total_staked(), fp("0.4"));
    }

    #[test]
    fn withdraw_more_than_staked() {
        let book = funded_book(funding_params());
        book.add_proposal("link", "beneficiary", "owner");
        book.stake_to_proposal(0, "owner", fp("1"), START).unwrap();
        assert!(matches!(
            book.withdraw_from_proposal(0, "owner", fp("2"), START),
            Err(LedgerError::InsufficientStake { .. })
        ));
        assert_eq!(book.total_staked(), fp("1"));
    }

    #[test]
    fn target_rate_matches_formula() {
        // 100 * 0.1 * (1 - sqrt(0.002 * 1 / 1))
        let book = funded_book(funding_params());
        book.add_proposal("link", "beneficiary", "owner");
        book.stake_to_proposal(0, "owner", fp("1"), START).unwrap();
        let rate = book.target_rate(0, START).unwrap().to_f64_lossy();
        assert!((rate - 9.552786404500042).abs() < 1e-4, "{rate}");
    }

    #[test]
    fn current_rate_eases_toward_target() {
        let book = funded_book(funding_params());
        book.add_proposal("link", "beneficiary", "owner");
        book.stake_to_proposal(0, "owner", fp("1"), START).unwrap();

        let target = book.target_rate(0, START).unwrap();
        assert_eq!(book.current_rate(0, START).unwrap(), FixedPoint::ZERO);
        let after_day = book.current_rate(0, START + DAY).unwrap();
        assert!(after_day > FixedPoint::ZERO && after_day < target);
        let expected = DecayEngine::new()
            .calculate_rate(DAY, FixedPoint::ZERO, target, fp("0.99999"))
            .unwrap();
        assert_eq!(after_day, expected);
    }

    #[test]
    fn conviction_accumulates_stake() {
        let book = funded_book(conviction_params());
        book.add_proposal("link", "beneficiary", "owner");
        book.stake_to_proposal(0, "owner", fp("10"), START).unwrap();
        assert_eq!(book.conviction(0, START + 1).unwrap(), fp("10"));
        let two_days = book.conviction(0, START + 2 * DAY).unwrap();
        assert!(two_days > book.conviction(0, START + DAY).unwrap());
        assert!(matches!(
            book.current_rate(0, START),
            Err(LedgerError::WrongMode { expected: AccumulationMode::Rate })
        ));
    }

    #[test]
    fn conviction_reward_needs_threshold() {
        let book = funded_book(conviction_params());
        book.add_proposal("link", "beneficiary", "owner");
        book.stake_to_proposal(0, "owner", fp("10"), START).unwrap();
        // threshold 0.025 * 10 / 0.04 = 6.25 conviction: passed after one second
        assert_eq!(book.target_rate(0, START).unwrap(), FixedPoint::ZERO);
        assert!(book.target_rate(0, START + DAY).unwrap() > FixedPoint::ZERO);
        assert!(matches!(
            book.conviction(0, START - 1),
            Err(LedgerError::TimestampRegression { .. })
        ));
    }

    #[test]
    fn execute_then_withdraw_inactive() {
        let book = funded_book(funding_params());
        book.add_proposal("link", "beneficiary", "owner");
        book.add_proposal("other", "beneficiary", "owner");
        book.stake_to_proposal(0, "owner", fp("1"), START).unwrap();
        book.stake_to_proposal(1, "owner", fp("2"), START).unwrap();

        let executed = book.execute_proposal(0, START).unwrap();
        assert!(!executed.active);
        assert!(executed.state.is_empty());
        assert_eq!(book.total_staked(), fp("2"));
        assert_eq!(
            book.stake_to_proposal(0, "owner", fp("1"), START),
            Err(LedgerError::ProposalInactive(0))
        );
        assert_eq!(book.execute_proposal(0, START), Err(LedgerError::ProposalInactive(0)));

        assert_eq!(book.withdraw_inactive_stake("owner"), fp("1"));
        assert_eq!(book.proposal(0).unwrap().staked, FixedPoint::ZERO);
        assert_eq!(book.voter_stake(0, "owner"), FixedPoint::ZERO);
        assert_eq!(book.total_voter_stake("owner"), fp("2"));
        assert_eq!(book.withdraw_inactive_stake("owner"), FixedPoint::ZERO);
    }

    #[test]
    fn settings_round_trip() {
        let book = funded_book(conviction_params());
        book.set_funding_settings(funding_params(), START).unwrap();
        assert_eq!(book.funding_settings(), funding_params());
        assert_eq!(book.mode(), AccumulationMode::Rate);
    }

    #[test]
    fn settings_validated_on_write() {
        let book = funded_book(funding_params());
        let bad = DecayParameters {
            decay: FixedPoint::ONE,
            max_ratio: fp("0.1"),
            threshold: Threshold::MinStakeRatio(fp("0.002")),
        };
        assert!(matches!(
            book.set_funding_settings(bad, START),
            Err(LedgerError::Decay(DecayError::InvalidConfiguration(_)))
        ));
        assert_eq!(book.funding_settings(), funding_params());
    }

    #[test]
    fn mode_switch_restarts_accumulation() {
        let book = funded_book(funding_params());
        book.add_proposal("link", "beneficiary", "owner");
        book.stake_to_proposal(0, "owner", fp("1"), START).unwrap();
        book.set_funding_settings(conviction_params(), START + DAY).unwrap();
        assert_eq!(
            book.proposal(0).unwrap().state,
            AccumulationState::new(FixedPoint::ZERO, START + DAY)
        );
        assert_eq!(book.conviction(0, START + DAY + 1).unwrap(), fp("1"));
    }

    proptest! {
        #[test]
        fn totals_stay_consistent(
            ops in proptest::collection::vec((0u64..3, 0usize..3, 1u64..1_000, any::<bool>()), 1..40),
        ) {
            let voters = ["alice", "bob", "carol"];
            let book = funded_book(funding_params());
            for _ in 0..3 {
                book.add_proposal("link", "beneficiary", "owner");
            }
            let mut now = START;
            for (id, voter, amount, stake) in ops {
                now += 60;
                let amount = FixedPoint::from_tokens(amount);
                if stake {
                    book.stake_to_proposal(id, voters[voter], amount, now).unwrap();
                } else {
                    let _ = book.withdraw_from_proposal(id, voters[voter], amount, now);
                }
            }

            let mut by_voter = FixedPoint::ZERO;
            for voter in voters {
                let mut sum = FixedPoint::ZERO;
                for id in 0..3 {
                    sum = sum.try_add(book.voter_stake(id, voter)).unwrap();
                }
                prop_assert_eq!(sum, book.total_voter_stake(voter));
                by_voter = by_voter.try_add(sum).unwrap();
            }
            let mut by_proposal = FixedPoint::ZERO;
            for id in 0..3 {
                by_proposal = by_proposal.try_add(book.proposal(id).unwrap().staked).unwrap();
            }
            prop_assert_eq!(by_voter, book.total_staked());
            prop_assert_eq!(by_proposal, book.total_staked());
        }
    }
}
