//! The seam between the decay engine and the ledgers that call it.
//! `osmotic-decay` provides the implementation.

use crate::error::DecayError;
use crate::fixed_point::FixedPoint;
use crate::types::{AccumulationMode, DecayParameters, Threshold};

/// Pure computation of decayed rates, conviction, accrued balances and
/// funding rates.
///
/// Every method is a deterministic function of its arguments. Implementations
/// carry no state and re-validate their parameters on every call.
/// `elapsed` is in seconds; a negative value is an
/// [`InvalidArgument`](DecayError::InvalidArgument).
pub trait RateCalculator: Send + Sync {
    /// The shared recurrence `v' = v * a^t + target * (1 - a^t)`.
    ///
    /// In [`AccumulationMode::Rate`] `input` is the target rate. In
    /// [`AccumulationMode::Conviction`] `input` is the staked amount and the
    /// target is `input / (1 - a)`.
    fn accumulate(
        &self,
        mode: AccumulationMode,
        elapsed: i64,
        last_value: FixedPoint,
        input: FixedPoint,
        decay: FixedPoint,
    ) -> Result<FixedPoint, DecayError>;

    /// Rate after `elapsed` seconds of smoothing from `last_rate` toward `target_rate`.
    fn calculate_rate(
        &self,
        elapsed: i64,
        last_rate: FixedPoint,
        target_rate: FixedPoint,
        decay: FixedPoint,
    ) -> Result<FixedPoint, DecayError> {
        self.accumulate(AccumulationMode::Rate, elapsed, last_rate, target_rate, decay)
    }

    /// Conviction after `elapsed` seconds with `staked` held constant.
    fn calculate_conviction(
        &self,
        elapsed: i64,
        last_conviction: FixedPoint,
        staked: FixedPoint,
        decay: FixedPoint,
    ) -> Result<FixedPoint, DecayError> {
        self.accumulate(AccumulationMode::Conviction, elapsed, last_conviction, staked, decay)
    }

    /// Amount accrued over `[0, elapsed]` by a rate following
    /// [`calculate_rate`](Self::calculate_rate).
    fn calculate_integral(
        &self,
        elapsed: i64,
        last_rate: FixedPoint,
        target_rate: FixedPoint,
        decay: FixedPoint,
    ) -> Result<FixedPoint, DecayError>;

    /// `max_ratio * funds * (1 - sqrt(min_stake_ratio * total_staked / staked))`,
    /// zero at or below the minimum stake.
    fn calculate_target_rate(
        &self,
        staked: FixedPoint,
        total_staked: FixedPoint,
        max_ratio: FixedPoint,
        min_stake_ratio: FixedPoint,
        funds: FixedPoint,
    ) -> Result<FixedPoint, DecayError>;

    /// Conviction counterpart of [`calculate_target_rate`](Self::calculate_target_rate)
    /// with threshold `weight * total_staked / max_ratio^2`.
    fn calculate_reward(
        &self,
        conviction: FixedPoint,
        total_staked: FixedPoint,
        max_ratio: FixedPoint,
        weight: FixedPoint,
        funds: FixedPoint,
    ) -> Result<FixedPoint, DecayError>;

    /// Funding rate for `amount` (stake or conviction, per the threshold variant).
    fn target_for(
        &self,
        params: &DecayParameters,
        amount: FixedPoint,
        total_staked: FixedPoint,
        funds: FixedPoint,
    ) -> Result<FixedPoint, DecayError> {
        match params.threshold {
            Threshold::MinStakeRatio(ratio) => {
                self.calculate_target_rate(amount, total_staked, params.max_ratio, ratio, funds)
            }
            Threshold::Weight(weight) => {
                self.calculate_reward(amount, total_staked, params.max_ratio, weight, funds)
            }
        }
    }
}
