//! Decay engine implementing the [`RateCalculator`] trait.
//!
//! Provides the exponential-decay recurrence for rates and conviction, the
//! closed-form integral of a smoothed rate, and the square-root funding
//! threshold. All arithmetic is integer-only over U256 with 512-bit
//! intermediates.

use osmotic_core::error::DecayError;
use osmotic_core::traits::RateCalculator;
use osmotic_core::types::{validate_decay, validate_ratio, AccumulationMode};
use osmotic_core::FixedPoint;
use primitive_types::U256;
use tracing::debug;

use crate::fixed::{checked_mul_div, ln_inv_hp, mul_hp, pow_hp, HIGH_PRECISION};
use crate::threshold;

/// `10^-12` at high precision. Below this `t * ln(1/a)` the integral uses its
/// power series instead of dividing by the logarithm.
const SERIES_CUTOFF: U256 = U256([2_003_764_205_206_896_640, 54_210, 0, 0]);

/// Stateless fixed-point engine behind flows and proposal funding.
///
/// Powers of the decay factor are taken at 10^36 and read as zero once they
/// fall under 10^-18. Accrued amounts divide by a fixed-point `ln(1/a)`,
/// and funding thresholds go through an integer square root.
#[derive(Debug, Clone, Default)]
pub struct DecayEngine;

impl DecayEngine {
    pub fn new() -> Self {
        Self
    }
}

fn elapsed_seconds(elapsed: i64) -> Result<u64, DecayError> {
    u64::try_from(elapsed).map_err(|_| {
        DecayError::InvalidArgument(format!("elapsed time must be non-negative, got {elapsed}"))
    })
}

/// `(1 - a^t) / ln(1/a)` in seconds, at high precision. Never exceeds `t`.
fn decay_window_hp(decay: FixedPoint, t: u64) -> Result<U256, DecayError> {
    let t_hp = HIGH_PRECISION
        .checked_mul(U256::from(t))
        .ok_or(DecayError::NumericOverflow)?;
    let ln_inv = ln_inv_hp(decay)?;
    let x = ln_inv
        .checked_mul(U256::from(t))
        .ok_or(DecayError::NumericOverflow)?;

    let window = if x < SERIES_CUTOFF {
        debug!(t, "decay window from series");
        // t * (1 - x/2 + x^2/6 - x^3/24)
        let x2 = mul_hp(x, x)?;
        let x3 = mul_hp(x2, x)?;
        let factor = (HIGH_PRECISION + x2 / U256::from(6u64))
            .saturating_sub(x / U256::from(2u64) + x3 / U256::from(24u64));
        factor
            .checked_mul(U256::from(t))
            .ok_or(DecayError::NumericOverflow)?
    } else {
        let at = pow_hp(decay, t)?;
        checked_mul_div(HIGH_PRECISION - at, HIGH_PRECISION, ln_inv)?
    };

    Ok(window.min(t_hp))
}

impl RateCalculator for DecayEngine {
    fn accumulate(
        &self,
        mode: AccumulationMode,
        elapsed: i64,
        last_value: FixedPoint,
        input: FixedPoint,
        decay: FixedPoint,
    ) -> Result<FixedPoint, DecayError> {
        validate_decay(decay)?;
        let t = elapsed_seconds(elapsed)?;
        if t == 0 {
            return Ok(last_value);
        }

        let at = pow_hp(decay, t)?;
        let gap = HIGH_PRECISION - at;
        let retained = checked_mul_div(last_value.raw(), at, HIGH_PRECISION)?;

        let approached = match mode {
            AccumulationMode::Rate => checked_mul_div(input.raw(), gap, HIGH_PRECISION)?,
            AccumulationMode::Conviction => {
                // staked * (1 - a^t) / (1 - a)
                let one_minus_a = FixedPoint::scale() - decay.raw();
                checked_mul_div(
                    input.raw(),
                    gap * FixedPoint::scale(),
                    HIGH_PRECISION * one_minus_a,
                )?
            }
        };

        retained
            .checked_add(approached)
            .map(FixedPoint::from_raw)
            .ok_or(DecayError::NumericOverflow)
    }

    fn calculate_integral(
        &self,
        elapsed: i64,
        last_rate: FixedPoint,
        target_rate: FixedPoint,
        decay: FixedPoint,
    ) -> Result<FixedPoint, DecayError> {
        validate_decay(decay)?;
        let t = elapsed_seconds(elapsed)?;
        if t == 0 {
            return Ok(FixedPoint::ZERO);
        }

        let linear = target_rate
            .checked_mul_int(t)
            .ok_or(DecayError::NumericOverflow)?;
        if last_rate == target_rate {
            return Ok(linear);
        }

        let window = decay_window_hp(decay, t)?;
        if last_rate > target_rate {
            let excess = checked_mul_div(last_rate.raw() - target_rate.raw(), window, HIGH_PRECISION)?;
            linear.try_add(FixedPoint::from_raw(excess))
        } else {
            let shortfall = checked_mul_div(target_rate.raw() - last_rate.raw(), window, HIGH_PRECISION)?;
            Ok(linear.saturating_sub(FixedPoint::from_raw(shortfall)))
        }
    }

    fn calculate_target_rate(
        &self,
        staked: FixedPoint,
        total_staked: FixedPoint,
        max_ratio: FixedPoint,
        min_stake_ratio: FixedPoint,
        funds: FixedPoint,
    ) -> Result<FixedPoint, DecayError> {
        validate_ratio("max_ratio", max_ratio)?;
        validate_ratio("min_stake_ratio", min_stake_ratio)?;
        let min_stake = threshold::min_stake(total_staked, min_stake_ratio)?;
        threshold::bounded_share(staked, min_stake, max_ratio, funds)
    }

    fn calculate_reward(
        &self,
        conviction: FixedPoint,
        total_staked: FixedPoint,
        max_ratio: FixedPoint,
        weight: FixedPoint,
        funds: FixedPoint,
    ) -> Result<FixedPoint, DecayError> {
        validate_ratio("max_ratio", max_ratio)?;
        match threshold::conviction_threshold(total_staked, max_ratio, weight)? {
            Some(min_conviction) => {
                threshold::bounded_share(conviction, min_conviction, max_ratio, funds)
            }
            None => Ok(FixedPoint::ZERO),
        }
    }
}
