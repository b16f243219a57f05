//! Square-root funding threshold.
//!
//! `share = max_ratio * funds * (1 - sqrt(threshold / amount))`, zero while
//! `amount <= threshold`. The stake-ratio variant uses
//! `threshold = min_stake_ratio * total_staked`; the conviction variant uses
//! `threshold = weight * total_staked / max_ratio^2`.

use osmotic_core::error::DecayError;
use osmotic_core::FixedPoint;
use primitive_types::U256;

use crate::fixed::{checked_mul_div, sqrt_ratio, HIGH_PRECISION};

/// `min_stake_ratio * total_staked`, rounded down.
pub fn min_stake(total_staked: FixedPoint, min_stake_ratio: FixedPoint) -> Result<U256, DecayError> {
    checked_mul_div(min_stake_ratio.raw(), total_staked.raw(), FixedPoint::scale())
}

/// `weight * total_staked / max_ratio^2`, or `None` when `max_ratio` is zero
/// and no conviction can ever pass.
pub fn conviction_threshold(
    total_staked: FixedPoint,
    max_ratio: FixedPoint,
    weight: FixedPoint,
) -> Result<Option<U256>, DecayError> {
    if max_ratio.is_zero() {
        return Ok(None);
    }
    let weighted = checked_mul_div(weight.raw(), total_staked.raw(), FixedPoint::scale())?;
    // max_ratio <= 1, so its square fits in 10^36.
    let ratio_squared = max_ratio.raw() * max_ratio.raw();
    checked_mul_div(weighted, HIGH_PRECISION, ratio_squared).map(Some)
}

/// The bounded funding share of `amount` against `threshold`.
///
/// - `amount == 0` gives zero before anything is divided by it.
/// - `threshold == 0` (no competing stake) gives the full `max_ratio * funds`.
/// - The bracket `1 - sqrt(..)` saturates at zero.
pub fn bounded_share(
    amount: FixedPoint,
    threshold: U256,
    max_ratio: FixedPoint,
    funds: FixedPoint,
) -> Result<FixedPoint, DecayError> {
    if amount.is_zero() {
        return Ok(FixedPoint::ZERO);
    }

    let cap = checked_mul_div(max_ratio.raw(), funds.raw(), FixedPoint::scale())?;
    if threshold.is_zero() {
        return Ok(FixedPoint::from_raw(cap));
    }
    if amount.raw() <= threshold {
        return Ok(FixedPoint::ZERO);
    }

    let root = sqrt_ratio(threshold, amount.raw())?;
    let bracket = FixedPoint::scale().saturating_sub(root);
    checked_mul_div(cap, bracket, FixedPoint::scale()).map(FixedPoint::from_raw)
}
