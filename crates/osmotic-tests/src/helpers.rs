//! Shared helpers: fixed-point shorthands and `f64` reference formulas.
//!
//! The reference formulas are accurate to roughly 1e-12 relative, which is
//! enough to check the engine's fixed-point results at test tolerances.

use osmotic_core::FixedPoint;

pub const START: i64 = 1_700_000_000;

/// Parse a decimal amount.
pub fn fp(s: &str) -> FixedPoint {
    s.parse().unwrap()
}

/// Nearest fixed-point value to a positive `f64`.
pub fn fp_f64(value: f64) -> FixedPoint {
    FixedPoint::from_raw_u128((value * 1e18).round() as u128)
}

pub fn to_f64(value: FixedPoint) -> f64 {
    value.to_f64_lossy()
}

/// `last * a^t + target * (1 - a^t)`.
pub fn reference_rate(t: f64, last: f64, target: f64, decay: f64) -> f64 {
    let at = decay.powf(t);
    at * last + target * (1.0 - at)
}

/// `last * a^t + staked * (1 - a^t) / (1 - a)`.
pub fn reference_conviction(t: f64, last: f64, staked: f64, decay: f64) -> f64 {
    let at = decay.powf(t);
    at * last + staked * (1.0 - at) / (1.0 - decay)
}

/// Integral of [`reference_rate`] over `[0, t]`:
/// `target * t + (last - target) * (1 - a^t) / ln(1/a)`.
pub fn reference_integral(t: f64, last: f64, target: f64, decay: f64) -> f64 {
    let ln_inv = -decay.ln();
    // (1 - a^t) without cancellation for a close to one
    let one_sub_at = -(t * decay.ln()).exp_m1();
    target * t + (last - target) * one_sub_at / ln_inv
}

/// `max_ratio * funds * (1 - sqrt(min_stake_ratio * total / staked))`, or zero
/// at or below the threshold.
pub fn reference_target_rate(
    staked: f64,
    total: f64,
    max_ratio: f64,
    min_stake_ratio: f64,
    funds: f64,
) -> f64 {
    let threshold = min_stake_ratio * total;
    if staked <= threshold {
        return 0.0;
    }
    max_ratio * funds * (1.0 - (threshold / staked).sqrt())
}

/// Trapezoidal sum of the rate stepped one second at a time through the
/// fixed-point recurrence.
pub fn stepped_integral<C: osmotic_core::RateCalculator + ?Sized>(
    calculator: &C,
    seconds: u64,
    last: FixedPoint,
    target: FixedPoint,
    decay: FixedPoint,
) -> f64 {
    let mut rate = last;
    let mut total = 0.0;
    for _ in 0..seconds {
        let next = calculator.calculate_rate(1, rate, target, decay).unwrap();
        total += (to_f64(rate) + to_f64(next)) / 2.0;
        rate = next;
    }
    total
}

/// `|a - b| / |b|`, or `|a|` when `b` is zero.
pub fn relative_error(a: f64, b: f64) -> f64 {
    if b == 0.0 {
        a.abs()
    } else {
        ((a - b) / b).abs()
    }
}
