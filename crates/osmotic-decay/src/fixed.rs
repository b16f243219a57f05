//! High-precision fixed-point helpers for the decay engine.
//!
//! Public values are scaled by 10^18. Exponentials and logarithms are carried
//! at [`HIGH_PRECISION`] (10^36) so that rounding after thousands of seconds
//! of compounding still leaves 18 exact decimal digits.
//!
//! Error bounds:
//! - [`pow_hp`]: each of at most 128 multiplications rounds to nearest, so the
//!   relative error of `a^t` stays below `t * 10^-36`.
//! - [`ln_hp`]: binary range reduction to `[1, 2)` followed by the series
//!   `ln(m) = 2 * atanh((m - 1) / (m + 1))`; absolute error below 10^-33.

use osmotic_core::error::DecayError;
use osmotic_core::fixed_point::{mul_div, mul_div_round};
use osmotic_core::FixedPoint;
use primitive_types::U256;
use tracing::trace;

/// `10^36`, the internal denominator for powers and logarithms.
pub const HIGH_PRECISION: U256 = U256([12_919_594_847_110_692_864, 54_210_108_624_275_221, 0, 0]);

/// `ln(2) * 10^36`, rounded to nearest.
const LN_2: U256 = U256([9_456_716_947_207_598_648, 37_575_583_950_764_745, 0, 0]);

/// `10^-18` at high precision. Powers below this are clamped to zero.
const POW_FLOOR: U256 = U256([1_000_000_000_000_000_000, 0, 0, 0]);

/// Largest odd denominator evaluated by the `atanh` series. With
/// `z <= 1/3` every term shrinks ninefold, so the loop ends on a zero term
/// long before this.
const ATANH_MAX_DENOMINATOR: u64 = 201;

/// Multiply two high-precision values, rounding to nearest.
pub fn mul_hp(a: U256, b: U256) -> Result<U256, DecayError> {
    mul_div_round(a, b, HIGH_PRECISION).ok_or(DecayError::NumericOverflow)
}

/// `a * b / d`, rounding down, reporting overflow or a zero divisor as
/// [`DecayError::NumericOverflow`].
pub fn checked_mul_div(a: U256, b: U256, d: U256) -> Result<U256, DecayError> {
    mul_div(a, b, d).ok_or(DecayError::NumericOverflow)
}

/// Convert a 10^18-scaled value to 10^36.
pub fn to_high_precision(x: FixedPoint) -> Result<U256, DecayError> {
    x.raw()
        .checked_mul(FixedPoint::scale())
        .ok_or(DecayError::NumericOverflow)
}

/// `base^exp` at [`HIGH_PRECISION`], by binary exponentiation.
///
/// Once the running result (or the squared base still to be applied) drops
/// below 10^-18 the power is clamped to zero: no later factor can raise it
/// back because `base < 1`.
pub fn pow_hp(base: FixedPoint, exp: u64) -> Result<U256, DecayError> {
    let mut result = HIGH_PRECISION;
    if exp == 0 {
        return Ok(result);
    }

    let mut b = to_high_precision(base)?;
    let mut e = exp;

    while e > 0 {
        if e & 1 == 1 {
            result = mul_hp(result, b)?;
            if result < POW_FLOOR {
                trace!(exp, "power clamped to zero");
                return Ok(U256::zero());
            }
        }
        e >>= 1;
        if e > 0 {
            b = mul_hp(b, b)?;
            if b < POW_FLOOR {
                trace!(exp, "power clamped to zero");
                return Ok(U256::zero());
            }
        }
    }

    Ok(result)
}

/// `ln(y)` at [`HIGH_PRECISION`] for `y >= 1` (itself at high precision).
pub fn ln_hp(y: U256) -> Result<U256, DecayError> {
    if y < HIGH_PRECISION {
        return Err(DecayError::InvalidArgument(
            "logarithm argument below one".to_string(),
        ));
    }

    // y = m * 2^k with m in [1, 2)
    let mut k = y.bits() - HIGH_PRECISION.bits();
    let mut m = y >> k;
    if m < HIGH_PRECISION {
        k -= 1;
        m = y >> k;
    }

    let ln_m = ln_near_one(m)?;
    LN_2.checked_mul(U256::from(k as u64))
        .and_then(|scaled| scaled.checked_add(ln_m))
        .ok_or(DecayError::NumericOverflow)
}

/// `ln(1 / a)` at [`HIGH_PRECISION`] for a fixed-point `a` in `(0, 1]`.
pub fn ln_inv_hp(a: FixedPoint) -> Result<U256, DecayError> {
    if a.is_zero() {
        return Err(DecayError::InvalidArgument(
            "logarithm of 1/0".to_string(),
        ));
    }
    // 1/a at high precision: 10^36 * 10^18 / a
    let inv = checked_mul_div(HIGH_PRECISION, FixedPoint::scale(), a.raw())?;
    ln_hp(inv)
}

/// `ln(m)` for `m` in `[1, 2)`.
fn ln_near_one(m: U256) -> Result<U256, DecayError> {
    let z = checked_mul_div(m - HIGH_PRECISION, HIGH_PRECISION, m + HIGH_PRECISION)?;
    let z2 = mul_hp(z, z)?;

    let mut term = z;
    let mut sum = z;
    for n in (3..=ATANH_MAX_DENOMINATOR).step_by(2) {
        term = checked_mul_div(term, z2, HIGH_PRECISION)?;
        if term.is_zero() {
            break;
        }
        sum += term / U256::from(n);
    }

    // sum <= atanh(1/3) < 0.35
    Ok(sum << 1)
}

/// `sqrt(num / den)` as a 10^18-scaled value, rounded down.
pub fn sqrt_ratio(num: U256, den: U256) -> Result<U256, DecayError> {
    Ok(checked_mul_div(num, HIGH_PRECISION, den)?.integer_sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fp(s: &str) -> FixedPoint {
        s.parse().unwrap()
    }

    fn hp(s: &str) -> U256 {
        U256::from_dec_str(s).unwrap()
    }

    fn abs_diff(a: U256, b: U256) -> U256 {
        if a > b { a - b } else { b - a }
    }

    #[test]
    fn constants_are_exact() {
        assert_eq!(HIGH_PRECISION, U256::exp10(36));
        assert_eq!(POW_FLOOR, U256::exp10(18));
        assert_eq!(LN_2, hp("693147180559945309417232121458176568"));
    }

    // --- pow_hp ---

    #[test]
    fn pow_zero_exponent() {
        assert_eq!(pow_hp(fp("0.3"), 0).unwrap(), HIGH_PRECISION);
    }

    #[test]
    fn pow_one_exponent() {
        assert_eq!(pow_hp(fp("0.3"), 1).unwrap(), to_high_precision(fp("0.3")).unwrap());
    }

    #[test]
    fn pow_squares_exactly() {
        assert_eq!(pow_hp(fp("0.5"), 2).unwrap(), HIGH_PRECISION / 4);
        assert_eq!(pow_hp(fp("0.9"), 3).unwrap(), hp("729000000000000000000000000000000000"));
    }

    #[test]
    fn pow_one_day_at_default_decay() {
        // 0.9999999^86400
        let expected = hp("991397217108081841935339345344792766");
        let got = pow_hp(fp("0.9999999"), 86_400).unwrap();
        assert!(abs_diff(got, expected) < U256::exp10(8), "got {got}");
    }

    #[test]
    fn pow_adaptive_period_month() {
        // AP_1_MONTH^MONTH == 0.001
        let got = pow_hp(FixedPoint::from_raw_u128(osmotic_core::constants::AP_1_MONTH), 2_592_000).unwrap();
        let expected = hp("1000000000078894593238207355116349");
        assert!(abs_diff(got, expected) < U256::exp10(9), "got {got}");
    }

    #[test]
    fn pow_clamps_below_floor() {
        // 2^-59 ~ 1.7e-18 survives, 2^-60 ~ 8.7e-19 does not.
        assert!(!pow_hp(fp("0.5"), 59).unwrap().is_zero());
        assert!(pow_hp(fp("0.5"), 60).unwrap().is_zero());
        assert!(pow_hp(fp("0.5"), 10_000).unwrap().is_zero());
        assert!(pow_hp(fp("0.9999999"), u64::MAX).unwrap().is_zero());
    }

    // --- ln ---

    #[test]
    fn ln_of_one_is_zero() {
        assert_eq!(ln_hp(HIGH_PRECISION).unwrap(), U256::zero());
    }

    #[test]
    fn ln_of_two_is_constant() {
        assert_eq!(ln_hp(HIGH_PRECISION * 2).unwrap(), LN_2);
    }

    #[test]
    fn ln_of_ten() {
        let expected = hp("2302585092994045684017991454684364208");
        let got = ln_hp(HIGH_PRECISION * 10).unwrap();
        assert!(abs_diff(got, expected) < U256::from(1_000), "got {got}");
    }

    #[test]
    fn ln_below_one_rejected() {
        assert!(matches!(
            ln_hp(HIGH_PRECISION - 1),
            Err(DecayError::InvalidArgument(_))
        ));
    }

    #[test]
    fn ln_inv_default_decay() {
        let expected = hp("100000005000000333333358333335");
        let got = ln_inv_hp(fp("0.9999999")).unwrap();
        assert!(abs_diff(got, expected) < U256::from(1_000), "got {got}");
    }

    #[test]
    fn ln_inv_half_is_ln_two() {
        assert_eq!(ln_inv_hp(fp("0.5")).unwrap(), LN_2);
    }

    #[test]
    fn ln_inv_smallest_and_largest_decay() {
        // a = 1e-18: ln(1e18) = 41.446...
        let big = ln_inv_hp(FixedPoint::from_raw_u128(1)).unwrap();
        let expected = hp("41446531673892822312323846184110700000");
        assert!(abs_diff(big, expected) < U256::exp10(30), "got {big}");
        // a = 1 - 1e-18: ln ~ 1e-18
        let tiny = ln_inv_hp(FixedPoint::from_raw_u128(999_999_999_999_999_999)).unwrap();
        assert!(abs_diff(tiny, U256::exp10(18)) < U256::from(10), "got {tiny}");
    }

    // --- sqrt ---

    #[test]
    fn sqrt_of_quarter() {
        let root = sqrt_ratio(U256::from(1), U256::from(4)).unwrap();
        assert_eq!(root, FixedPoint::scale() / 2);
    }

    #[test]
    fn sqrt_of_one() {
        assert_eq!(sqrt_ratio(U256::from(7), U256::from(7)).unwrap(), FixedPoint::scale());
    }

    #[test]
    fn sqrt_zero_denominator_is_error() {
        assert_eq!(
            sqrt_ratio(U256::one(), U256::zero()),
            Err(DecayError::NumericOverflow)
        );
    }

    // --- proptest ---

    proptest! {
        #[test]
        fn pow_never_exceeds_one(raw in 1u128..1_000_000_000_000_000_000u128, exp in 0u64..1_000_000) {
            let p = pow_hp(FixedPoint::from_raw_u128(raw), exp).unwrap();
            prop_assert!(p <= HIGH_PRECISION);
        }

        #[test]
        fn pow_monotonic_in_exponent(
            raw in 900_000_000_000_000_000u128..1_000_000_000_000_000_000u128,
            exp in 0u64..1_000_000,
        ) {
            let a = FixedPoint::from_raw_u128(raw);
            prop_assert!(pow_hp(a, exp + 1).unwrap() <= pow_hp(a, exp).unwrap());
        }

        #[test]
        fn ln_of_product_is_sum(x in 1u64..1_000_000, y in 1u64..1_000_000) {
            let lx = ln_hp(HIGH_PRECISION * x).unwrap();
            let ly = ln_hp(HIGH_PRECISION * y).unwrap();
            let lxy = ln_hp(HIGH_PRECISION * x * y).unwrap();
            prop_assert!(abs_diff(lx + ly, lxy) < U256::from(10_000));
        }

        #[test]
        fn sqrt_squares_back(n in 1u64..1_000_000, d in 1u64..1_000_000) {
            let root = sqrt_ratio(U256::from(n), U256::from(d)).unwrap();
            let squared = root * root / FixedPoint::scale();
            let exact = U256::from(n) * FixedPoint::scale() / U256::from(d);
            prop_assert!(squared <= exact);
            prop_assert!(exact - squared < U256::exp10(10));
        }
    }
}
