//! Fixed-point amounts scaled by 10^18.
//!
//! [`FixedPoint`] is the only numeric type crossing the engine boundary.
//! Intermediate products are widened to 512 bits by [`mul_div`], so a
//! multiplication followed by a division only fails when the final quotient
//! itself does not fit in 256 bits.

use std::fmt;
use std::str::FromStr;

use primitive_types::{U256, U512};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::constants::{FIXED_POINT_DECIMALS, FIXED_POINT_SCALE};
use crate::error::DecayError;

/// A non-negative real number stored as an integer scaled by 10^18.
///
/// # Examples
///
/// ```
/// use osmotic_core::FixedPoint;
/// let x: FixedPoint = "1.5".parse().unwrap();
/// assert_eq!(x.raw().as_u128(), 1_500_000_000_000_000_000);
/// assert_eq!(x.to_string(), "1.5");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FixedPoint(U256);

impl FixedPoint {
    pub const ZERO: Self = Self(U256([0; 4]));
    pub const ONE: Self = Self(U256([FIXED_POINT_SCALE as u64, 0, 0, 0]));

    /// Wrap an already-scaled integer.
    pub fn from_raw(raw: U256) -> Self {
        Self(raw)
    }

    pub fn from_raw_u128(raw: u128) -> Self {
        Self(U256::from(raw))
    }

    /// The scaled integer behind this value.
    pub fn raw(self) -> U256 {
        self.0
    }

    /// `10^18` as a 256-bit integer.
    pub fn scale() -> U256 {
        U256::from(FIXED_POINT_SCALE)
    }

    /// A whole number of tokens. Cannot overflow: `u64::MAX * 10^18 < 2^256`.
    pub fn from_tokens(tokens: u64) -> Self {
        Self(U256::from(tokens) * Self::scale())
    }

    /// Rescale a value expressed with a different denominator (e.g. the 1e7
    /// parameter profile) to the 10^18 representation, rounding down.
    pub fn from_scaled(value: u128, scale: u128) -> Result<Self, DecayError> {
        if scale == 0 {
            return Err(DecayError::InvalidConfiguration(
                "parameter scale must be positive".to_string(),
            ));
        }
        mul_div(U256::from(value), Self::scale(), U256::from(scale))
            .map(Self)
            .ok_or(DecayError::NumericOverflow)
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    pub fn saturating_add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }

    pub fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }

    /// `self * rhs`, rounding down.
    pub fn checked_mul(self, rhs: Self) -> Option<Self> {
        mul_div(self.0, rhs.0, Self::scale()).map(Self)
    }

    /// `self / rhs`, rounding down. `None` when `rhs` is zero.
    pub fn checked_div(self, rhs: Self) -> Option<Self> {
        mul_div(self.0, Self::scale(), rhs.0).map(Self)
    }

    /// Multiply by a plain integer (e.g. a rate by a number of seconds).
    pub fn checked_mul_int(self, n: u64) -> Option<Self> {
        self.0.checked_mul(U256::from(n)).map(Self)
    }

    /// [`checked_add`](Self::checked_add) reporting [`DecayError::NumericOverflow`].
    pub fn try_add(self, rhs: Self) -> Result<Self, DecayError> {
        self.checked_add(rhs).ok_or(DecayError::NumericOverflow)
    }

    /// [`checked_sub`](Self::checked_sub) reporting [`DecayError::NumericOverflow`].
    pub fn try_sub(self, rhs: Self) -> Result<Self, DecayError> {
        self.checked_sub(rhs).ok_or(DecayError::NumericOverflow)
    }

    /// Approximate value as `f64`. For display and test oracles only.
    pub fn to_f64_lossy(self) -> f64 {
        let scale = Self::scale();
        let whole = self.0 / scale;
        let frac = self.0 % scale;
        let whole = if whole.bits() <= 128 {
            whole.low_u128() as f64
        } else {
            f64::INFINITY
        };
        whole + frac.low_u128() as f64 / FIXED_POINT_SCALE as f64
    }
}

/// `a * b / d` with a 512-bit intermediate, rounding down.
///
/// Returns `None` when `d` is zero or the quotient exceeds 256 bits.
pub fn mul_div(a: U256, b: U256, d: U256) -> Option<U256> {
    if d.is_zero() {
        return None;
    }
    narrow(a.full_mul(b) / U512::from(d))
}

/// `a * b / d` with a 512-bit intermediate, rounding half up.
pub fn mul_div_round(a: U256, b: U256, d: U256) -> Option<U256> {
    if d.is_zero() {
        return None;
    }
    let d = U512::from(d);
    let product = a.full_mul(b);
    // product < 2^512 - 2^255 since both factors are below 2^256.
    narrow((product + (d >> 1)) / d)
}

fn narrow(wide: U512) -> Option<U256> {
    let U512(words) = wide;
    if words[4..].iter().any(|&w| w != 0) {
        return None;
    }
    Some(U256([words[0], words[1], words[2], words[3]]))
}

impl fmt::Display for FixedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scale = Self::scale();
        let whole = self.0 / scale;
        let frac = (self.0 % scale).low_u64();
        if frac == 0 {
            return write!(f, "{whole}");
        }
        let digits = format!("{frac:0width$}", width = FIXED_POINT_DECIMALS);
        write!(f, "{whole}.{}", digits.trim_end_matches('0'))
    }
}

impl FromStr for FixedPoint {
    type Err = DecayError;

    /// Parse a non-negative decimal such as `"12"`, `"0.5"` or `".25"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || DecayError::InvalidArgument(format!("invalid decimal amount: {s:?}"));

        let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
        if whole.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if frac.len() > FIXED_POINT_DECIMALS {
            return Err(DecayError::InvalidArgument(format!(
                "more than {FIXED_POINT_DECIMALS} decimals: {s:?}"
            )));
        }

        let whole = if whole.is_empty() {
            U256::zero()
        } else {
            U256::from_dec_str(whole).map_err(|_| DecayError::NumericOverflow)?
        };
        let frac = if frac.is_empty() {
            U256::zero()
        } else {
            let padded = format!("{frac:0<width$}", width = FIXED_POINT_DECIMALS);
            U256::from_dec_str(&padded).map_err(|_| invalid())?
        };

        whole
            .checked_mul(Self::scale())
            .and_then(|w| w.checked_add(frac))
            .map(Self)
            .ok_or(DecayError::NumericOverflow)
    }
}

impl From<u64> for FixedPoint {
    fn from(tokens: u64) -> Self {
        Self::from_tokens(tokens)
    }
}

impl Serialize for FixedPoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for FixedPoint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
