//! Engine constants. All fixed-point values are scaled by 10^18.

/// Number of decimal places carried by a [`FixedPoint`](crate::FixedPoint).
pub const FIXED_POINT_DECIMALS: usize = 18;

/// `1.0` in fixed-point representation.
pub const FIXED_POINT_SCALE: u128 = 1_000_000_000_000_000_000;

/// Scale used by the older parameter profile (`decay = 0.9999999e7`).
pub const LEGACY_PARAMETER_SCALE: u128 = 10_000_000;

pub const MINUTE: i64 = 60;
pub const HOUR: i64 = 60 * MINUTE;
pub const DAY: i64 = 24 * HOUR;
pub const MONTH: i64 = 30 * DAY;

/// Adaptive period after which a flow has closed 99.9% of the gap to its
/// target rate: `AP_1_MONTH^MONTH == 0.001`.
pub const AP_1_MONTH: u128 = 999_997_334_974_508_400;

/// Default per-second decay of the conviction profile (0.9999999).
pub const DEFAULT_DECAY: u128 = 999_999_900_000_000_000;

/// Default maximum share of the funds a proposal may stream per second:
/// 2% per month.
pub const DEFAULT_MAX_RATIO: u128 = 20_000_000_000_000_000 / MONTH as u128;

/// Default conviction weight (0.025).
pub const DEFAULT_WEIGHT: u128 = 25_000_000_000_000_000;

/// Decay of the stake-ratio funding profile (0.99999).
pub const FUNDING_DECAY: u128 = 999_990_000_000_000_000;

/// Maximum ratio of the stake-ratio funding profile (0.1).
pub const FUNDING_MAX_RATIO: u128 = 100_000_000_000_000_000;

/// Minimum stake ratio of the stake-ratio funding profile (0.002).
pub const FUNDING_MIN_STAKE_RATIO: u128 = 2_000_000_000_000_000;

/// Legacy-scale conviction profile: decay 0.9999999.
pub const LEGACY_DECAY: u128 = 9_999_999;

/// Legacy-scale conviction profile: max ratio 0.2.
pub const LEGACY_MAX_RATIO: u128 = 2_000_000;

/// Legacy-scale conviction profile: weight 0.0025.
pub const LEGACY_WEIGHT: u128 = 25_000;
