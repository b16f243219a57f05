//! Parameter and state types shared by the engine and its callers.

use serde::{Deserialize, Serialize};

use crate::error::DecayError;
use crate::fixed_point::FixedPoint;
use crate::traits::RateCalculator;

/// Which quantity the decay recurrence accumulates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccumulationMode {
    /// The input is a target flow rate; the value is smoothed toward it.
    Rate,
    /// The input is a staked amount; the value accumulates stake over time
    /// up to `staked / (1 - decay)`. The closed form is normalised by a
    /// single `(1 - decay)`: `last * a^t + staked * (1 - a^t) / (1 - a)`.
    Conviction,
}

/// The parameter gating how much of the funds a subject may draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Threshold {
    /// Stake-ratio variant: a subject needs more than
    /// `min_stake_ratio * total_staked` to receive anything.
    MinStakeRatio(FixedPoint),
    /// Conviction variant: a subject needs more than
    /// `weight * total_staked / max_ratio^2` conviction.
    Weight(FixedPoint),
}

impl Threshold {
    /// The accumulation mode this threshold variant is evaluated against.
    pub fn mode(&self) -> AccumulationMode {
        match self {
            Self::MinStakeRatio(_) => AccumulationMode::Rate,
            Self::Weight(_) => AccumulationMode::Conviction,
        }
    }
}

/// Funding settings: decay per second, maximum funding ratio and threshold.
///
/// Invariants: `0 < decay < 1`, `max_ratio` and `min_stake_ratio` in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecayParameters {
    pub decay: FixedPoint,
    pub max_ratio: FixedPoint,
    pub threshold: Threshold,
}

impl DecayParameters {
    /// Build a validated parameter set.
    pub fn new(
        decay: FixedPoint,
        max_ratio: FixedPoint,
        threshold: Threshold,
    ) -> Result<Self, DecayError> {
        let params = Self {
            decay,
            max_ratio,
            threshold,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), DecayError> {
        validate_decay(self.decay)?;
        validate_ratio("max_ratio", self.max_ratio)?;
        match self.threshold {
            Threshold::MinStakeRatio(ratio) => validate_ratio("min_stake_ratio", ratio),
            Threshold::Weight(_) => Ok(()),
        }
    }

    pub fn mode(&self) -> AccumulationMode {
        self.threshold.mode()
    }
}

/// Reject a decay factor outside the open interval `(0, 1)`.
///
/// `0` would discard history instantly and `>= 1` never converges.
pub fn validate_decay(decay: FixedPoint) -> Result<(), DecayError> {
    if decay.is_zero() || decay >= FixedPoint::ONE {
        return Err(DecayError::InvalidConfiguration(format!(
            "decay must be strictly between 0 and 1, got {decay}"
        )));
    }
    Ok(())
}

/// Reject a ratio outside the closed interval `[0, 1]`.
pub fn validate_ratio(name: &str, ratio: FixedPoint) -> Result<(), DecayError> {
    if ratio > FixedPoint::ONE {
        return Err(DecayError::InvalidConfiguration(format!(
            "{name} must be within [0, 1], got {ratio}"
        )));
    }
    Ok(())
}

/// Last accumulated value of one subject and when it was computed.
///
/// Owned by the caller; the engine only maps it to its successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccumulationState {
    pub last_value: FixedPoint,
    /// Unix seconds.
    pub last_timestamp: i64,
}

impl AccumulationState {
    /// State of a freshly admitted (or deleted) subject.
    pub const EMPTY: Self = Self {
        last_value: FixedPoint::ZERO,
        last_timestamp: 0,
    };

    pub fn new(last_value: FixedPoint, last_timestamp: i64) -> Self {
        Self {
            last_value,
            last_timestamp,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    /// Seconds between the last update and `now`. Negative if `now` is
    /// earlier; the engine rejects that.
    pub fn elapsed_until(&self, now: i64) -> i64 {
        now.saturating_sub(self.last_timestamp)
    }

    /// The value this state accumulates to by `now`, without moving it.
    pub fn value_at<C: RateCalculator + ?Sized>(
        &self,
        calculator: &C,
        mode: AccumulationMode,
        now: i64,
        input: FixedPoint,
        decay: FixedPoint,
    ) -> Result<FixedPoint, DecayError> {
        calculator.accumulate(mode, self.elapsed_until(now), self.last_value, input, decay)
    }

    /// Successor state at `now`, given the input that held since the last update.
    pub fn advance<C: RateCalculator + ?Sized>(
        &self,
        calculator: &C,
        mode: AccumulationMode,
        now: i64,
        input: FixedPoint,
        decay: FixedPoint,
    ) -> Result<Self, DecayError> {
        let value = self.value_at(calculator, mode, now, input, decay)?;
        Ok(Self::new(value, now))
    }

    pub fn clear(&mut self) {
        *self = Self::EMPTY;
    }
}
