//! # osmotic-decay
//! Fixed-point decay-rate engine.
//!
//! All calculations use integer arithmetic only for determinism.
//!
//! - **Decay recurrence**: `v' = v * a^t + target * (1 - a^t)`, with `a^t`
//!   from binary exponentiation at 10^36 precision, clamped to zero once it
//!   drops below 10^-18.
//! - **Closed-form integral**: the amount accrued by a smoothed rate over a
//!   window, using a fixed-point natural logarithm of `1/a`.
//! - **Threshold formula**: `max_ratio * funds * (1 - sqrt(threshold / amount))`
//!   with an integer square root.

pub mod engine;
pub mod fixed;
pub mod threshold;

pub use engine::DecayEngine;
pub use fixed::HIGH_PRECISION;
