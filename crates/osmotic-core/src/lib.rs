//! # osmotic-core
//! Foundation types and traits for the Osmotic decay-rate engine.
//!
//! All amounts are [`FixedPoint`](fixed_point::FixedPoint) values: unsigned
//! integers scaled by 10^18. Nothing at this boundary uses floating point.

pub mod constants;
pub mod error;
pub mod fixed_point;
pub mod traits;
pub mod types;

pub use error::{DecayError, LedgerError, OsmoticError, SettingsError};
pub use fixed_point::FixedPoint;
pub use traits::RateCalculator;
pub use types::{AccumulationMode, AccumulationState, DecayParameters, Threshold};
