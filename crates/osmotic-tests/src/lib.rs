//! Integration test suite for the Osmotic decay-rate engine.
//!
//! Exercises the flow and proposal ledgers end to end and checks the
//! fixed-point engine against floating-point reference formulas.

pub mod helpers;
