//! # osmotic-ledger
//! In-memory ledgers over the decay engine.
//!
//! Owns the [`AccumulationState`](osmotic_core::AccumulationState) of each
//! subject and advances it through a
//! [`RateCalculator`](osmotic_core::RateCalculator) on every event.
//!
//! - [`FlowBook`]: adaptive flows whose rate eases toward a target rate.
//! - [`ProposalBook`]: stake-weighted proposals funded by rate or conviction.
//!
//! No persistence, token custody or access control.

pub mod flows;
pub mod proposals;

pub use flows::{Flow, FlowBook, FlowKey};
pub use proposals::{Proposal, ProposalBook};
