//! Error types for the Osmotic engine and its ledgers.
use thiserror::Error;

use crate::types::AccumulationMode;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecayError {
    #[error("invalid argument: {0}")] InvalidArgument(String),
    #[error("invalid configuration: {0}")] InvalidConfiguration(String),
    #[error("numeric overflow")] NumericOverflow,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("flow already exists: {0}")] FlowExists(String),
    #[error("flow not found: {0}")] FlowNotFound(String),
    #[error("proposal not found: {0}")] ProposalNotFound(u64),
    #[error("proposal {0} is not active")] ProposalInactive(u64),
    #[error("insufficient stake: have {have}, need {need}")] InsufficientStake { have: String, need: String },
    #[error("timestamp {now} precedes last update {last}")] TimestampRegression { now: i64, last: i64 },
    #[error("operation needs {expected:?} accumulation")] WrongMode { expected: AccumulationMode },
    #[error(transparent)] Decay(#[from] DecayError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    #[error("unknown profile: {0}")] UnknownProfile(String),
    #[error("unknown network: {0}")] UnknownNetwork(u64),
    #[error("invalid profile {name}: {reason}")] InvalidProfile { name: String, reason: String },
    #[error("load: {0}")] Load(String),
}

#[derive(Error, Debug)]
pub enum OsmoticError {
    #[error(transparent)] Decay(#[from] DecayError),
    #[error(transparent)] Ledger(#[from] LedgerError),
    #[error(transparent)] Settings(#[from] SettingsError),
}
