//! Adaptive flows.
//!
//! A flow streams `token` from `sender` to `receiver` at a rate that eases
//! from its last checkpoint toward `target_rate` with per-second decay
//! `decay`. Each update folds the elapsed window into the settled balance
//! before the target changes, so balances stay exact across updates.

use std::fmt;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use osmotic_core::error::LedgerError;
use osmotic_core::types::validate_decay;
use osmotic_core::{AccumulationMode, AccumulationState, FixedPoint, RateCalculator};
use osmotic_decay::DecayEngine;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Identifies a flow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowKey {
    pub token: String,
    pub sender: String,
    pub receiver: String,
}

impl FlowKey {
    pub fn new(
        token: impl Into<String>,
        sender: impl Into<String>,
        receiver: impl Into<String>,
    ) -> Self {
        Self {
            token: token.into(),
            sender: sender.into(),
            receiver: receiver.into(),
        }
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}->{}", self.token, self.sender, self.receiver)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flow {
    /// Rate at the last checkpoint and when it was taken.
    pub state: AccumulationState,
    pub target_rate: FixedPoint,
    pub decay: FixedPoint,
    /// Amount streamed up to `state.last_timestamp`.
    pub settled: FixedPoint,
}

/// All flows, keyed by `(token, sender, receiver)`.
pub struct FlowBook {
    calculator: Arc<dyn RateCalculator>,
    flows: DashMap<FlowKey, Flow>,
}

impl Default for FlowBook {
    fn default() -> Self {
        Self::new(Arc::new(DecayEngine::new()))
    }
}

impl FlowBook {
    pub fn new(calculator: Arc<dyn RateCalculator>) -> Self {
        Self {
            calculator,
            flows: DashMap::new(),
        }
    }

    /// Open a flow at rate zero heading toward `target_rate`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::FlowExists`] if the key is taken
    /// - [`LedgerError::Decay`] if `decay` is outside `(0, 1)`
    pub fn create_flow(
        &self,
        key: FlowKey,
        target_rate: FixedPoint,
        decay: FixedPoint,
        now: i64,
    ) -> Result<Flow, LedgerError> {
        validate_decay(decay)?;
        match self.flows.entry(key) {
            Entry::Occupied(entry) => Err(LedgerError::FlowExists(entry.key().to_string())),
            Entry::Vacant(entry) => {
                let flow = Flow {
                    state: AccumulationState::new(FixedPoint::ZERO, now),
                    target_rate,
                    decay,
                    settled: FixedPoint::ZERO,
                };
                info!(flow = %entry.key(), %target_rate, "flow created");
                entry.insert(flow.clone());
                Ok(flow)
            }
        }
    }

    /// Checkpoint the flow at `now`, then retarget it.
    pub fn update_flow(
        &self,
        key: &FlowKey,
        target_rate: FixedPoint,
        now: i64,
    ) -> Result<Flow, LedgerError> {
        let mut flow = self
            .flows
            .get_mut(key)
            .ok_or_else(|| LedgerError::FlowNotFound(key.to_string()))?;
        self.checkpoint(&mut flow, now)?;
        flow.target_rate = target_rate;
        debug!(flow = %key, rate = %flow.state.last_value, %target_rate, "flow updated");
        Ok(flow.value().clone())
    }

    /// Remove a flow. A flow created again under the same key starts from
    /// rate zero with nothing settled.
    pub fn delete_flow(&self, key: &FlowKey) -> Result<Flow, LedgerError> {
        let (_, flow) = self
            .flows
            .remove(key)
            .ok_or_else(|| LedgerError::FlowNotFound(key.to_string()))?;
        info!(flow = %key, "flow deleted");
        Ok(flow)
    }

    pub fn get_flow(&self, key: &FlowKey) -> Option<Flow> {
        self.flows.get(key).map(|flow| flow.value().clone())
    }

    /// Instantaneous rate of the flow at `time`.
    pub fn flow_rate_at(&self, key: &FlowKey, time: i64) -> Result<FixedPoint, LedgerError> {
        let flow = self.lookup(key)?;
        ensure_forward(&flow.state, time)?;
        Ok(flow.state.value_at(
            &*self.calculator,
            AccumulationMode::Rate,
            time,
            flow.target_rate,
            flow.decay,
        )?)
    }

    /// Total streamed by `time`: the settled amount plus the integral of the
    /// rate since the last checkpoint.
    pub fn balance_at(&self, key: &FlowKey, time: i64) -> Result<FixedPoint, LedgerError> {
        let flow = self.lookup(key)?;
        let elapsed = ensure_forward(&flow.state, time)?;
        let accrued = self.calculator.calculate_integral(
            elapsed,
            flow.state.last_value,
            flow.target_rate,
            flow.decay,
        )?;
        Ok(flow.settled.try_add(accrued)?)
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    fn lookup(&self, key: &FlowKey) -> Result<Flow, LedgerError> {
        self.get_flow(key)
            .ok_or_else(|| LedgerError::FlowNotFound(key.to_string()))
    }

    fn checkpoint(&self, flow: &mut Flow, now: i64) -> Result<(), LedgerError> {
        let elapsed = ensure_forward(&flow.state, now)?;
        let accrued = self.calculator.calculate_integral(
            elapsed,
            flow.state.last_value,
            flow.target_rate,
            flow.decay,
        )?;
        let settled = flow.settled.try_add(accrued)?;
        let state = flow.state.advance(
            &*self.calculator,
            AccumulationMode::Rate,
            now,
            flow.target_rate,
            flow.decay,
        )?;
        flow.settled = settled;
        flow.state = state;
        Ok(())
    }
}

/// Elapsed seconds since the checkpoint, rejecting a clock that runs backwards.
pub(crate) fn ensure_forward(state: &AccumulationState, now: i64) -> Result<i64, LedgerError> {
    if now < state.last_timestamp {
        return Err(LedgerError::TimestampRegression {
            now,
            last: state.last_timestamp,
        });
    }
    Ok(state.elapsed_until(now))
}
