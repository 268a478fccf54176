//! Cost tracking and limit enforcement for sessions.
//!
//! Every session owns one [`CostTracker`]. The engine records provider usage
//! after each turn, credits completed sub-agent sessions through
//! [`CostTracker::add_child`], and calls [`CostTracker::enforce`] after every
//! provider turn and after every child-cost credit. Warning thresholds fire
//! once each as they are crossed; reaching the limit raises
//! [`Error::CostLimitExceeded`], which the engine treats as a session
//! failure.
//!
//! Pricing is captured from the provider's [`ModelInfo`] at construction and
//! is per 1,000 tokens. The tracker is mutated only from the owning
//! session's flow, but uses interior locking so the host can read totals at
//! any time.

use crate::error::{Error, Result};
use crate::provider::ModelInfo;
use crate::types::Usage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Fractions of the cost limit at which warnings fire, once each.
pub const DEFAULT_WARNING_THRESHOLDS: [f64; 3] = [0.5, 0.75, 0.9];

/// Per-model cost line in a [`CostReport`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelCost {
    /// Model name.
    pub model: String,

    /// Input tokens recorded against this model.
    pub input_tokens: u64,

    /// Output tokens recorded against this model.
    pub output_tokens: u64,

    /// Input cost at the captured per-1k rate.
    pub input_cost: f64,

    /// Output cost at the captured per-1k rate.
    pub output_cost: f64,
}

/// Cost summary of one completed sub-agent session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChildSessionCost {
    /// The child session's id.
    pub session_id: String,

    /// Agent the child ran.
    pub agent: String,

    /// Command the child executed.
    pub command: String,

    /// The child's full cost, sub-agents included.
    pub total_cost: f64,

    /// Input tokens consumed by the child.
    pub input_tokens: u64,

    /// Output tokens generated by the child.
    pub output_tokens: u64,

    /// Provider calls made by the child.
    pub api_calls: u64,
}

/// Full cost accounting for a session.
///
/// `total_cost` equals the sum of the breakdown lines plus the sum of child
/// session totals; token and call aggregates include child contributions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CostReport {
    /// Total cost including child sessions.
    pub total_cost: f64,

    /// Currency of all cost figures.
    pub currency: String,

    /// Input tokens including child sessions.
    pub input_tokens: u64,

    /// Output tokens including child sessions.
    pub output_tokens: u64,

    /// Provider calls including child sessions.
    pub api_calls: u64,

    /// Per-model cost lines for this session's own calls.
    pub breakdown: Vec<ModelCost>,

    /// Credited sub-agent sessions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub child_sessions: Vec<ChildSessionCost>,
}

#[derive(Debug, Default)]
struct TrackerState {
    /// model -> (input tokens, output tokens)
    per_model: BTreeMap<String, (u64, u64)>,
    api_calls: u64,
    children: Vec<ChildSessionCost>,
    fired_warnings: Vec<f64>,
}

/// Accumulates usage and enforces the session cost limit.
#[derive(Debug)]
pub struct CostTracker {
    input_cost_per_1k: f64,
    output_cost_per_1k: f64,
    state: Mutex<TrackerState>,
}

impl CostTracker {
    /// Creates a tracker priced from the provider's model info.
    pub fn new(info: &ModelInfo) -> Self {
        Self {
            input_cost_per_1k: info.input_cost_per_1k,
            output_cost_per_1k: info.output_cost_per_1k,
            state: Mutex::new(TrackerState::default()),
        }
    }

    /// Reconstructs a tracker from serialized session totals.
    ///
    /// The per-model breakdown is not part of the wire form; restored tokens
    /// are credited to `model` and costs are recomputed from the captured
    /// rates.
    pub fn restore(
        info: &ModelInfo,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
        api_calls: u64,
        children: Vec<ChildSessionCost>,
    ) -> Self {
        let tracker = Self::new(info);
        {
            let mut state = tracker.state.lock().expect("cost tracker lock poisoned");
            if input_tokens > 0 || output_tokens > 0 {
                state
                    .per_model
                    .insert(model.to_string(), (input_tokens, output_tokens));
            }
            state.api_calls = api_calls;
            state.children = children;
        }
        tracker
    }

    /// Accumulates usage from one provider call.
    pub fn record_usage(&self, usage: &Usage, model: &str) {
        let mut state = self.state.lock().expect("cost tracker lock poisoned");
        let entry = state.per_model.entry(model.to_string()).or_insert((0, 0));
        entry.0 += usage.input_tokens;
        entry.1 += usage.output_tokens;
        state.api_calls += 1;
    }

    /// Appends a completed child session's costs and credits its tokens and
    /// call count into the aggregates.
    pub fn add_child(&self, child: ChildSessionCost) {
        let mut state = self.state.lock().expect("cost tracker lock poisoned");
        state.children.push(child);
    }

    fn cost_of(&self, input_tokens: u64, output_tokens: u64) -> (f64, f64) {
        (
            input_tokens as f64 / 1000.0 * self.input_cost_per_1k,
            output_tokens as f64 / 1000.0 * self.output_cost_per_1k,
        )
    }

    fn total_locked(&self, state: &TrackerState) -> f64 {
        let own: f64 = state
            .per_model
            .values()
            .map(|&(input, output)| {
                let (input_cost, output_cost) = self.cost_of(input, output);
                input_cost + output_cost
            })
            .sum();
        let children: f64 = state.children.iter().map(|c| c.total_cost).sum();
        own + children
    }

    /// Total cost: own per-model costs plus child session totals.
    pub fn total_cost(&self) -> f64 {
        let state = self.state.lock().expect("cost tracker lock poisoned");
        self.total_locked(&state)
    }

    /// This session's own `(input, output, api_calls)` totals, children
    /// excluded. Used for state serialization.
    pub fn own_totals(&self) -> (u64, u64, u64) {
        let state = self.state.lock().expect("cost tracker lock poisoned");
        let (input, output) = state
            .per_model
            .values()
            .fold((0, 0), |(i, o), &(mi, mo)| (i + mi, o + mo));
        (input, output, state.api_calls)
    }

    /// Snapshot of the credited child sessions.
    pub fn children(&self) -> Vec<ChildSessionCost> {
        self.state
            .lock()
            .expect("cost tracker lock poisoned")
            .children
            .clone()
    }

    /// Budget left under `limit`, or `None` when unlimited.
    pub fn remaining(&self, limit: Option<f64>) -> Option<f64> {
        limit.map(|l| (l - self.total_cost()).max(0.0))
    }

    /// Checks the total against the limit.
    ///
    /// Returns the warning threshold fractions newly crossed by this check
    /// (each fires at most once per tracker). Raises
    /// [`Error::CostLimitExceeded`] when the total has reached the limit.
    pub fn enforce(&self, limit: Option<f64>) -> Result<Vec<f64>> {
        let Some(limit) = limit else {
            return Ok(Vec::new());
        };

        let mut state = self.state.lock().expect("cost tracker lock poisoned");
        let total = self.total_locked(&state);

        if total >= limit {
            return Err(Error::CostLimitExceeded { total, limit });
        }

        let mut crossed = Vec::new();
        for threshold in DEFAULT_WARNING_THRESHOLDS {
            if total >= threshold * limit && !state.fired_warnings.contains(&threshold) {
                state.fired_warnings.push(threshold);
                crossed.push(threshold);
            }
        }
        Ok(crossed)
    }

    /// Builds the full cost report.
    pub fn report(&self) -> CostReport {
        let state = self.state.lock().expect("cost tracker lock poisoned");

        let breakdown: Vec<ModelCost> = state
            .per_model
            .iter()
            .map(|(model, &(input, output))| {
                let (input_cost, output_cost) = self.cost_of(input, output);
                ModelCost {
                    model: model.clone(),
                    input_tokens: input,
                    output_tokens: output,
                    input_cost,
                    output_cost,
                }
            })
            .collect();

        let (mut input_tokens, mut output_tokens) = breakdown
            .iter()
            .fold((0, 0), |(i, o), line| (i + line.input_tokens, o + line.output_tokens));
        let mut api_calls = state.api_calls;
        for child in &state.children {
            input_tokens += child.input_tokens;
            output_tokens += child.output_tokens;
            api_calls += child.api_calls;
        }

        CostReport {
            total_cost: self.total_locked(&state),
            currency: "USD".to_string(),
            input_tokens,
            output_tokens,
            api_calls,
            breakdown,
            child_sessions: state.children.clone(),
        }
    }
}
