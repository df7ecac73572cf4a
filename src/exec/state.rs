// src/exec/state.rs

//! Per-run state management for plan nodes.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::errors::AbortReason;
use crate::exec::outcome::NodeOutcome;
use crate::exec::plan::ExecutionPlan;
use crate::types::NodeKey;

/// Internal per-run state of one plan node.
///
/// `Dispatched` means the node has been handed to a worker but its body
/// has not started; observers still see `Pending` (items beyond the
/// concurrency limit queue in this state).
#[derive(Debug, Clone)]
pub(crate) enum RunState {
    Pending,
    Dispatched,
    Processing,
    Done(NodeOutcome),
}

impl RunState {
    fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done(_))
    }
}

/// Tracks status per key for one batch and implements the transition
/// rules: ready collection, transitive abort of dependents, terminal
/// detection.
pub(crate) struct PlanState<'a> {
    plan: &'a ExecutionPlan,
    states: HashMap<NodeKey, RunState>,
}

impl<'a> PlanState<'a> {
    pub fn new(plan: &'a ExecutionPlan) -> Self {
        let states = plan
            .keys()
            .map(|k| (k.clone(), RunState::Pending))
            .collect();
        Self { plan, states }
    }

    pub fn mark_processing(&mut self, key: &str) {
        if let Some(state) = self.states.get_mut(key) {
            if state.is_terminal() {
                warn!(key = %key, "ignoring start of already-terminal item");
                return;
            }
            *state = RunState::Processing;
        }
    }

    /// Record a terminal outcome. Terminal states never transition again;
    /// a late second outcome for the same key is dropped.
    pub fn mark_done(&mut self, key: &str, outcome: NodeOutcome) {
        match self.states.get_mut(key) {
            Some(state) if state.is_terminal() => {
                debug!(key = %key, "duplicate terminal outcome ignored");
            }
            Some(state) => *state = RunState::Done(outcome),
            None => warn!(key = %key, "outcome for unknown plan node ignored"),
        }
    }

    /// Pending nodes whose dependencies all completed become eligible.
    /// Marks them `Dispatched` and returns their keys in plan order.
    pub fn collect_ready(&mut self) -> Vec<NodeKey> {
        let ready: Vec<NodeKey> = self
            .plan
            .keys()
            .filter(|key| {
                matches!(self.states.get(key.as_str()), Some(RunState::Pending))
                    && self.deps_complete(key)
            })
            .cloned()
            .collect();

        for key in &ready {
            self.states.insert(key.clone(), RunState::Dispatched);
        }
        ready
    }

    /// Pending nodes with a failed or aborted dependency transition
    /// directly to `Aborted`, transitively upward through dependents.
    /// Returns the newly aborted keys with their reasons.
    pub fn collect_newly_aborted(&mut self) -> Vec<(NodeKey, AbortReason)> {
        let mut aborted = Vec::new();

        // Fixpoint: aborting a node can make its dependents abortable.
        loop {
            let next: Vec<(NodeKey, AbortReason)> = self
                .plan
                .keys()
                .filter(|key| matches!(self.states.get(key.as_str()), Some(RunState::Pending)))
                .filter_map(|key| {
                    self.failed_dep(key)
                        .map(|dep| (key.clone(), AbortReason::DependencyFailed { dep }))
                })
                .collect();

            if next.is_empty() {
                break;
            }
            for (key, reason) in next {
                debug!(key = %key, reason = %reason, "aborting dependent");
                self.states
                    .insert(key.clone(), RunState::Done(NodeOutcome::Aborted(reason.clone())));
                aborted.push((key, reason));
            }
        }

        aborted
    }

    /// Abort every still-pending node (run cancellation). Dispatched and
    /// processing nodes are left to report through their workers.
    pub fn abort_all_pending(&mut self, reason: AbortReason) -> Vec<NodeKey> {
        let pending: Vec<NodeKey> = self
            .plan
            .keys()
            .filter(|key| matches!(self.states.get(key.as_str()), Some(RunState::Pending)))
            .cloned()
            .collect();

        for key in &pending {
            self.states.insert(
                key.clone(),
                RunState::Done(NodeOutcome::Aborted(reason.clone())),
            );
        }
        pending
    }

    pub fn all_terminal(&self) -> bool {
        self.states.values().all(RunState::is_terminal)
    }

    /// Consume into the final outcome map. Only valid once
    /// [`Self::all_terminal`] holds; stragglers are reported as aborted.
    pub fn into_outcomes(self) -> HashMap<NodeKey, NodeOutcome> {
        self.states
            .into_iter()
            .map(|(key, state)| {
                let outcome = match state {
                    RunState::Done(outcome) => outcome,
                    _ => {
                        warn!(key = %key, "non-terminal item at batch end; reporting aborted");
                        NodeOutcome::Aborted(AbortReason::Cancelled)
                    }
                };
                (key, outcome)
            })
            .collect()
    }

    fn deps_complete(&self, key: &str) -> bool {
        let Some(pn) = self.plan.get(key) else {
            return false;
        };
        pn.deps.iter().all(|dep| {
            matches!(
                self.states.get(dep.as_str()),
                Some(RunState::Done(NodeOutcome::Complete(_)))
            )
        })
    }

    /// First dependency of `key` that ended in `Error` or `Aborted`.
    fn failed_dep(&self, key: &str) -> Option<NodeKey> {
        let pn = self.plan.get(key)?;
        pn.deps
            .iter()
            .find(|dep| {
                matches!(
                    self.states.get(dep.as_str()),
                    Some(RunState::Done(NodeOutcome::Error(_)))
                        | Some(RunState::Done(NodeOutcome::Aborted(_)))
                )
            })
            .cloned()
    }
}
