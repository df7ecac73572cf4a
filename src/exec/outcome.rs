// src/exec/outcome.rs

//! Public status and outcome types for scheduled work items.

use std::collections::HashMap;
use std::fmt;

use crate::errors::{AbortReason, ExecutionError};
use crate::exec::node::NodeOutput;
use crate::graph::entity::EntityRef;
use crate::types::{ActionKind, BatchId, NodeKey};

/// Status of a work item within a run.
///
/// `Complete`, `Error` and `Aborted` are terminal; no transitions leave
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeStatus {
    Pending,
    Processing,
    Complete,
    Error,
    Aborted,
}

impl NodeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            NodeStatus::Complete | NodeStatus::Error | NodeStatus::Aborted
        )
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeStatus::Pending => "pending",
            NodeStatus::Processing => "processing",
            NodeStatus::Complete => "complete",
            NodeStatus::Error => "error",
            NodeStatus::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Payload carried by a `Complete` work item.
#[derive(Debug, Clone)]
pub struct NodeResult {
    pub key: NodeKey,
    pub entity: EntityRef,
    pub action: ActionKind,
    pub output: NodeOutput,
    /// True when served from the run cache instead of a fresh execution.
    pub cached: bool,
}

/// Terminal outcome of one work item.
#[derive(Debug, Clone)]
pub enum NodeOutcome {
    Complete(NodeResult),
    Error(ExecutionError),
    Aborted(AbortReason),
}

impl NodeOutcome {
    pub fn status(&self) -> NodeStatus {
        match self {
            NodeOutcome::Complete(_) => NodeStatus::Complete,
            NodeOutcome::Error(_) => NodeStatus::Error,
            NodeOutcome::Aborted(_) => NodeStatus::Aborted,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, NodeOutcome::Complete(_))
    }

    pub fn result(&self) -> Option<&NodeResult> {
        match self {
            NodeOutcome::Complete(r) => Some(r),
            _ => None,
        }
    }
}

/// Terminal outcome map for one processed batch.
///
/// Contains every work item the batch expanded to; [`Self::roots`] narrows
/// to the requested roots. A root's failure never removes it from the
/// map — the batch always reports a full set of outcomes.
#[derive(Debug, Clone)]
pub struct BatchResults {
    pub batch_id: BatchId,
    root_keys: Vec<NodeKey>,
    outcomes: HashMap<NodeKey, NodeOutcome>,
}

impl BatchResults {
    pub(crate) fn new(
        batch_id: BatchId,
        root_keys: Vec<NodeKey>,
        outcomes: HashMap<NodeKey, NodeOutcome>,
    ) -> Self {
        Self {
            batch_id,
            root_keys,
            outcomes,
        }
    }

    pub fn outcome(&self, key: &str) -> Option<&NodeOutcome> {
        self.outcomes.get(key)
    }

    /// Outcomes of the requested roots, in request order.
    pub fn roots(&self) -> impl Iterator<Item = (&str, &NodeOutcome)> {
        self.root_keys
            .iter()
            .filter_map(|k| self.outcomes.get(k).map(|o| (k.as_str(), o)))
    }

    /// Every work item in the plan, roots included.
    pub fn all(&self) -> &HashMap<NodeKey, NodeOutcome> {
        &self.outcomes
    }

    /// True if any requested root did not complete.
    pub fn any_root_failed(&self) -> bool {
        self.roots().any(|(_, o)| !o.is_complete())
    }
}
