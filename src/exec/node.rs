// src/exec/node.rs

//! The work-item contract consumed by the scheduler.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::watch;

use crate::errors::ExecutionError;
use crate::graph::entity::EntityRef;
use crate::types::{ActionKind, BatchId, NodeKey};

/// Context handed to a node body when it runs.
#[derive(Debug, Clone)]
pub struct NodeContext {
    pub batch_id: BatchId,
    /// Cooperative cancellation signal; flips to `true` when the run is
    /// cancelled. Bodies driving external work should observe it.
    pub cancel: watch::Receiver<bool>,
}

impl NodeContext {
    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }
}

/// Result payload of a completed node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeOutput {
    /// Human-readable summary, e.g. the tail of a command's output.
    pub summary: String,
}

impl NodeOutput {
    pub fn message(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
        }
    }
}

pub type NodeFuture<'a> =
    Pin<Box<dyn Future<Output = Result<NodeOutput, ExecutionError>> + Send + 'a>>;

/// A keyed, schedulable unit of work expanded from the configuration
/// graph.
///
/// Implementations produce a deterministic key (operation + target +
/// version), the keys of the work they depend on, and an execution body.
/// Two nodes with the same key submitted in the same run are coalesced:
/// the body runs at most once and every requester observes its outcome.
pub trait GraphNode: Send + Sync {
    fn key(&self) -> NodeKey;

    /// The graph entity this work targets.
    fn entity(&self) -> EntityRef;

    fn action(&self) -> ActionKind;

    /// Keys of work items that must complete before this one may start.
    fn dependency_keys(&self) -> Vec<NodeKey>;

    /// Execute the operation. The scheduler does not retry; retry policy,
    /// if any, belongs to the implementation.
    fn execute(&self, ctx: NodeContext) -> NodeFuture<'_>;
}

/// Factory interface the scheduler uses to materialize dependency keys
/// during plan expansion.
pub trait NodeSource {
    fn resolve(&self, key: &str) -> Option<Arc<dyn GraphNode>>;
}
