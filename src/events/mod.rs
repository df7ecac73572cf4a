// src/events/mod.rs

//! Run-scoped lifecycle events.
//!
//! The scheduler publishes one event per work-item status transition and
//! per batch boundary through an explicit [`EventBus`] instance. The event
//! vocabulary is a closed, typed set so observers match exhaustively
//! instead of dispatching on event names.

use std::time::SystemTime;

use crate::errors::AbortReason;
use crate::exec::outcome::NodeStatus;
use crate::graph::entity::EntityRef;
use crate::types::{ActionKind, BatchId, NodeKey};

pub mod bus;
pub mod reporter;

pub use bus::{EventBus, SubscriptionId};
pub use reporter::StatusReporter;

/// Extra payload attached to a status transition.
#[derive(Debug, Clone)]
pub enum EventDetail {
    None,
    /// Terminal success. `cached` is set when the result came from the
    /// run cache instead of a fresh execution.
    Completed { cached: bool, summary: String },
    /// Terminal failure of the item's own execution.
    Failed { message: String },
    /// Terminal abort; the item never executed.
    Aborted { reason: AbortReason },
}

/// One work-item status transition.
///
/// Per item the bus emits `Pending`, then `Processing` (when the body
/// actually starts), then exactly one terminal status. Cache hits and
/// aborts go terminal without a `Processing` event.
#[derive(Debug, Clone)]
pub struct NodeEvent {
    pub batch_id: BatchId,
    pub key: NodeKey,
    pub entity: EntityRef,
    pub action: ActionKind,
    pub status: NodeStatus,
    pub timestamp: SystemTime,
    pub detail: EventDetail,
}

/// Batch lifecycle boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPhase {
    Started,
    Finished,
}

#[derive(Debug, Clone)]
pub struct BatchEvent {
    pub batch_id: BatchId,
    pub phase: BatchPhase,
    pub roots: Vec<NodeKey>,
    pub timestamp: SystemTime,
}

/// Everything the bus can carry.
#[derive(Debug, Clone)]
pub enum BusEvent {
    Node(NodeEvent),
    Batch(BatchEvent),
}
