// src/events/reporter.rs

//! Default status observer: logs lifecycle transitions through `tracing`.

use tracing::{debug, error, info, warn};

use super::{BatchPhase, BusEvent, EventBus, EventDetail, SubscriptionId};
use crate::exec::outcome::NodeStatus;

/// Subscribes a logging handler to the bus.
pub struct StatusReporter {
    id: SubscriptionId,
}

impl StatusReporter {
    pub fn attach(bus: &EventBus) -> Self {
        let id = bus.subscribe(report);
        Self { id }
    }

    pub fn detach(self, bus: &EventBus) {
        bus.unsubscribe(self.id);
    }
}

fn report(event: &BusEvent) {
    match event {
        BusEvent::Batch(batch) => match batch.phase {
            BatchPhase::Started => info!(
                batch = %batch.batch_id,
                roots = ?batch.roots,
                "batch started"
            ),
            BatchPhase::Finished => info!(batch = %batch.batch_id, "batch finished"),
        },
        BusEvent::Node(node) => match node.status {
            NodeStatus::Pending => debug!(
                batch = %node.batch_id,
                key = %node.key,
                "queued"
            ),
            NodeStatus::Processing => info!(
                batch = %node.batch_id,
                key = %node.key,
                action = %node.action,
                entity = %node.entity,
                "processing"
            ),
            NodeStatus::Complete => {
                let cached = matches!(
                    node.detail,
                    EventDetail::Completed { cached: true, .. }
                );
                info!(
                    batch = %node.batch_id,
                    key = %node.key,
                    cached,
                    "complete"
                );
            }
            NodeStatus::Error => {
                let message = match &node.detail {
                    EventDetail::Failed { message } => message.as_str(),
                    _ => "unknown failure",
                };
                error!(
                    batch = %node.batch_id,
                    key = %node.key,
                    error = %message,
                    "failed"
                );
            }
            NodeStatus::Aborted => {
                let reason = match &node.detail {
                    EventDetail::Aborted { reason } => reason.to_string(),
                    _ => "unknown".to_string(),
                };
                warn!(
                    batch = %node.batch_id,
                    key = %node.key,
                    reason = %reason,
                    "aborted"
                );
            }
        },
    }
}
