// src/telemetry.rs

//! Anonymized usage telemetry.
//!
//! An explicit instance constructed once at startup and handed the event
//! bus; there is no static accessor. It aggregates terminal work-item
//! outcomes per action kind and reports them through `tracing` on
//! [`Telemetry::flush`]. The project identity is reduced to a short
//! content hash before it leaves the process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::info;

use crate::events::{BusEvent, EventBus, SubscriptionId};
use crate::exec::outcome::NodeStatus;
use crate::types::ActionKind;

/// Length of the anonymized project identifier.
const PROJECT_ID_LEN: usize = 8;

type Counts = Arc<Mutex<HashMap<(ActionKind, NodeStatus), u64>>>;

pub struct Telemetry {
    subscription: SubscriptionId,
    project_id: String,
    counts: Counts,
}

impl Telemetry {
    /// Subscribe to the bus and start counting terminal outcomes.
    pub fn attach(bus: &EventBus, project_name: &str) -> Self {
        let counts: Counts = Arc::new(Mutex::new(HashMap::new()));

        let handler_counts = Arc::clone(&counts);
        let subscription = bus.subscribe(move |event| {
            if let BusEvent::Node(node) = event {
                if node.status.is_terminal() {
                    let mut counts = handler_counts
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                    *counts.entry((node.action, node.status)).or_insert(0) += 1;
                }
            }
        });

        let mut project_id = blake3::hash(project_name.as_bytes()).to_hex().to_string();
        project_id.truncate(PROJECT_ID_LEN);

        Self {
            subscription,
            project_id,
            counts,
        }
    }

    /// Report aggregated outcome counts. Call after
    /// [`EventBus::flush`](crate::events::EventBus::flush) so every
    /// published event has been counted.
    pub fn flush(&self) {
        let counts = self
            .counts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut entries: Vec<(&(ActionKind, NodeStatus), &u64)> = counts.iter().collect();
        entries.sort_by_key(|((action, status), _)| (action.as_str(), status.to_string()));

        for ((action, status), count) in entries {
            info!(
                target: "devdag::telemetry",
                project = %self.project_id,
                action = %action,
                status = %status,
                count,
                "outcome counts"
            );
        }
    }

    /// Unsubscribe from the bus; counting stops.
    pub fn shutdown(self, bus: &EventBus) {
        bus.unsubscribe(self.subscription);
    }
}
