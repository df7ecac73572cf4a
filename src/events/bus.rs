// src/events/bus.rs

//! Process-wide, run-scoped event publisher.
//!
//! Publishing is fire-and-forget: events are pushed onto an unbounded
//! channel and fanned out to subscribers from a background dispatch task,
//! so a slow observer never blocks the scheduler. Delivery order matches
//! publish order.
//!
//! Handlers must not panic; a panicking handler takes down the dispatch
//! task, which is a bug in the handler, not in the scheduler.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::BusEvent;

/// Identifier returned by [`EventBus::subscribe`], used to unsubscribe.
pub type SubscriptionId = u64;

type Handler = Box<dyn Fn(&BusEvent) + Send + Sync>;

enum BusMsg {
    Event(BusEvent),
    /// Ack once every previously published event has been dispatched.
    Flush(oneshot::Sender<()>),
}

struct BusInner {
    subscribers: Mutex<HashMap<SubscriptionId, Handler>>,
    next_id: AtomicU64,
    tx: mpsc::UnboundedSender<BusMsg>,
}

/// Cloneable handle to one event bus instance.
///
/// Constructed once at process start and passed by reference to the
/// components that emit or observe events; there is no global accessor.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Create a bus and spawn its dispatch task. Requires a Tokio runtime.
    pub fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<BusMsg>();
        let inner = Arc::new(BusInner {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            tx,
        });

        // The dispatch task holds only a weak reference so the bus (and
        // the task) shut down when the last handle is dropped.
        let weak: Weak<BusInner> = Arc::downgrade(&inner);
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let Some(inner) = weak.upgrade() else { break };
                match msg {
                    BusMsg::Event(event) => {
                        let subscribers = inner
                            .subscribers
                            .lock()
                            .unwrap_or_else(|poisoned| poisoned.into_inner());
                        for handler in subscribers.values() {
                            handler(&event);
                        }
                    }
                    BusMsg::Flush(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
            debug!("event bus dispatch task finished");
        });

        Self { inner }
    }

    /// Register a handler for every subsequent event.
    pub fn subscribe(
        &self,
        handler: impl Fn(&BusEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(id, Box::new(handler));
        id
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    /// Other subscribers are unaffected.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&id)
            .is_some()
    }

    /// Publish an event. Never blocks and never fails; if the dispatch
    /// task is gone the event is dropped.
    pub fn publish(&self, event: BusEvent) {
        let _ = self.inner.tx.send(BusMsg::Event(event));
    }

    /// Wait until every event published before this call has been
    /// delivered to all current subscribers.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.inner.tx.send(BusMsg::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").finish_non_exhaustive()
    }
}
