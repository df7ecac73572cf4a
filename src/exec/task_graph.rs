// src/exec/task_graph.rs

//! The scheduler/executor.
//!
//! [`TaskGraph::process`] expands a batch of root work items into an
//! execution plan and runs it to completion:
//!
//! - an item starts only after every dependency is terminal, and only if
//!   all of them completed; a failed dependency aborts the item (and,
//!   transitively, its dependents) without executing it
//! - concurrency is bounded by a semaphore; eligible items beyond the
//!   limit stay pending until a slot frees
//! - at most one execution per key is in flight at any time; concurrent
//!   requests attach to the in-flight execution, and completed results are
//!   cached for the lifetime of the `TaskGraph` (one run), so later
//!   requests for the same key return without re-execution
//! - cancellation aborts everything still pending and signals in-flight
//!   bodies cooperatively
//!
//! A batch always completes with a full outcome map; a failing root never
//! fails `process` itself.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use tokio::sync::{mpsc, watch, Semaphore};
use tracing::{debug, info, warn};

use crate::errors::{AbortReason, ExecutionError, PlanError};
use crate::events::{BatchEvent, BatchPhase, BusEvent, EventBus, EventDetail, NodeEvent};
use crate::exec::node::{GraphNode, NodeContext, NodeSource};
use crate::exec::outcome::{BatchResults, NodeOutcome, NodeResult, NodeStatus};
use crate::exec::plan::ExecutionPlan;
use crate::exec::state::PlanState;
use crate::types::{BatchId, NodeKey};

/// Default bound on simultaneously processing work items.
pub const DEFAULT_CONCURRENCY: usize = 4;

type ResultCache = Arc<Mutex<HashMap<NodeKey, NodeResult>>>;
type InFlightMap = Arc<Mutex<HashMap<NodeKey, watch::Receiver<Option<NodeOutcome>>>>>;

/// Messages from workers back into the batch loop.
enum ExecMsg {
    Started(NodeKey),
    Finished(NodeKey, NodeOutcome),
}

/// Handle for cancelling a run from outside the batch loop.
#[derive(Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// One run of the scheduler. Holds the run-scoped result cache; dropping
/// the instance drops the cache.
pub struct TaskGraph {
    bus: EventBus,
    semaphore: Arc<Semaphore>,
    cache: ResultCache,
    in_flight: InFlightMap,
    cancel: Arc<watch::Sender<bool>>,
}

impl TaskGraph {
    pub fn new(concurrency: usize, bus: EventBus) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            bus,
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
            cache: Arc::new(Mutex::new(HashMap::new())),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            cancel: Arc::new(cancel),
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: Arc::clone(&self.cancel),
        }
    }

    /// Cancel the run: every non-terminal item becomes `Aborted` and
    /// in-flight bodies are signalled to stop cooperatively.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Run a batch of root work items to completion.
    ///
    /// Returns only once every expanded item is terminal. Plan-construction
    /// errors surface before any execution; execution failures are reported
    /// in the outcome map, never as an `Err` of `process` itself.
    pub async fn process(
        &self,
        batch_id: impl Into<BatchId>,
        roots: Vec<Arc<dyn GraphNode>>,
        source: &dyn NodeSource,
    ) -> Result<BatchResults, PlanError> {
        let batch_id: BatchId = batch_id.into();
        let plan = ExecutionPlan::expand(roots, source)?;

        info!(
            batch = %batch_id,
            items = plan.len(),
            roots = plan.roots().len(),
            "batch expanded"
        );
        self.bus.publish(BusEvent::Batch(BatchEvent {
            batch_id: batch_id.clone(),
            phase: BatchPhase::Started,
            roots: plan.roots().to_vec(),
            timestamp: SystemTime::now(),
        }));

        let mut state = PlanState::new(&plan);
        for key in plan.keys() {
            self.emit(&batch_id, &plan, key, NodeStatus::Pending, EventDetail::None);
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<ExecMsg>();
        let mut cancel_rx = self.cancel.subscribe();
        let mut cancelled = *cancel_rx.borrow();

        loop {
            // Settle synchronous transitions (aborts, cancellation, cache
            // hits) until a pass makes no progress.
            loop {
                let mut progressed = false;

                for (key, reason) in state.collect_newly_aborted() {
                    self.emit(
                        &batch_id,
                        &plan,
                        &key,
                        NodeStatus::Aborted,
                        EventDetail::Aborted { reason },
                    );
                    progressed = true;
                }

                if cancelled {
                    for key in state.abort_all_pending(AbortReason::Cancelled) {
                        self.emit(
                            &batch_id,
                            &plan,
                            &key,
                            NodeStatus::Aborted,
                            EventDetail::Aborted {
                                reason: AbortReason::Cancelled,
                            },
                        );
                        progressed = true;
                    }
                }

                for key in state.collect_ready() {
                    progressed |= self.dispatch(&key, &plan, &mut state, &batch_id, &tx);
                }

                if !progressed {
                    break;
                }
            }

            if state.all_terminal() {
                break;
            }

            tokio::select! {
                msg = rx.recv() => match msg {
                    Some(ExecMsg::Started(key)) => {
                        state.mark_processing(&key);
                        self.emit(&batch_id, &plan, &key, NodeStatus::Processing, EventDetail::None);
                    }
                    Some(ExecMsg::Finished(key, outcome)) => {
                        let status = outcome.status();
                        let detail = detail_of(&outcome);
                        state.mark_done(&key, outcome);
                        self.emit(&batch_id, &plan, &key, status, detail);
                    }
                    None => {
                        warn!(batch = %batch_id, "worker channel closed before batch finished");
                        break;
                    }
                },
                _ = cancel_rx.changed(), if !cancelled => {
                    if *cancel_rx.borrow() {
                        info!(batch = %batch_id, "cancellation requested");
                        cancelled = true;
                    }
                }
            }
        }

        self.bus.publish(BusEvent::Batch(BatchEvent {
            batch_id: batch_id.clone(),
            phase: BatchPhase::Finished,
            roots: plan.roots().to_vec(),
            timestamp: SystemTime::now(),
        }));

        let roots = plan.roots().to_vec();
        Ok(BatchResults::new(batch_id, roots, state.into_outcomes()))
    }

    /// Hand one eligible item to a worker.
    ///
    /// Returns `true` when the item was resolved synchronously (cache hit)
    /// so the caller re-runs its settle pass.
    fn dispatch(
        &self,
        key: &NodeKey,
        plan: &ExecutionPlan,
        state: &mut PlanState<'_>,
        batch_id: &BatchId,
        tx: &mpsc::UnboundedSender<ExecMsg>,
    ) -> bool {
        let Some(pn) = plan.get(key) else {
            warn!(key = %key, "dispatch for unknown plan node");
            return false;
        };

        // Run-scoped cache: completed results are never recomputed.
        let hit = lock(&self.cache).get(key).cloned();
        if let Some(result) = hit {
            debug!(key = %key, "serving result from run cache");
            let result = NodeResult {
                cached: true,
                ..result
            };
            let detail = EventDetail::Completed {
                cached: true,
                summary: result.output.summary.clone(),
            };
            state.mark_done(key, NodeOutcome::Complete(result));
            self.emit(batch_id, plan, key, NodeStatus::Complete, detail);
            return true;
        }

        // Another batch may already be executing this key: attach to it
        // instead of starting a second execution.
        let existing = lock(&self.in_flight).get(key).cloned();
        if let Some(mut done_rx) = existing {
            debug!(key = %key, "attaching to in-flight execution");
            let tx = tx.clone();
            let key = key.clone();
            tokio::spawn(async move {
                loop {
                    let settled = done_rx.borrow().clone();
                    if let Some(outcome) = settled {
                        let _ = tx.send(ExecMsg::Finished(key, outcome));
                        return;
                    }
                    if done_rx.changed().await.is_err() {
                        let _ = tx.send(ExecMsg::Finished(
                            key,
                            NodeOutcome::Aborted(AbortReason::Cancelled),
                        ));
                        return;
                    }
                }
            });
            return false;
        }

        let (done_tx, done_rx) = watch::channel::<Option<NodeOutcome>>(None);
        lock(&self.in_flight).insert(key.clone(), done_rx);

        let node = Arc::clone(&pn.node);
        let entity = node.entity();
        let action = node.action();
        let ctx = NodeContext {
            batch_id: batch_id.clone(),
            cancel: self.cancel.subscribe(),
        };
        let semaphore = Arc::clone(&self.semaphore);
        let cache = Arc::clone(&self.cache);
        let in_flight = Arc::clone(&self.in_flight);
        let tx = tx.clone();
        let key = key.clone();

        tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    let outcome = NodeOutcome::Aborted(AbortReason::Cancelled);
                    done_tx.send_replace(Some(outcome.clone()));
                    lock(&in_flight).remove(&key);
                    let _ = tx.send(ExecMsg::Finished(key, outcome));
                    return;
                }
            };

            // Slot acquired after the run was cancelled: don't start.
            if *ctx.cancel.borrow() {
                let outcome = NodeOutcome::Aborted(AbortReason::Cancelled);
                done_tx.send_replace(Some(outcome.clone()));
                lock(&in_flight).remove(&key);
                let _ = tx.send(ExecMsg::Finished(key, outcome));
                return;
            }

            let _ = tx.send(ExecMsg::Started(key.clone()));

            // Run the body on its own task so a panicking implementation
            // surfaces as an `Error` outcome instead of stalling the batch.
            let cancelled_ref = ctx.cancel.clone();
            let body = {
                let node = Arc::clone(&node);
                tokio::spawn(async move { node.execute(ctx).await })
            };
            let outcome = match body.await {
                Ok(Ok(output)) => {
                    let result = NodeResult {
                        key: key.clone(),
                        entity,
                        action,
                        output,
                        cached: false,
                    };
                    lock(&cache).insert(key.clone(), result.clone());
                    NodeOutcome::Complete(result)
                }
                // A body that failed because the run was cancelled reports
                // as aborted, not as its own error.
                Ok(Err(_)) if *cancelled_ref.borrow() => {
                    NodeOutcome::Aborted(AbortReason::Cancelled)
                }
                Ok(Err(err)) => NodeOutcome::Error(err),
                Err(join_err) => {
                    NodeOutcome::Error(ExecutionError::new(format!(
                        "work item body did not finish: {join_err}"
                    )))
                }
            };

            done_tx.send_replace(Some(outcome.clone()));
            lock(&in_flight).remove(&key);
            let _ = tx.send(ExecMsg::Finished(key, outcome));
        });

        false
    }

    fn emit(
        &self,
        batch_id: &BatchId,
        plan: &ExecutionPlan,
        key: &NodeKey,
        status: NodeStatus,
        detail: EventDetail,
    ) {
        let Some(pn) = plan.get(key) else { return };
        self.bus.publish(BusEvent::Node(NodeEvent {
            batch_id: batch_id.clone(),
            key: key.clone(),
            entity: pn.node.entity(),
            action: pn.node.action(),
            status,
            timestamp: SystemTime::now(),
            detail,
        }));
    }
}

impl std::fmt::Debug for TaskGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGraph")
            .field("available_permits", &self.semaphore.available_permits())
            .finish_non_exhaustive()
    }
}

fn detail_of(outcome: &NodeOutcome) -> EventDetail {
    match outcome {
        NodeOutcome::Complete(result) => EventDetail::Completed {
            cached: result.cached,
            summary: result.output.summary.clone(),
        },
        NodeOutcome::Error(err) => EventDetail::Failed {
            message: err.message.clone(),
        },
        NodeOutcome::Aborted(reason) => EventDetail::Aborted {
            reason: reason.clone(),
        },
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
