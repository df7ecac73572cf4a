// tests/task_graph_limits.rs

use std::sync::Arc;
use std::time::Duration;

use devdag::errors::AbortReason;
use devdag::events::EventBus;
use devdag::exec::{GraphNode, NodeOutcome, TaskGraph};
use devdag_test_utils::fake::{ConcurrencyGauge, MapSource, TestNode};
use devdag_test_utils::init_tracing;

#[tokio::test]
async fn concurrency_limit_bounds_simultaneous_processing() {
    init_tracing();

    let gauge = ConcurrencyGauge::new();
    let nodes: Vec<Arc<dyn GraphNode>> = (0..6)
        .map(|i| {
            Arc::new(
                TestNode::ok(&format!("n{i}"))
                    .with_delay(Duration::from_millis(50))
                    .with_gauge(gauge.clone()),
            ) as Arc<dyn GraphNode>
        })
        .collect();
    let roots: Vec<Arc<dyn GraphNode>> = nodes.clone();
    let source = MapSource::new(nodes);

    let task_graph = TaskGraph::new(2, EventBus::new());
    let results = task_graph.process("limited", roots, &source).await.unwrap();

    assert!(results.all().values().all(NodeOutcome::is_complete));
    assert!(
        gauge.max_seen() <= 2,
        "observed {} simultaneous executions with a limit of 2",
        gauge.max_seen()
    );
}

#[tokio::test]
async fn cancellation_aborts_pending_work() {
    init_tracing();

    // `slow` is already in flight when the run is cancelled; `after`
    // never becomes eligible.
    let after = TestNode::ok("after").with_deps(&["slow"]);
    let after_runs = after.run_counter();

    let source = MapSource::new(vec![
        Arc::new(TestNode::ok("slow").with_delay(Duration::from_millis(200)))
            as Arc<dyn GraphNode>,
        Arc::new(after),
    ]);

    let task_graph = TaskGraph::new(4, EventBus::new());
    let cancel = task_graph.cancel_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    let results = task_graph
        .process("cancelled", vec![source.get("after")], &source)
        .await
        .unwrap();

    // The in-flight body is not killed by the engine; it finished on its
    // own and keeps its result.
    assert!(matches!(
        results.outcome("slow"),
        Some(NodeOutcome::Complete(_))
    ));
    match results.outcome("after") {
        Some(NodeOutcome::Aborted(AbortReason::Cancelled)) => {}
        other => panic!("expected after aborted by cancellation, got {other:?}"),
    }
    assert_eq!(after_runs.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cancelling_before_processing_aborts_everything() {
    init_tracing();

    let node = TestNode::ok("never");
    let runs = node.run_counter();
    let source = MapSource::new(vec![Arc::new(node) as Arc<dyn GraphNode>]);

    let task_graph = TaskGraph::new(4, EventBus::new());
    task_graph.cancel();

    let results = task_graph
        .process("pre-cancelled", vec![source.get("never")], &source)
        .await
        .unwrap();

    assert!(matches!(
        results.outcome("never"),
        Some(NodeOutcome::Aborted(AbortReason::Cancelled))
    ));
    assert_eq!(runs.load(std::sync::atomic::Ordering::SeqCst), 0);
}
