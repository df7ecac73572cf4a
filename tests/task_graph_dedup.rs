// tests/task_graph_dedup.rs

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use devdag::events::EventBus;
use devdag::exec::{GraphNode, NodeOutcome, TaskGraph};
use devdag_test_utils::fake::{MapSource, TestNode};
use devdag_test_utils::init_tracing;

#[tokio::test]
async fn shared_dependency_executes_once() {
    init_tracing();

    let shared = TestNode::ok("shared");
    let runs = shared.run_counter();

    let source = MapSource::new(vec![
        Arc::new(shared) as Arc<dyn GraphNode>,
        Arc::new(TestNode::ok("left").with_deps(&["shared"])),
        Arc::new(TestNode::ok("right").with_deps(&["shared"])),
    ]);

    let task_graph = TaskGraph::new(4, EventBus::new());
    let results = task_graph
        .process("fanin", vec![source.get("left"), source.get("right")], &source)
        .await
        .unwrap();

    assert!(results.all().values().all(NodeOutcome::is_complete));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn second_batch_is_served_from_the_run_cache() {
    init_tracing();

    let node = TestNode::ok("once");
    let runs = node.run_counter();
    let source = MapSource::new(vec![Arc::new(node) as Arc<dyn GraphNode>]);

    let task_graph = TaskGraph::new(4, EventBus::new());

    let first = task_graph
        .process("batch-1", vec![source.get("once")], &source)
        .await
        .unwrap();
    let second = task_graph
        .process("batch-2", vec![source.get("once")], &source)
        .await
        .unwrap();

    assert_eq!(runs.load(Ordering::SeqCst), 1);

    match (first.outcome("once"), second.outcome("once")) {
        (Some(NodeOutcome::Complete(a)), Some(NodeOutcome::Complete(b))) => {
            assert!(!a.cached);
            assert!(b.cached);
            assert_eq!(a.output, b.output);
        }
        other => panic!("expected two completions, got {other:?}"),
    }
}

#[tokio::test]
async fn fresh_run_starts_with_an_empty_cache() {
    init_tracing();

    let node = TestNode::ok("again");
    let runs = node.run_counter();
    let source = MapSource::new(vec![Arc::new(node) as Arc<dyn GraphNode>]);

    let first = TaskGraph::new(4, EventBus::new());
    first
        .process("run-1", vec![source.get("again")], &source)
        .await
        .unwrap();

    let second = TaskGraph::new(4, EventBus::new());
    second
        .process("run-2", vec![source.get("again")], &source)
        .await
        .unwrap();

    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn concurrent_batches_attach_to_one_in_flight_execution() {
    init_tracing();

    let node = TestNode::ok("slowish").with_delay(Duration::from_millis(100));
    let runs = node.run_counter();
    let source = MapSource::new(vec![Arc::new(node) as Arc<dyn GraphNode>]);

    let task_graph = TaskGraph::new(4, EventBus::new());

    let (first, second) = tokio::join!(
        task_graph.process("concurrent-1", vec![source.get("slowish")], &source),
        task_graph.process("concurrent-2", vec![source.get("slowish")], &source),
    );
    let first = first.unwrap();
    let second = second.unwrap();

    // Exactly one execution; both requesters observe a completion with
    // the same payload.
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    match (first.outcome("slowish"), second.outcome("slowish")) {
        (Some(NodeOutcome::Complete(a)), Some(NodeOutcome::Complete(b))) => {
            assert_eq!(a.output, b.output);
        }
        other => panic!("expected two completions, got {other:?}"),
    }
}
