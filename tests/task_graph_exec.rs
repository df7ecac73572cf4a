// tests/task_graph_exec.rs

use std::sync::{Arc, Mutex};

use devdag::events::EventBus;
use devdag::exec::{GraphNode, NodeOutcome, TaskGraph};
use devdag_test_utils::fake::{MapSource, TestNode};
use devdag_test_utils::init_tracing;

#[tokio::test]
async fn chain_runs_in_dependency_order() {
    init_tracing();

    let log = Arc::new(Mutex::new(Vec::new()));
    let nodes: Vec<Arc<dyn GraphNode>> = vec![
        Arc::new(TestNode::ok("a").recording(log.clone())),
        Arc::new(TestNode::ok("b").with_deps(&["a"]).recording(log.clone())),
        Arc::new(TestNode::ok("c").with_deps(&["b"]).recording(log.clone())),
    ];
    let source = MapSource::new(nodes);

    let task_graph = TaskGraph::new(4, EventBus::new());
    let results = task_graph
        .process("chain", vec![source.get("c")], &source)
        .await
        .unwrap();

    assert!(results.all().values().all(NodeOutcome::is_complete));

    let entries = log.lock().unwrap().clone();
    assert_eq!(
        entries,
        vec!["start:a", "done:a", "start:b", "done:b", "start:c", "done:c"]
    );
}

#[tokio::test]
async fn failed_dependency_aborts_dependents_only() {
    init_tracing();

    // broken <- blocked, and an unrelated chain ok <- fine.
    let broken = TestNode::failing("broken");
    let blocked = TestNode::ok("blocked").with_deps(&["broken"]);
    let blocked_runs = blocked.run_counter();
    let ok = TestNode::ok("ok");
    let fine = TestNode::ok("fine").with_deps(&["ok"]);
    let fine_runs = fine.run_counter();

    let source = MapSource::new(vec![
        Arc::new(broken),
        Arc::new(blocked),
        Arc::new(ok),
        Arc::new(fine),
    ]);

    let task_graph = TaskGraph::new(4, EventBus::new());
    let results = task_graph
        .process("mixed", vec![source.get("blocked"), source.get("fine")], &source)
        .await
        .unwrap();

    assert!(matches!(
        results.outcome("broken"),
        Some(NodeOutcome::Error(_))
    ));
    assert!(matches!(
        results.outcome("blocked"),
        Some(NodeOutcome::Aborted(_))
    ));
    // The failure never reached the independent branch.
    assert!(matches!(
        results.outcome("fine"),
        Some(NodeOutcome::Complete(_))
    ));
    assert_eq!(blocked_runs.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert_eq!(fine_runs.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn abort_propagates_transitively() {
    init_tracing();

    let source = MapSource::new(vec![
        Arc::new(TestNode::failing("root-cause")) as Arc<dyn GraphNode>,
        Arc::new(TestNode::ok("middle").with_deps(&["root-cause"])),
        Arc::new(TestNode::ok("top").with_deps(&["middle"])),
    ]);

    let task_graph = TaskGraph::new(4, EventBus::new());
    let results = task_graph
        .process("transitive", vec![source.get("top")], &source)
        .await
        .unwrap();

    assert!(matches!(
        results.outcome("root-cause"),
        Some(NodeOutcome::Error(_))
    ));
    for key in ["middle", "top"] {
        match results.outcome(key) {
            Some(NodeOutcome::Aborted(reason)) => {
                assert!(reason.to_string().contains("did not complete"));
            }
            other => panic!("expected {key} aborted, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn batch_reports_every_root_and_process_itself_succeeds() {
    init_tracing();

    let source = MapSource::new(vec![
        Arc::new(TestNode::failing("bad")) as Arc<dyn GraphNode>,
        Arc::new(TestNode::ok("good")),
    ]);

    let task_graph = TaskGraph::new(4, EventBus::new());
    let results = task_graph
        .process("both", vec![source.get("bad"), source.get("good")], &source)
        .await
        .expect("a failing root must not fail process");

    let statuses: Vec<(&str, bool)> = results
        .roots()
        .map(|(key, outcome)| (key, outcome.is_complete()))
        .collect();
    assert_eq!(statuses, vec![("bad", false), ("good", true)]);
    assert!(results.any_root_failed());
}

#[tokio::test]
async fn empty_batch_completes_immediately() {
    init_tracing();

    let source = MapSource::new(vec![]);
    let task_graph = TaskGraph::new(4, EventBus::new());

    let results = task_graph.process("empty", vec![], &source).await.unwrap();
    assert!(results.all().is_empty());
    assert!(!results.any_root_failed());
}
