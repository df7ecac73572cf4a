// tests/plan_expansion.rs

use std::sync::Arc;

use devdag::errors::PlanError;
use devdag::exec::{ExecutionPlan, GraphNode};
use devdag_test_utils::fake::{MapSource, TestNode};

fn arcs(nodes: Vec<TestNode>) -> Vec<Arc<dyn GraphNode>> {
    nodes
        .into_iter()
        .map(|n| Arc::new(n) as Arc<dyn GraphNode>)
        .collect()
}

#[test]
fn expansion_covers_the_transitive_closure() {
    let nodes = arcs(vec![
        TestNode::ok("base"),
        TestNode::ok("lib").with_deps(&["base"]),
        TestNode::ok("app").with_deps(&["lib"]),
    ]);
    let source = MapSource::new(nodes);

    let plan = ExecutionPlan::expand(vec![source.get("app")], &source).unwrap();

    assert_eq!(plan.len(), 3);
    // Postorder: dependencies come before dependents.
    let order: Vec<&str> = plan.keys().map(String::as_str).collect();
    assert_eq!(order, vec!["base", "lib", "app"]);
    assert_eq!(plan.roots(), &["app".to_string()]);
}

#[test]
fn shared_dependency_is_coalesced() {
    let nodes = arcs(vec![
        TestNode::ok("shared"),
        TestNode::ok("left").with_deps(&["shared"]),
        TestNode::ok("right").with_deps(&["shared"]),
    ]);
    let source = MapSource::new(nodes);

    let plan = ExecutionPlan::expand(
        vec![source.get("left"), source.get("right")],
        &source,
    )
    .unwrap();

    assert_eq!(plan.len(), 3);
    let shared = plan.get("shared").unwrap();
    let mut dependents = shared.dependents.clone();
    dependents.sort();
    assert_eq!(dependents, vec!["left".to_string(), "right".to_string()]);
}

#[test]
fn duplicate_roots_collapse_to_one_request() {
    let nodes = arcs(vec![TestNode::ok("only")]);
    let source = MapSource::new(nodes);

    let plan = ExecutionPlan::expand(
        vec![source.get("only"), source.get("only")],
        &source,
    )
    .unwrap();

    assert_eq!(plan.len(), 1);
    assert_eq!(plan.roots(), &["only".to_string()]);
}

#[test]
fn unresolvable_key_fails_before_execution() {
    let nodes = arcs(vec![TestNode::ok("app").with_deps(&["missing"])]);
    let source = MapSource::new(nodes);

    let err = ExecutionPlan::expand(vec![source.get("app")], &source).unwrap_err();
    assert_eq!(
        err,
        PlanError::MissingDependency {
            requested_by: "app".to_string(),
            missing: "missing".to_string(),
        }
    );
}

#[test]
fn cyclic_keys_fail_with_the_offending_path() {
    let nodes = arcs(vec![
        TestNode::ok("a").with_deps(&["b"]),
        TestNode::ok("b").with_deps(&["a"]),
    ]);
    let source = MapSource::new(nodes);

    let err = ExecutionPlan::expand(vec![source.get("a")], &source).unwrap_err();
    match err {
        PlanError::CyclicTaskDependency { path } => {
            assert_eq!(path.first(), path.last());
            assert!(path.contains(&"a".to_string()));
            assert!(path.contains(&"b".to_string()));
        }
        other => panic!("expected CyclicTaskDependency, got {other:?}"),
    }
}
