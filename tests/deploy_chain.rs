// tests/deploy_chain.rs

//! End-to-end wiring over a two-module project: `web` build-depends on
//! `api`, and web's service depends on api's service at runtime.

use std::sync::Arc;

use devdag::actions::ActionFactory;
use devdag::events::EventBus;
use devdag::exec::{BatchResults, ExecutionPlan, NodeOutcome, TaskGraph};
use devdag::graph::{ConfigGraph, VersionResolver};
use devdag::types::ActionKind;
use devdag_test_utils::builders::ModuleDeclarationBuilder;
use devdag_test_utils::fake::FakeRunner;
use devdag_test_utils::init_tracing;

fn sample_modules() -> Vec<devdag::config::ModuleDeclaration> {
    vec![
        ModuleDeclarationBuilder::new("api")
            .build_cmd("make api")
            .service("api-service", &[])
            .build(),
        ModuleDeclarationBuilder::new("web")
            .build_cmd("make web")
            .build_dep("api")
            .service("web-service", &["api-service"])
            .build(),
    ]
}

fn factory_with(runner: Arc<FakeRunner>) -> ActionFactory {
    let modules = sample_modules();
    let graph = Arc::new(ConfigGraph::build(&modules).unwrap());
    let versions = VersionResolver::resolve(&graph, &modules, "fingerprint").unwrap();
    ActionFactory::new(graph, &modules, versions, runner)
}

fn outcome_by_prefix<'a>(results: &'a BatchResults, prefix: &str) -> &'a NodeOutcome {
    results
        .all()
        .iter()
        .find(|(key, _)| key.starts_with(prefix))
        .map(|(_, outcome)| outcome)
        .unwrap_or_else(|| panic!("no work item with prefix {prefix}"))
}

#[test]
fn deploy_request_expands_to_the_four_item_chain() {
    let runner = FakeRunner::new();
    let factory = factory_with(runner);

    let root = factory.request(ActionKind::Deploy, "web-service").unwrap();
    let plan = ExecutionPlan::expand(vec![root], &factory).unwrap();

    assert_eq!(plan.len(), 4);
    let keys: Vec<&str> = plan.keys().map(String::as_str).collect();
    for prefix in ["build.api.", "build.web.", "deploy.api-service.", "deploy.web-service."] {
        assert!(
            keys.iter().any(|k| k.starts_with(prefix)),
            "missing {prefix} in {keys:?}"
        );
    }
}

#[tokio::test]
async fn deploy_executes_builds_before_deploys_in_chain_order() {
    init_tracing();

    let runner = FakeRunner::new();
    let factory = factory_with(runner.clone());

    let root = factory.request(ActionKind::Deploy, "web-service").unwrap();
    let task_graph = TaskGraph::new(4, EventBus::new());
    let results = task_graph
        .process("deploy-web", vec![root], &factory)
        .await
        .unwrap();

    assert!(results.all().values().all(NodeOutcome::is_complete));

    let executed = runner.executed();
    assert_eq!(executed.len(), 4);
    let position = |prefix: &str| {
        executed
            .iter()
            .position(|label| label.starts_with(prefix))
            .unwrap_or_else(|| panic!("{prefix} never executed"))
    };

    assert!(position("build.api.") < position("build.web."));
    assert!(position("build.api.") < position("deploy.api-service."));
    assert!(position("build.web.") < position("deploy.web-service."));
    assert!(position("deploy.api-service.") < position("deploy.web-service."));
}

#[tokio::test]
async fn failing_base_build_aborts_the_remaining_chain() {
    init_tracing();

    let runner = FakeRunner::new();
    runner.fail_matching("build.api.");
    let factory = factory_with(runner.clone());

    let root = factory.request(ActionKind::Deploy, "web-service").unwrap();
    let task_graph = TaskGraph::new(4, EventBus::new());
    let results = task_graph
        .process("deploy-web", vec![root], &factory)
        .await
        .unwrap();

    assert!(matches!(
        outcome_by_prefix(&results, "build.api."),
        NodeOutcome::Error(_)
    ));
    for prefix in ["build.web.", "deploy.api-service.", "deploy.web-service."] {
        assert!(
            matches!(outcome_by_prefix(&results, prefix), NodeOutcome::Aborted(_)),
            "{prefix} should have been aborted"
        );
    }

    // Only the failing build actually ran.
    assert_eq!(runner.executed().len(), 1);
}

#[tokio::test]
async fn test_request_depends_on_its_service_chain() {
    init_tracing();

    let modules = vec![
        ModuleDeclarationBuilder::new("api")
            .build_cmd("make api")
            .service("api-service", &[])
            .test("api-smoke", &["api-service"])
            .build(),
    ];
    let graph = Arc::new(ConfigGraph::build(&modules).unwrap());
    let versions = VersionResolver::resolve(&graph, &modules, "fp").unwrap();
    let runner = FakeRunner::new();
    let factory = ActionFactory::new(graph, &modules, versions, runner.clone());

    let root = factory.request(ActionKind::RunTest, "api-smoke").unwrap();
    let task_graph = TaskGraph::new(4, EventBus::new());
    let results = task_graph
        .process("smoke", vec![root], &factory)
        .await
        .unwrap();

    assert!(results.all().values().all(NodeOutcome::is_complete));

    let executed = runner.executed();
    let position = |prefix: &str| {
        executed
            .iter()
            .position(|label| label.starts_with(prefix))
            .unwrap_or_else(|| panic!("{prefix} never executed"))
    };
    assert!(position("build.api.") < position("deploy.api-service."));
    assert!(position("deploy.api-service.") < position("test.api-smoke."));
}
