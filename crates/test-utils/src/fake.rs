use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;

use devdag::actions::{CommandOutput, CommandRunner, CommandSpec};
use devdag::errors::ExecutionError;
use devdag::exec::{GraphNode, NodeContext, NodeFuture, NodeOutput, NodeSource};
use devdag::graph::EntityRef;
use devdag::types::{ActionKind, NodeKey};

/// A fake command runner that:
/// - records the labels of every command it "runs", in execution order
/// - returns exit code 1 for labels matching a configured substring.
pub struct FakeRunner {
    executed: Arc<Mutex<Vec<String>>>,
    failing: Mutex<Vec<String>>,
}

impl FakeRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            executed: Arc::new(Mutex::new(Vec::new())),
            failing: Mutex::new(Vec::new()),
        })
    }

    /// Any command whose label contains `substring` exits non-zero.
    pub fn fail_matching(&self, substring: &str) {
        self.failing.lock().unwrap().push(substring.to_string());
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

impl CommandRunner for FakeRunner {
    fn run(
        &self,
        spec: CommandSpec,
        _cancel: watch::Receiver<bool>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<CommandOutput>> + Send + '_>> {
        let executed = Arc::clone(&self.executed);
        let fails = self
            .failing
            .lock()
            .unwrap()
            .iter()
            .any(|s| spec.label.contains(s.as_str()));

        Box::pin(async move {
            executed.lock().unwrap().push(spec.label.clone());
            let exit_code = if fails { 1 } else { 0 };
            Ok(CommandOutput {
                exit_code,
                tail: format!("ran {}", spec.cmd),
            })
        })
    }
}

/// Tracks how many bodies are inside their execution at once.
#[derive(Default)]
pub struct ConcurrencyGauge {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl ConcurrencyGauge {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn max_seen(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

/// Instrumented `GraphNode` for scheduler tests.
///
/// Records `start:<key>` / `done:<key>` into an optional shared log,
/// counts executions, optionally sleeps, optionally fails.
pub struct TestNode {
    key: NodeKey,
    deps: Vec<NodeKey>,
    fail: bool,
    delay: Option<Duration>,
    runs: Arc<AtomicUsize>,
    log: Option<Arc<Mutex<Vec<String>>>>,
    gauge: Option<Arc<ConcurrencyGauge>>,
}

impl TestNode {
    pub fn ok(key: &str) -> Self {
        Self {
            key: key.to_string(),
            deps: vec![],
            fail: false,
            delay: None,
            runs: Arc::new(AtomicUsize::new(0)),
            log: None,
            gauge: None,
        }
    }

    pub fn failing(key: &str) -> Self {
        let mut node = Self::ok(key);
        node.fail = true;
        node
    }

    pub fn with_deps(mut self, deps: &[&str]) -> Self {
        self.deps = deps.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn recording(mut self, log: Arc<Mutex<Vec<String>>>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn with_gauge(mut self, gauge: Arc<ConcurrencyGauge>) -> Self {
        self.gauge = Some(gauge);
        self
    }

    /// Handle for asserting how many times the body ran.
    pub fn run_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.runs)
    }
}

impl GraphNode for TestNode {
    fn key(&self) -> NodeKey {
        self.key.clone()
    }

    fn entity(&self) -> EntityRef {
        EntityRef::task(self.key.clone())
    }

    fn action(&self) -> ActionKind {
        ActionKind::RunTask
    }

    fn dependency_keys(&self) -> Vec<NodeKey> {
        self.deps.clone()
    }

    fn execute(&self, _ctx: NodeContext) -> NodeFuture<'_> {
        Box::pin(async move {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if let Some(log) = &self.log {
                log.lock().unwrap().push(format!("start:{}", self.key));
            }
            if let Some(gauge) = &self.gauge {
                gauge.enter();
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(gauge) = &self.gauge {
                gauge.exit();
            }
            if let Some(log) = &self.log {
                log.lock().unwrap().push(format!("done:{}", self.key));
            }

            if self.fail {
                Err(ExecutionError::new(format!("{} failed", self.key)))
            } else {
                Ok(NodeOutput::message(format!("{} ok", self.key)))
            }
        })
    }
}

/// `NodeSource` over a fixed node set.
pub struct MapSource {
    nodes: HashMap<NodeKey, Arc<dyn GraphNode>>,
}

impl MapSource {
    pub fn new(nodes: Vec<Arc<dyn GraphNode>>) -> Self {
        Self {
            nodes: nodes.into_iter().map(|n| (n.key(), n)).collect(),
        }
    }

    /// Panics if the key is unknown (test convenience).
    pub fn get(&self, key: &str) -> Arc<dyn GraphNode> {
        Arc::clone(self.nodes.get(key).expect("unknown test node key"))
    }
}

impl NodeSource for MapSource {
    fn resolve(&self, key: &str) -> Option<Arc<dyn GraphNode>> {
        self.nodes.get(key).cloned()
    }
}
