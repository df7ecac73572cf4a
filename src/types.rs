use std::fmt;

/// Canonical work-item key type used throughout the engine.
///
/// Keys are `<action>.<target>.<version>` strings; two requests with the
/// same key within one run refer to the same unit of work.
pub type NodeKey = String;

/// Caller-chosen identifier grouping one set of root requests.
pub type BatchId = String;

/// The operation a work item performs against its target entity.
///
/// Each kind maps to a distinct external operation but shares the same
/// scheduling contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Build,
    Deploy,
    RunTask,
    RunTest,
}

impl ActionKind {
    /// Stable lowercase name, used in keys and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Build => "build",
            ActionKind::Deploy => "deploy",
            ActionKind::RunTask => "run-task",
            ActionKind::RunTest => "test",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
