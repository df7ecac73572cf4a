// src/errors.rs

//! Crate-wide error taxonomy.
//!
//! Construction-time errors ([`GraphError`], [`PlanError`]) are fatal and
//! surface to the caller before any execution begins. Execution-time errors
//! ([`ExecutionError`]) are local to one work item and propagate as
//! `Aborted` status to its dependents only.

use std::fmt;

use thiserror::Error;

use crate::graph::entity::EntityRef;
use crate::types::NodeKey;

/// Errors raised while constructing the configuration graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// A declared dependency reference does not match any entity.
    #[error("{owner} depends on {missing}, which is not defined")]
    DependencyNotFound { owner: EntityRef, missing: String },

    /// The dependency relation contains a cycle. The path starts at the
    /// first node revisited on the active traversal path.
    #[error("dependency cycle: {}", format_ref_cycle(.path))]
    CyclicDependency { path: Vec<EntityRef> },

    /// Two declarations produce the same `(kind, name)` entity.
    #[error("duplicate {0}")]
    DuplicateEntity(EntityRef),

    /// A lookup referenced an entity that is not in the graph.
    #[error("no {0} in the configuration graph")]
    EntityNotFound(EntityRef),
}

fn format_ref_cycle(path: &[EntityRef]) -> String {
    path.iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Errors raised while expanding root work items into an execution plan.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// A dependency key has no registered work-item factory.
    #[error("work item '{requested_by}' depends on '{missing}', which no factory produces")]
    MissingDependency {
        requested_by: NodeKey,
        missing: NodeKey,
    },

    /// Expansion revisited a key already on the current expansion path.
    #[error("work item dependency cycle: {}", .path.join(" -> "))]
    CyclicTaskDependency { path: Vec<NodeKey> },
}

/// Failure of a single work item's execution body.
///
/// Kept as a plain message so outcomes can be cloned to every requester of
/// a deduplicated key.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ExecutionError {
    pub message: String,
}

impl ExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for ExecutionError {
    fn from(err: anyhow::Error) -> Self {
        // `{:#}` flattens the context chain into one line.
        Self {
            message: format!("{err:#}"),
        }
    }
}

/// Why a work item ended up `Aborted` without executing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// A dependency reached `Error` or was itself aborted.
    DependencyFailed { dep: NodeKey },
    /// The run was cancelled.
    Cancelled,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::DependencyFailed { dep } => {
                write!(f, "dependency '{dep}' did not complete")
            }
            AbortReason::Cancelled => write!(f, "run cancelled"),
        }
    }
}

#[derive(Error, Debug)]
pub enum DevdagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, DevdagError>;
