// src/actions/nodes.rs

//! Work-item implementation shared by the four action kinds.
//!
//! Build, Deploy, RunTask and RunTest differ in their keys and dependency
//! mapping (computed by the factory), not in their execution shape: each
//! drives an optional opaque command through a [`CommandRunner`] and maps
//! a non-zero exit to an execution failure.

use std::sync::Arc;

use crate::actions::runner::{CommandRunner, CommandSpec};
use crate::errors::ExecutionError;
use crate::exec::node::{GraphNode, NodeContext, NodeFuture, NodeOutput};
use crate::graph::entity::EntityRef;
use crate::types::{ActionKind, NodeKey};

pub struct ActionNode {
    key: NodeKey,
    entity: EntityRef,
    action: ActionKind,
    deps: Vec<NodeKey>,
    command: Option<CommandSpec>,
    runner: Arc<dyn CommandRunner>,
}

impl ActionNode {
    pub fn new(
        key: NodeKey,
        entity: EntityRef,
        action: ActionKind,
        deps: Vec<NodeKey>,
        command: Option<CommandSpec>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            key,
            entity,
            action,
            deps,
            command,
            runner,
        }
    }
}

impl GraphNode for ActionNode {
    fn key(&self) -> NodeKey {
        self.key.clone()
    }

    fn entity(&self) -> EntityRef {
        self.entity.clone()
    }

    fn action(&self) -> ActionKind {
        self.action
    }

    fn dependency_keys(&self) -> Vec<NodeKey> {
        self.deps.clone()
    }

    fn execute(&self, ctx: NodeContext) -> NodeFuture<'_> {
        Box::pin(async move {
            let Some(spec) = &self.command else {
                // Declared without a command; the graph still orders it.
                return Ok(NodeOutput::message(format!(
                    "nothing to run for {}",
                    self.key
                )));
            };

            let output = self
                .runner
                .run(spec.clone(), ctx.cancel.clone())
                .await
                .map_err(ExecutionError::from)?;

            if !output.success() {
                return Err(ExecutionError::new(format!(
                    "{} of {} exited with code {}: {}",
                    self.action, self.entity, output.exit_code, output.tail
                )));
            }

            Ok(NodeOutput::message(output.tail))
        })
    }
}
