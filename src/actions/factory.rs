// src/actions/factory.rs

//! Work-item factory over the configuration graph.
//!
//! Given an entity and an operation kind, produces an [`ActionNode`] with
//! a deterministic key (`<action>.<name>.<version>`) and the dependency
//! keys the scheduling contract requires:
//!
//! - `Build(module)` depends on the builds of its build dependencies
//! - `Deploy(service)` depends on the owning module's build plus the
//!   deploy/run of each runtime dependency
//! - `RunTask(task)` / `RunTest(test)` likewise
//!
//! Requesting a node registers its whole dependency closure, so the
//! factory doubles as the scheduler's [`NodeSource`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::actions::nodes::ActionNode;
use crate::actions::runner::{CommandRunner, CommandSpec};
use crate::config::model::ModuleDeclaration;
use crate::errors::{DevdagError, GraphError, Result};
use crate::exec::node::{GraphNode, NodeSource};
use crate::graph::entity::{Entity, EntityKind, EntityRef};
use crate::graph::{ConfigGraph, VersionResolver};
use crate::types::{ActionKind, NodeKey};

pub struct ActionFactory {
    graph: Arc<ConfigGraph>,
    versions: VersionResolver,
    runner: Arc<dyn CommandRunner>,
    /// Opaque command descriptor per entity, from the declarations.
    commands: HashMap<EntityRef, String>,
    registry: Mutex<HashMap<NodeKey, Arc<ActionNode>>>,
}

impl ActionFactory {
    pub fn new(
        graph: Arc<ConfigGraph>,
        modules: &[ModuleDeclaration],
        versions: VersionResolver,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        let mut commands = HashMap::new();
        for m in modules {
            if let Some(cmd) = &m.build_cmd {
                commands.insert(EntityRef::build(&m.name), cmd.clone());
            }
            for s in &m.services {
                if let Some(cmd) = &s.cmd {
                    commands.insert(EntityRef::service(&s.name), cmd.clone());
                }
            }
            for t in &m.tasks {
                commands.insert(EntityRef::task(&t.name), t.cmd.clone());
            }
            for t in &m.tests {
                commands.insert(EntityRef::test(&t.name), t.cmd.clone());
            }
        }

        Self {
            graph,
            versions,
            runner,
            commands,
            registry: Mutex::new(HashMap::new()),
        }
    }

    /// Produce the root work item for `action` against the named entity,
    /// registering its transitive dependency closure.
    pub fn request(&self, action: ActionKind, name: &str) -> Result<Arc<dyn GraphNode>> {
        let target = EntityRef::new(target_kind(action), name);
        let entity = self
            .graph
            .get(&target)
            .ok_or(GraphError::EntityNotFound(target))?
            .clone();
        let node = self.node_for(action, &entity)?;
        Ok(node)
    }

    /// Root work items for `action` against every entity of its target
    /// kind, in declaration order.
    pub fn request_all(&self, action: ActionKind) -> Result<Vec<Arc<dyn GraphNode>>> {
        let names: Vec<String> = self
            .graph
            .entities(Some(target_kind(action)))
            .map(|e| e.name.clone())
            .collect();
        names
            .iter()
            .map(|name| self.request(action, name))
            .collect()
    }

    fn node_for(&self, action: ActionKind, entity: &Entity) -> Result<Arc<dyn GraphNode>> {
        let version = self
            .versions
            .version_of(&entity.module_name)
            .ok_or_else(|| {
                DevdagError::ConfigError(format!(
                    "no version for module '{}'",
                    entity.module_name
                ))
            })?;
        let key = format!("{}.{}.{}", action.as_str(), entity.name, version);

        if let Some(node) = lock(&self.registry).get(&key) {
            return Ok(node.clone() as Arc<dyn GraphNode>);
        }

        // The graph is acyclic by construction, so this recursion is
        // bounded by the entity count.
        let mut deps: Vec<NodeKey> = Vec::new();
        match action {
            ActionKind::Build => {
                for dep_ref in &entity.deps {
                    let dep = self.entity(dep_ref)?;
                    deps.push(self.node_for(ActionKind::Build, &dep)?.key());
                }
            }
            ActionKind::Deploy | ActionKind::RunTask | ActionKind::RunTest => {
                let build = self.entity(&EntityRef::build(&entity.module_name))?;
                deps.push(self.node_for(ActionKind::Build, &build)?.key());

                for dep_ref in &entity.deps {
                    let dep = self.entity(dep_ref)?;
                    let dep_action = match dep_ref.kind {
                        EntityKind::Service => ActionKind::Deploy,
                        EntityKind::Task => ActionKind::RunTask,
                        other => {
                            return Err(DevdagError::ConfigError(format!(
                                "{} cannot be a runtime dependency of {}",
                                other,
                                entity.entity_ref()
                            )))
                        }
                    };
                    deps.push(self.node_for(dep_action, &dep)?.key());
                }
            }
        }

        let command = self
            .commands
            .get(&entity.entity_ref())
            .map(|cmd| CommandSpec {
                label: key.clone(),
                cmd: cmd.clone(),
            });

        let node = Arc::new(ActionNode::new(
            key.clone(),
            entity.entity_ref(),
            action,
            deps,
            command,
            Arc::clone(&self.runner),
        ));
        lock(&self.registry).insert(key, node.clone());
        Ok(node as Arc<dyn GraphNode>)
    }

    fn entity(&self, r: &EntityRef) -> Result<Entity> {
        Ok(self
            .graph
            .get(r)
            .ok_or_else(|| GraphError::EntityNotFound(r.clone()))?
            .clone())
    }
}

impl NodeSource for ActionFactory {
    fn resolve(&self, key: &str) -> Option<Arc<dyn GraphNode>> {
        lock(&self.registry)
            .get(key)
            .map(|node| node.clone() as Arc<dyn GraphNode>)
    }
}

/// Which entity kind an action operates on.
fn target_kind(action: ActionKind) -> EntityKind {
    match action {
        ActionKind::Build => EntityKind::Build,
        ActionKind::Deploy => EntityKind::Service,
        ActionKind::RunTask => EntityKind::Task,
        ActionKind::RunTest => EntityKind::Test,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
