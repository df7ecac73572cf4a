// src/graph/config_graph.rs

//! The resolved, immutable dependency graph over all entities for one
//! configuration snapshot.
//!
//! Built in a single pass from module declarations, validated once
//! (reference integrity + acyclicity), then read-only. Any declaration
//! change rebuilds the graph wholesale; there is no incremental mutation.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::config::model::ModuleDeclaration;
use crate::errors::GraphError;
use crate::graph::entity::{Entity, EntityKind, EntityRef};

/// Options for [`ConfigGraph::dependencies`] / [`ConfigGraph::dependents`].
#[derive(Debug, Clone, Default)]
pub struct Traversal {
    /// Follow edges transitively instead of one hop.
    pub recursive: bool,
    /// Restrict the *returned* entities to these kinds. Traversal itself
    /// always crosses all kinds.
    pub kinds: Option<Vec<EntityKind>>,
}

impl Traversal {
    /// Direct neighbours only, all kinds.
    pub fn direct() -> Self {
        Self::default()
    }

    /// Transitive closure, all kinds.
    pub fn deep() -> Self {
        Self {
            recursive: true,
            kinds: None,
        }
    }

    pub fn kinds(mut self, kinds: &[EntityKind]) -> Self {
        self.kinds = Some(kinds.to_vec());
        self
    }

    fn admits(&self, kind: EntityKind) -> bool {
        match &self.kinds {
            Some(kinds) => kinds.contains(&kind),
            None => true,
        }
    }
}

/// Arena of entities addressed by `(kind, name)`, with forward and reverse
/// adjacency kept as index lists.
#[derive(Debug, Clone)]
pub struct ConfigGraph {
    entities: Vec<Entity>,
    index: HashMap<EntityRef, usize>,
    /// Forward edges: entity -> its dependencies.
    deps: Vec<Vec<usize>>,
    /// Reverse edges: entity -> its dependents.
    dependents: Vec<Vec<usize>>,
    /// Dependency-first topological order (DFS postorder).
    topo: Vec<usize>,
}

impl ConfigGraph {
    /// Construct the entity set and edges from resolved module declarations.
    ///
    /// Per declaration this creates one `Module` entity, one `Build` entity
    /// and one entity per declared service/task/test. A bare dependency
    /// name on a service/task/test resolves to the service of that name if
    /// one exists, otherwise to the task of that name.
    ///
    /// Fails with [`GraphError::DependencyNotFound`] if any reference does
    /// not resolve, and with [`GraphError::CyclicDependency`] if the
    /// dependency relation contains a cycle.
    pub fn build(modules: &[ModuleDeclaration]) -> Result<Self, GraphError> {
        let mut service_names: HashSet<&str> = HashSet::new();
        let mut task_names: HashSet<&str> = HashSet::new();
        for m in modules {
            service_names.extend(m.services.iter().map(|s| s.name.as_str()));
            task_names.extend(m.tasks.iter().map(|t| t.name.as_str()));
        }

        // Pass 1: create entities in declaration order.
        let mut entities: Vec<Entity> = Vec::new();
        for m in modules {
            entities.push(Entity {
                kind: EntityKind::Module,
                name: m.name.clone(),
                module_name: m.name.clone(),
                deps: m.build_deps.iter().map(EntityRef::module).collect(),
            });
            entities.push(Entity {
                kind: EntityKind::Build,
                name: m.name.clone(),
                module_name: m.name.clone(),
                deps: m.build_deps.iter().map(EntityRef::build).collect(),
            });
            for s in &m.services {
                entities.push(Entity {
                    kind: EntityKind::Service,
                    name: s.name.clone(),
                    module_name: m.name.clone(),
                    deps: resolve_runtime_deps(
                        EntityRef::service(&s.name),
                        &s.deps,
                        &service_names,
                        &task_names,
                    )?,
                });
            }
            for t in &m.tasks {
                entities.push(Entity {
                    kind: EntityKind::Task,
                    name: t.name.clone(),
                    module_name: m.name.clone(),
                    deps: resolve_runtime_deps(
                        EntityRef::task(&t.name),
                        &t.deps,
                        &service_names,
                        &task_names,
                    )?,
                });
            }
            for t in &m.tests {
                entities.push(Entity {
                    kind: EntityKind::Test,
                    name: t.name.clone(),
                    module_name: m.name.clone(),
                    deps: resolve_runtime_deps(
                        EntityRef::test(&t.name),
                        &t.deps,
                        &service_names,
                        &task_names,
                    )?,
                });
            }
        }

        // Pass 2: index with duplicate detection.
        let mut index: HashMap<EntityRef, usize> = HashMap::new();
        for (i, entity) in entities.iter().enumerate() {
            if index.insert(entity.entity_ref(), i).is_some() {
                return Err(GraphError::DuplicateEntity(entity.entity_ref()));
            }
        }

        // Pass 3: resolve edges to indices; build deps may reference
        // modules that do not exist.
        let mut deps: Vec<Vec<usize>> = vec![Vec::new(); entities.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); entities.len()];
        for (i, entity) in entities.iter().enumerate() {
            for dep_ref in &entity.deps {
                let j = *index.get(dep_ref).ok_or_else(|| {
                    GraphError::DependencyNotFound {
                        owner: entity.entity_ref(),
                        missing: dep_ref.to_string(),
                    }
                })?;
                deps[i].push(j);
                dependents[j].push(i);
            }
        }

        let topo = check_acyclic(&entities, &deps)?;

        debug!(
            entities = entities.len(),
            modules = modules.len(),
            "configuration graph built"
        );

        Ok(Self {
            entities,
            index,
            deps,
            dependents,
            topo,
        })
    }

    /// All entities in declaration order, optionally filtered by kind.
    pub fn entities(&self, kind: Option<EntityKind>) -> impl Iterator<Item = &Entity> {
        self.entities
            .iter()
            .filter(move |e| kind.is_none_or(|k| e.kind == k))
    }

    /// Look up a single entity.
    pub fn get(&self, entity: &EntityRef) -> Option<&Entity> {
        self.index.get(entity).map(|&i| &self.entities[i])
    }

    /// Resolve references into entities, preserving order.
    pub fn resolve(&self, refs: &[EntityRef]) -> Result<Vec<&Entity>, GraphError> {
        refs.iter()
            .map(|r| {
                self.get(r)
                    .ok_or_else(|| GraphError::EntityNotFound(r.clone()))
            })
            .collect()
    }

    /// Direct or transitive dependencies of an entity.
    pub fn dependencies(
        &self,
        entity: &EntityRef,
        opts: &Traversal,
    ) -> Result<Vec<&Entity>, GraphError> {
        self.traverse(entity, opts, &self.deps)
    }

    /// Direct or transitive dependents of an entity (reverse closure);
    /// the blast radius of a failure or a change.
    pub fn dependents(
        &self,
        entity: &EntityRef,
        opts: &Traversal,
    ) -> Result<Vec<&Entity>, GraphError> {
        self.traverse(entity, opts, &self.dependents)
    }

    /// Entities in dependency-first topological order.
    pub fn toposort(&self) -> Vec<&Entity> {
        self.topo.iter().map(|&i| &self.entities[i]).collect()
    }

    /// Topological batches: every entity in batch `n` depends only on
    /// entities in batches `< n`, so each batch could be processed
    /// concurrently.
    pub fn processing_batches(&self) -> Vec<Vec<&Entity>> {
        let mut level = vec![0usize; self.entities.len()];
        let mut batches: Vec<Vec<&Entity>> = Vec::new();

        for &i in &self.topo {
            let lvl = self.deps[i]
                .iter()
                .map(|&d| level[d] + 1)
                .max()
                .unwrap_or(0);
            level[i] = lvl;
            if batches.len() <= lvl {
                batches.resize_with(lvl + 1, Vec::new);
            }
            batches[lvl].push(&self.entities[i]);
        }

        batches
    }

    fn traverse(
        &self,
        entity: &EntityRef,
        opts: &Traversal,
        edges: &[Vec<usize>],
    ) -> Result<Vec<&Entity>, GraphError> {
        let start = *self
            .index
            .get(entity)
            .ok_or_else(|| GraphError::EntityNotFound(entity.clone()))?;

        let mut visited: HashSet<usize> = HashSet::new();
        let mut queue: Vec<usize> = edges[start].clone();
        let mut out: Vec<&Entity> = Vec::new();

        let mut i = 0;
        while i < queue.len() {
            let n = queue[i];
            i += 1;
            if !visited.insert(n) {
                continue;
            }
            let e = &self.entities[n];
            if opts.admits(e.kind) {
                out.push(e);
            }
            if opts.recursive {
                queue.extend(edges[n].iter().copied());
            }
        }

        Ok(out)
    }
}

fn resolve_runtime_deps(
    owner: EntityRef,
    names: &[String],
    service_names: &HashSet<&str>,
    task_names: &HashSet<&str>,
) -> Result<Vec<EntityRef>, GraphError> {
    names
        .iter()
        .map(|name| {
            if service_names.contains(name.as_str()) {
                Ok(EntityRef::service(name))
            } else if task_names.contains(name.as_str()) {
                Ok(EntityRef::task(name))
            } else {
                Err(GraphError::DependencyNotFound {
                    owner: owner.clone(),
                    missing: format!("service or task '{name}'"),
                })
            }
        })
        .collect()
}

/// Depth-first cycle check over the resolved adjacency.
///
/// Tracks the active path; the first node revisited on it starts the
/// reported cycle. Returns the DFS postorder, which doubles as a
/// dependency-first topological order when the graph is acyclic.
fn check_acyclic(
    entities: &[Entity],
    deps: &[Vec<usize>],
) -> Result<Vec<usize>, GraphError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        OnPath,
        Done,
    }

    fn visit(
        n: usize,
        entities: &[Entity],
        deps: &[Vec<usize>],
        marks: &mut [Mark],
        path: &mut Vec<usize>,
        topo: &mut Vec<usize>,
    ) -> Result<(), GraphError> {
        match marks[n] {
            Mark::Done => return Ok(()),
            Mark::OnPath => {
                let pos = path.iter().position(|&p| p == n).unwrap_or(0);
                let mut cycle: Vec<_> = path[pos..]
                    .iter()
                    .map(|&p| entities[p].entity_ref())
                    .collect();
                cycle.push(entities[n].entity_ref());
                return Err(GraphError::CyclicDependency { path: cycle });
            }
            Mark::Unvisited => {}
        }

        marks[n] = Mark::OnPath;
        path.push(n);
        for &d in &deps[n] {
            visit(d, entities, deps, marks, path, topo)?;
        }
        path.pop();
        marks[n] = Mark::Done;
        topo.push(n);
        Ok(())
    }

    let mut marks = vec![Mark::Unvisited; entities.len()];
    let mut path = Vec::new();
    let mut topo = Vec::new();
    for n in 0..entities.len() {
        visit(n, entities, deps, &mut marks, &mut path, &mut topo)?;
    }
    Ok(topo)
}
