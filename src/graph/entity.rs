// src/graph/entity.rs

//! Typed graph nodes and their references. Pure data; no behaviour.

use std::fmt;

/// The kind of a configuration-graph entity.
///
/// Names are globally unique per kind, so `(kind, name)` identifies an
/// entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Module,
    Build,
    Service,
    Task,
    Test,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Module => "module",
            EntityKind::Build => "build",
            EntityKind::Service => "service",
            EntityKind::Task => "task",
            EntityKind::Test => "test",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable address of an entity: `(kind, name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub name: String,
}

impl EntityRef {
    pub fn new(kind: EntityKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    pub fn module(name: impl Into<String>) -> Self {
        Self::new(EntityKind::Module, name)
    }

    pub fn build(name: impl Into<String>) -> Self {
        Self::new(EntityKind::Build, name)
    }

    pub fn service(name: impl Into<String>) -> Self {
        Self::new(EntityKind::Service, name)
    }

    pub fn task(name: impl Into<String>) -> Self {
        Self::new(EntityKind::Task, name)
    }

    pub fn test(name: impl Into<String>) -> Self {
        Self::new(EntityKind::Test, name)
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.kind, self.name)
    }
}

/// A node in the configuration graph.
///
/// Edges are expressed as [`EntityRef`] lists rather than object
/// references, so the structure stays acyclic-by-construction at the
/// representation level; validation happens once in
/// [`ConfigGraph::build`](crate::graph::ConfigGraph::build).
#[derive(Debug, Clone)]
pub struct Entity {
    pub kind: EntityKind,
    pub name: String,
    /// Name of the module this entity belongs to. For `Module` and `Build`
    /// entities this is the entity's own name.
    pub module_name: String,
    /// Direct dependency references, in declaration order.
    pub deps: Vec<EntityRef>,
}

impl Entity {
    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::new(self.kind, self.name.clone())
    }
}
