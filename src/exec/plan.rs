// src/exec/plan.rs

//! Execution-plan expansion.
//!
//! Roots and their transitive `dependency_keys()` expand into a
//! deduplicated set of plan nodes; a key seen twice maps to the same node
//! regardless of how many requesters reference it. Expansion fails before
//! any execution when a key has no node ([`PlanError::MissingDependency`])
//! or when it revisits a key on the active expansion path
//! ([`PlanError::CyclicTaskDependency`]).

use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::PlanError;
use crate::exec::node::{GraphNode, NodeSource};
use crate::types::NodeKey;

/// One work item within a plan, with resolved adjacency.
pub struct PlanNode {
    pub node: Arc<dyn GraphNode>,
    /// Dependency keys, deduplicated, in declaration order.
    pub deps: Vec<NodeKey>,
    /// Keys of plan nodes that depend on this one.
    pub dependents: Vec<NodeKey>,
}

/// A fully expanded, validated execution plan for one batch.
pub struct ExecutionPlan {
    nodes: HashMap<NodeKey, PlanNode>,
    /// Keys in expansion postorder: dependencies before dependents.
    order: Vec<NodeKey>,
    roots: Vec<NodeKey>,
}

impl std::fmt::Debug for ExecutionPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionPlan")
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .field("order", &self.order)
            .field("roots", &self.roots)
            .finish()
    }
}

impl ExecutionPlan {
    pub fn expand(
        roots: Vec<Arc<dyn GraphNode>>,
        source: &dyn NodeSource,
    ) -> Result<Self, PlanError> {
        let mut nodes: HashMap<NodeKey, PlanNode> = HashMap::new();
        let mut order: Vec<NodeKey> = Vec::new();
        let mut path: Vec<NodeKey> = Vec::new();
        let mut root_keys: Vec<NodeKey> = Vec::new();

        for root in roots {
            let key = root.key();
            visit(root, source, &mut nodes, &mut order, &mut path)?;
            if !root_keys.contains(&key) {
                root_keys.push(key);
            }
        }

        // Reverse adjacency, now that the node set is complete.
        let edges: Vec<(NodeKey, NodeKey)> = nodes
            .iter()
            .flat_map(|(key, pn)| {
                pn.deps.iter().map(move |d| (d.clone(), key.clone()))
            })
            .collect();
        for (dep, dependent) in edges {
            if let Some(pn) = nodes.get_mut(&dep) {
                pn.dependents.push(dependent);
            }
        }

        Ok(Self {
            nodes,
            order,
            roots: root_keys,
        })
    }

    pub fn get(&self, key: &str) -> Option<&PlanNode> {
        self.nodes.get(key)
    }

    /// Keys in dependency-first order.
    pub fn keys(&self) -> impl Iterator<Item = &NodeKey> {
        self.order.iter()
    }

    pub fn roots(&self) -> &[NodeKey] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

fn visit(
    node: Arc<dyn GraphNode>,
    source: &dyn NodeSource,
    nodes: &mut HashMap<NodeKey, PlanNode>,
    order: &mut Vec<NodeKey>,
    path: &mut Vec<NodeKey>,
) -> Result<(), PlanError> {
    let key = node.key();

    if nodes.contains_key(&key) {
        // Already fully expanded: coalesce with the existing node.
        return Ok(());
    }
    if let Some(pos) = path.iter().position(|p| *p == key) {
        let mut cycle = path[pos..].to_vec();
        cycle.push(key);
        return Err(PlanError::CyclicTaskDependency { path: cycle });
    }

    path.push(key.clone());

    let mut deps: Vec<NodeKey> = Vec::new();
    for dep_key in node.dependency_keys() {
        if deps.contains(&dep_key) {
            continue;
        }
        let dep_node = source.resolve(&dep_key).ok_or_else(|| {
            PlanError::MissingDependency {
                requested_by: key.clone(),
                missing: dep_key.clone(),
            }
        })?;
        visit(dep_node, source, nodes, order, path)?;
        deps.push(dep_key);
    }

    path.pop();

    nodes.insert(
        key.clone(),
        PlanNode {
            node,
            deps,
            dependents: Vec::new(),
        },
    );
    order.push(key);

    Ok(())
}
