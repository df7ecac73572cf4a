// src/config/validate.rs

//! Raw declaration validation.
//!
//! Checks the things that are about file contents rather than graph
//! structure: identifier syntax, self-dependencies, and a module-level
//! build-dependency sanity pass with a module-focused error message.
//! Reference integrity and full-relation acyclicity are the graph's job
//! ([`ConfigGraph::build`](crate::graph::ConfigGraph::build)).

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use regex::Regex;

use crate::config::model::ModuleDeclaration;
use crate::errors::{DevdagError, Result};

/// `module`, `service-2`, `db-migrate` — lowercase, digits, dashes.
const NAME_PATTERN: &str = "^[a-z][a-z0-9-]*$";

pub fn validate_declarations(modules: &[ModuleDeclaration]) -> Result<()> {
    ensure_has_modules(modules)?;
    validate_names(modules)?;
    validate_self_deps(modules)?;
    validate_build_dep_graph(modules)?;
    Ok(())
}

fn ensure_has_modules(modules: &[ModuleDeclaration]) -> Result<()> {
    if modules.is_empty() {
        return Err(DevdagError::ConfigError(
            "project contains no module.toml files".to_string(),
        ));
    }
    Ok(())
}

fn validate_names(modules: &[ModuleDeclaration]) -> Result<()> {
    let pattern = Regex::new(NAME_PATTERN).map_err(|e| {
        DevdagError::ConfigError(format!("compiling name pattern: {e}"))
    })?;

    let check = |what: &str, name: &str| -> Result<()> {
        if !pattern.is_match(name) {
            return Err(DevdagError::ConfigError(format!(
                "invalid {what} name '{name}' (expected {NAME_PATTERN})"
            )));
        }
        Ok(())
    };

    for m in modules {
        check("module", &m.name)?;
        for s in &m.services {
            check("service", &s.name)?;
        }
        for t in &m.tasks {
            check("task", &t.name)?;
        }
        for t in &m.tests {
            check("test", &t.name)?;
        }
    }
    Ok(())
}

fn validate_self_deps(modules: &[ModuleDeclaration]) -> Result<()> {
    for m in modules {
        if m.build_deps.iter().any(|d| d == &m.name) {
            return Err(DevdagError::ConfigError(format!(
                "module '{}' cannot list itself in `build_deps`",
                m.name
            )));
        }
        for s in &m.services {
            if s.deps.iter().any(|d| d == &s.name) {
                return Err(DevdagError::ConfigError(format!(
                    "service '{}' cannot depend on itself",
                    s.name
                )));
            }
        }
        for t in m.tasks.iter().chain(m.tests.iter()) {
            if t.deps.iter().any(|d| d == &t.name) {
                return Err(DevdagError::ConfigError(format!(
                    "'{}' cannot depend on itself",
                    t.name
                )));
            }
        }
    }
    Ok(())
}

/// Quick module-level cycle check over `build_deps`.
///
/// Edge direction: dep -> module, so a topological sort fails exactly when
/// the build dependencies cycle. The graph layer repeats this over the
/// full entity relation with a path-reporting error; here we keep the
/// message in terms the user wrote (module names).
fn validate_build_dep_graph(modules: &[ModuleDeclaration]) -> Result<()> {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for m in modules {
        graph.add_node(m.name.as_str());
    }
    for m in modules {
        for dep in &m.build_deps {
            graph.add_edge(dep.as_str(), m.name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(DevdagError::ConfigError(format!(
            "cycle in module build dependencies involving module '{}'",
            cycle.node_id()
        ))),
    }
}
