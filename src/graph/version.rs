// src/graph/version.rs

//! Merkle-style module versions.
//!
//! A module's version hashes its own declaration together with the
//! versions of its build dependencies and the repository fingerprint, so
//! any change upstream changes every downstream version. Versions feed
//! work-item keys, making keys unique per operation + target + version.

use std::collections::HashMap;

use blake3::Hasher;
use tracing::debug;

use crate::config::model::ModuleDeclaration;
use crate::errors::{DevdagError, Result};
use crate::graph::config_graph::ConfigGraph;
use crate::graph::entity::EntityKind;

/// Length of the hex digest kept in keys and logs.
const VERSION_LEN: usize = 12;

/// Resolved per-module versions for one configuration snapshot.
#[derive(Debug, Clone)]
pub struct VersionResolver {
    versions: HashMap<String, String>,
}

impl VersionResolver {
    /// Compute versions for every module, walking builds in dependency
    /// order so that dependency versions are available when needed.
    pub fn resolve(
        graph: &ConfigGraph,
        modules: &[ModuleDeclaration],
        repo_fingerprint: &str,
    ) -> Result<Self> {
        let by_name: HashMap<&str, &ModuleDeclaration> =
            modules.iter().map(|m| (m.name.as_str(), m)).collect();

        let mut versions: HashMap<String, String> = HashMap::new();

        for entity in graph.toposort() {
            if entity.kind != EntityKind::Build {
                continue;
            }
            let decl = by_name.get(entity.name.as_str()).ok_or_else(|| {
                DevdagError::ConfigError(format!(
                    "no declaration for module '{}' while versioning",
                    entity.name
                ))
            })?;

            let serialized = toml::to_string(decl).map_err(|e| {
                DevdagError::ConfigError(format!(
                    "serializing module '{}' for versioning: {e}",
                    entity.name
                ))
            })?;

            let mut dep_versions: Vec<&str> = decl
                .build_deps
                .iter()
                // Topological order guarantees presence.
                .filter_map(|d| versions.get(d).map(String::as_str))
                .collect();
            dep_versions.sort_unstable();

            let mut hasher = Hasher::new();
            hasher.update(serialized.as_bytes());
            for v in dep_versions {
                hasher.update(v.as_bytes());
            }
            hasher.update(repo_fingerprint.as_bytes());

            let mut hex = hasher.finalize().to_hex().to_string();
            hex.truncate(VERSION_LEN);
            debug!(module = %entity.name, version = %hex, "resolved module version");
            versions.insert(entity.name.clone(), hex);
        }

        Ok(Self { versions })
    }

    pub fn version_of(&self, module: &str) -> Option<&str> {
        self.versions.get(module).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::{ModuleDeclaration, RunnableDeclaration};

    fn module(name: &str, build_deps: &[&str]) -> ModuleDeclaration {
        ModuleDeclaration {
            name: name.to_string(),
            module_type: "container".to_string(),
            build_cmd: None,
            build_deps: build_deps.iter().map(|s| s.to_string()).collect(),
            services: vec![],
            tasks: vec![],
            tests: vec![],
        }
    }

    #[test]
    fn versions_are_stable_for_identical_input() {
        let modules = vec![module("api", &[]), module("web", &["api"])];
        let graph = ConfigGraph::build(&modules).unwrap();

        let a = VersionResolver::resolve(&graph, &modules, "fp").unwrap();
        let b = VersionResolver::resolve(&graph, &modules, "fp").unwrap();

        assert_eq!(a.version_of("web"), b.version_of("web"));
        assert_eq!(a.version_of("api").unwrap().len(), VERSION_LEN);
    }

    #[test]
    fn dependency_change_propagates_downstream() {
        let before = vec![module("api", &[]), module("web", &["api"])];
        let mut after = before.clone();
        after[0].tasks.push(RunnableDeclaration {
            name: "migrate".to_string(),
            cmd: "true".to_string(),
            deps: vec![],
        });

        let graph_before = ConfigGraph::build(&before).unwrap();
        let graph_after = ConfigGraph::build(&after).unwrap();

        let v_before = VersionResolver::resolve(&graph_before, &before, "fp").unwrap();
        let v_after = VersionResolver::resolve(&graph_after, &after, "fp").unwrap();

        assert_ne!(v_before.version_of("api"), v_after.version_of("api"));
        assert_ne!(v_before.version_of("web"), v_after.version_of("web"));
    }

    #[test]
    fn fingerprint_change_propagates_everywhere() {
        let modules = vec![module("api", &[])];
        let graph = ConfigGraph::build(&modules).unwrap();

        let a = VersionResolver::resolve(&graph, &modules, "one").unwrap();
        let b = VersionResolver::resolve(&graph, &modules, "two").unwrap();

        assert_ne!(a.version_of("api"), b.version_of("api"));
    }
}
