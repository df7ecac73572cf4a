// src/config/model.rs

//! Configuration file models.
//!
//! Two file shapes exist on disk:
//!
//! `devdag.toml` (project root marker):
//!
//! ```toml
//! [project]
//! name = "my-app"
//! default_environment = "local"
//!
//! [environment.local]
//! providers = ["container"]
//!
//! [provider.container]
//! ```
//!
//! `module.toml` (one per module directory):
//!
//! ```toml
//! [module]
//! name = "api"
//! type = "container"
//! build_cmd = "docker build -t api ."
//! build_deps = ["base"]
//!
//! [service.api]
//! cmd = "docker run api"
//! deps = ["api-migrate"]
//!
//! [task.api-migrate]
//! cmd = "bin/migrate"
//!
//! [test.api-unit]
//! cmd = "cargo test"
//! deps = ["api"]
//! ```
//!
//! File structs map TOML directly; [`ModuleDeclaration`] is the resolved,
//! order-preserving form handed to the graph.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Top-level `devdag.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectFile {
    pub project: ProjectSection,

    /// Environments from `[environment.<name>]`.
    #[serde(default)]
    pub environment: BTreeMap<String, EnvironmentConfig>,

    /// Provider tables from `[provider.<name>]`; contents are opaque to
    /// the graph engine and passed through to the provider.
    #[serde(default)]
    pub provider: BTreeMap<String, toml::Table>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectSection {
    pub name: String,

    #[serde(default)]
    pub default_environment: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct EnvironmentConfig {
    /// Providers enabled in this environment.
    #[serde(default)]
    pub providers: Vec<String>,

    /// Optional dotenv-style file loaded for this environment.
    #[serde(default)]
    pub varfile: Option<String>,

    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

/// Top-level `module.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleFile {
    pub module: ModuleSection,

    /// Services from `[service.<name>]`, keyed by service name.
    #[serde(default)]
    pub service: BTreeMap<String, ServiceConfig>,

    /// Tasks from `[task.<name>]`.
    #[serde(default)]
    pub task: BTreeMap<String, RunnableConfig>,

    /// Tests from `[test.<name>]`.
    #[serde(default)]
    pub test: BTreeMap<String, RunnableConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModuleSection {
    pub name: String,

    /// Module type; selects which provider builds/deploys it.
    #[serde(default = "default_module_type", rename = "type")]
    pub module_type: String,

    /// Command producing the module's build artifact. A module without
    /// one still participates in the graph (its build is a no-op).
    #[serde(default)]
    pub build_cmd: Option<String>,

    /// Names of modules whose builds must complete first.
    #[serde(default)]
    pub build_deps: Vec<String>,
}

fn default_module_type() -> String {
    "container".to_string()
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ServiceConfig {
    /// Command starting the long-running process.
    #[serde(default)]
    pub cmd: Option<String>,

    /// Names of services/tasks this service requires at runtime.
    #[serde(default)]
    pub deps: Vec<String>,
}

/// Shared shape of `[task.<name>]` and `[test.<name>]`.
#[derive(Debug, Clone, Deserialize)]
pub struct RunnableConfig {
    pub cmd: String,

    #[serde(default)]
    pub deps: Vec<String>,
}

/// Resolved module declaration in declaration order, as consumed by
/// [`ConfigGraph::build`](crate::graph::ConfigGraph::build) and the
/// version resolver (hence `Serialize`).
#[derive(Debug, Clone, Serialize)]
pub struct ModuleDeclaration {
    pub name: String,
    pub module_type: String,
    pub build_cmd: Option<String>,
    pub build_deps: Vec<String>,
    pub services: Vec<ServiceDeclaration>,
    pub tasks: Vec<RunnableDeclaration>,
    pub tests: Vec<RunnableDeclaration>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceDeclaration {
    pub name: String,
    pub cmd: Option<String>,
    pub deps: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunnableDeclaration {
    pub name: String,
    pub cmd: String,
    pub deps: Vec<String>,
}

impl ModuleDeclaration {
    pub fn from_file(file: ModuleFile) -> Self {
        Self {
            name: file.module.name,
            module_type: file.module.module_type,
            build_cmd: file.module.build_cmd,
            build_deps: file.module.build_deps,
            services: file
                .service
                .into_iter()
                .map(|(name, s)| ServiceDeclaration {
                    name,
                    cmd: s.cmd,
                    deps: s.deps,
                })
                .collect(),
            tasks: file
                .task
                .into_iter()
                .map(|(name, t)| RunnableDeclaration {
                    name,
                    cmd: t.cmd,
                    deps: t.deps,
                })
                .collect(),
            tests: file
                .test
                .into_iter()
                .map(|(name, t)| RunnableDeclaration {
                    name,
                    cmd: t.cmd,
                    deps: t.deps,
                })
                .collect(),
        }
    }
}
