// src/config/loader.rs

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::config::model::{ModuleDeclaration, ModuleFile, ProjectFile};
use crate::errors::Result;

/// Load and deserialize the project file (`devdag.toml`).
///
/// This only performs TOML deserialization; semantic validation of the
/// module set happens in [`validate`](crate::config::validate) and in
/// graph construction.
pub fn load_project(path: impl AsRef<Path>) -> Result<ProjectFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let project: ProjectFile = toml::from_str(&contents)?;
    debug!(path = ?path, project = %project.project.name, "loaded project file");
    Ok(project)
}

/// Load and deserialize a single `module.toml`.
pub fn load_module_file(path: impl AsRef<Path>) -> Result<ModuleFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let file: ModuleFile = toml::from_str(&contents)?;
    Ok(file)
}

/// Load every module file, in path order, into resolved declarations.
///
/// The path order is the declaration order: it determines entity ordering
/// in the graph and must be stable across runs (the scanner sorts paths).
pub fn load_modules<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<ModuleDeclaration>> {
    let mut declarations = Vec::with_capacity(paths.len());
    for path in paths {
        let file = load_module_file(path)?;
        debug!(path = ?path.as_ref(), module = %file.module.name, "loaded module file");
        declarations.push(ModuleDeclaration::from_file(file));
    }
    Ok(declarations)
}
