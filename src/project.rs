// src/project.rs

//! Project root discovery.

use std::path::{Path, PathBuf};

use crate::errors::{DevdagError, Result};

/// Marker file that makes a directory a project root.
pub const PROJECT_MARKER: &str = "devdag.toml";

/// Walk from `start` upward until a directory containing
/// [`PROJECT_MARKER`] is found.
///
/// The walk is a bounded loop: it terminates at the filesystem root.
pub fn find_project_root(start: &Path) -> Result<PathBuf> {
    let mut current = if start.is_absolute() {
        start.to_path_buf()
    } else {
        std::env::current_dir()?.join(start)
    };

    loop {
        if current.join(PROJECT_MARKER).is_file() {
            return Ok(current);
        }
        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => {
                return Err(DevdagError::ConfigError(format!(
                    "no {PROJECT_MARKER} found in {} or any parent directory",
                    start.display()
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn finds_marker_in_ancestor() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(PROJECT_MARKER), "[project]\nname = \"t\"\n").unwrap();
        let nested = dir.path().join("a/b/c");
        fs::create_dir_all(&nested).unwrap();

        let root = find_project_root(&nested).unwrap();
        assert_eq!(root, dir.path());
    }

    #[test]
    fn errors_without_marker() {
        let dir = tempfile::tempdir().unwrap();
        let err = find_project_root(dir.path()).unwrap_err();
        assert!(err.to_string().contains(PROJECT_MARKER));
    }
}
