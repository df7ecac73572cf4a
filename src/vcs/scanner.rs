// src/vcs/scanner.rs

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use blake3::Hasher;
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::debug;

use crate::errors::Result;
use crate::project::PROJECT_MARKER;
use crate::vcs::VcsHandler;

/// Patterns for files that are part of the configuration.
const INCLUDE_PATTERNS: &[&str] = &["devdag.toml", "**/module.toml"];

/// Directories never scanned.
const EXCLUDE_PATTERNS: &[&str] = &["**/target/**", "**/.git/**", "**/node_modules/**"];

/// Filesystem-backed config enumeration.
///
/// Stands in for real version-control integration: "tracked" means any
/// config file under the project root that is not excluded. The
/// fingerprint hashes sorted relative paths and contents, so it changes
/// exactly when the tracked configuration changes.
pub struct ConfigScanner {
    root: PathBuf,
    include: GlobSet,
    exclude: GlobSet,
}

impl ConfigScanner {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            root: root.into(),
            include: build_globset(INCLUDE_PATTERNS)?,
            exclude: build_globset(EXCLUDE_PATTERNS)?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Tracked module files only (the project marker excluded), sorted.
    pub fn module_files(&self) -> Result<Vec<PathBuf>> {
        Ok(self
            .tracked_config_files()?
            .into_iter()
            .filter(|p| p.file_name().is_some_and(|n| n != PROJECT_MARKER))
            .collect())
    }

    fn walk(&self) -> Result<Vec<PathBuf>> {
        let mut found = Vec::new();
        let mut stack = vec![self.root.clone()];

        while let Some(dir) = stack.pop() {
            for entry in fs::read_dir(&dir)? {
                let entry = entry?;
                let path = entry.path();
                let relative = path.strip_prefix(&self.root).unwrap_or(&path);

                if self.exclude.is_match(relative) {
                    continue;
                }
                if path.is_dir() {
                    stack.push(path);
                } else if self.include.is_match(relative) {
                    found.push(path);
                }
            }
        }

        found.sort();
        Ok(found)
    }
}

impl VcsHandler for ConfigScanner {
    fn tracked_config_files(&self) -> Result<Vec<PathBuf>> {
        let files = self.walk()?;
        debug!(count = files.len(), root = ?self.root, "enumerated config files");
        Ok(files)
    }

    fn repo_fingerprint(&self) -> Result<String> {
        let mut hasher = Hasher::new();

        for path in self.walk()? {
            let relative = path.strip_prefix(&self.root).unwrap_or(&path);
            hasher.update(relative.to_string_lossy().as_bytes());
            let contents = fs::read(&path)
                .with_context(|| format!("reading {} for fingerprint", path.display()))?;
            hasher.update(&contents);
        }

        let fingerprint = hasher.finalize().to_hex().to_string();
        debug!(fingerprint = %fingerprint, "computed repository fingerprint");
        Ok(fingerprint)
    }
}

fn build_globset(patterns: &[&str]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .with_context(|| format!("compiling glob pattern '{pattern}'"))?;
        builder.add(glob);
    }
    Ok(builder
        .build()
        .context("building config file glob set")?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn enumerates_sorted_config_files() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "devdag.toml", "[project]\nname = \"t\"\n");
        write(dir.path(), "web/module.toml", "[module]\nname = \"web\"\n");
        write(dir.path(), "api/module.toml", "[module]\nname = \"api\"\n");
        write(dir.path(), "target/module.toml", "[module]\nname = \"junk\"\n");

        let scanner = ConfigScanner::new(dir.path()).unwrap();
        let files = scanner.tracked_config_files().unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().into_owned())
            .collect();

        assert_eq!(names, vec!["api/module.toml", "devdag.toml", "web/module.toml"]);
    }

    #[test]
    fn fingerprint_tracks_content_changes() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "devdag.toml", "[project]\nname = \"t\"\n");
        write(dir.path(), "api/module.toml", "[module]\nname = \"api\"\n");

        let scanner = ConfigScanner::new(dir.path()).unwrap();
        let before = scanner.repo_fingerprint().unwrap();

        write(dir.path(), "api/module.toml", "[module]\nname = \"api\"\nbuild_deps = []\n");
        let after = scanner.repo_fingerprint().unwrap();

        assert_ne!(before, after);
    }
}
