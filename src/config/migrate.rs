// src/config/migrate.rs

//! One-shot rewrite of legacy configuration files to the current schema.
//!
//! The legacy layout nested everything under a `[project]` / `[module]`
//! wrapper and used the `local-container` provider identifier:
//!
//! ```toml
//! [project]
//! name = "app"
//!
//! [project.environment_defaults]
//! providers = ["local-container"]
//!
//! [project.environment.local]
//! providers = ["kubernetes"]
//! ```
//!
//! The rewriter flattens the wrappers, renames `local-container` to
//! `container`, and hoists `[environment_defaults]` fields into each
//! environment. It operates on `toml::Value` trees and rewrites files in
//! place, so formatting and comments are not preserved; this is a batch
//! migration, not an editor. It is not part of the graph engine.

use std::fs;
use std::path::PathBuf;

use toml::{Table, Value};
use tracing::{debug, info};

use crate::errors::{DevdagError, Result};

pub const LEGACY_PROVIDER: &str = "local-container";
pub const CURRENT_PROVIDER: &str = "container";

#[derive(Debug, Clone)]
pub struct MigrationOutcome {
    pub path: PathBuf,
    pub changed: bool,
}

/// Rewrite the given files in place. With `dry_run` the rewritten
/// documents are printed instead of written.
pub fn migrate_files(paths: &[PathBuf], dry_run: bool) -> Result<Vec<MigrationOutcome>> {
    let mut outcomes = Vec::with_capacity(paths.len());

    for path in paths {
        let contents = fs::read_to_string(path)?;
        let (migrated, changed) = migrate_document(&contents).map_err(|e| {
            DevdagError::ConfigError(format!("migrating {}: {e}", path.display()))
        })?;

        if changed {
            if dry_run {
                println!("--- {}\n{migrated}", path.display());
            } else {
                fs::write(path, &migrated)?;
            }
            info!(path = %path.display(), dry_run, "migrated legacy config");
        } else {
            debug!(path = %path.display(), "already current; skipping");
        }

        outcomes.push(MigrationOutcome {
            path: path.clone(),
            changed,
        });
    }

    Ok(outcomes)
}

/// Pure document rewrite. Returns the (possibly unchanged) document and
/// whether anything was rewritten.
pub fn migrate_document(input: &str) -> Result<(String, bool)> {
    let mut root: Table = toml::from_str(input)?;

    let changed = if root.contains_key("project") {
        migrate_project(&mut root)?
    } else if root.contains_key("module") {
        migrate_module(&mut root)?
    } else {
        false
    };

    if !changed {
        return Ok((input.to_string(), false));
    }

    let output = toml::to_string(&root).map_err(|e| {
        DevdagError::ConfigError(format!("serializing migrated document: {e}"))
    })?;
    Ok((output, true))
}

fn migrate_project(root: &mut Table) -> Result<bool> {
    let mut changed = false;

    // Flatten `[project.environment]`, `[project.provider]` and
    // `[project.environment_defaults]` to top level.
    if let Some(project) = root.get_mut("project").and_then(Value::as_table_mut) {
        let mut hoisted = Vec::new();
        for key in ["environment", "provider", "environment_defaults"] {
            if let Some(value) = project.remove(key) {
                hoisted.push((key, value));
            }
        }
        for (key, value) in hoisted {
            merge_into(root, key, value)?;
            changed = true;
        }
    }

    // Rename the legacy provider identifier wherever it appears.
    changed |= rename_provider_table_keys(root)?;
    changed |= rename_provider_lists(root);

    // Hoist defaulted environment fields into each environment.
    if let Some(defaults_value) = root.remove("environment_defaults") {
        let defaults = defaults_value.as_table().cloned().ok_or_else(|| {
            DevdagError::ConfigError("`environment_defaults` must be a table".to_string())
        })?;
        hoist_environment_defaults(root, &defaults)?;
        changed = true;
    }

    check_duplicate_providers(root)?;

    Ok(changed)
}

fn migrate_module(root: &mut Table) -> Result<bool> {
    let mut changed = false;

    if let Some(module) = root.get_mut("module").and_then(Value::as_table_mut) {
        // Hoist `[module.service.*]` / `[module.task.*]` / `[module.test.*]`.
        let mut hoisted = Vec::new();
        for key in ["service", "task", "test"] {
            if let Some(value) = module.remove(key) {
                hoisted.push((key, value));
            }
        }

        if let Some(module_type) = module.get_mut("type") {
            if module_type.as_str() == Some(LEGACY_PROVIDER) {
                *module_type = Value::String(CURRENT_PROVIDER.to_string());
                changed = true;
            }
        }

        for (key, value) in hoisted {
            merge_into(root, key, value)?;
            changed = true;
        }
    }

    Ok(changed)
}

/// Insert `value` at `root[key]`, merging table contents if both sides are
/// tables. A name collision is a hard error; the migration never silently
/// drops a declaration.
fn merge_into(root: &mut Table, key: &str, value: Value) -> Result<()> {
    match root.get_mut(key) {
        None => {
            root.insert(key.to_string(), value);
            Ok(())
        }
        Some(existing) => {
            let (Some(existing), Value::Table(incoming)) = (existing.as_table_mut(), value)
            else {
                return Err(DevdagError::ConfigError(format!(
                    "cannot merge `{key}`: both the wrapper and the top level define it"
                )));
            };
            for (name, entry) in incoming {
                if existing.insert(name.clone(), entry).is_some() {
                    return Err(DevdagError::ConfigError(format!(
                        "`{key}.{name}` defined both inside the wrapper and at top level"
                    )));
                }
            }
            Ok(())
        }
    }
}

fn rename_provider_table_keys(root: &mut Table) -> Result<bool> {
    let Some(providers) = root.get_mut("provider").and_then(Value::as_table_mut) else {
        return Ok(false);
    };
    let Some(config) = providers.remove(LEGACY_PROVIDER) else {
        return Ok(false);
    };
    if providers
        .insert(CURRENT_PROVIDER.to_string(), config)
        .is_some()
    {
        return Err(DevdagError::ConfigError(format!(
            "both `provider.{LEGACY_PROVIDER}` and `provider.{CURRENT_PROVIDER}` are defined"
        )));
    }
    Ok(true)
}

/// Rename `local-container` inside every `providers = [...]` list,
/// including `environment_defaults` if still present.
fn rename_provider_lists(root: &mut Table) -> bool {
    let mut changed = false;

    let mut rename_in = |table: &mut Table| {
        if let Some(list) = table.get_mut("providers").and_then(Value::as_array_mut) {
            for entry in list {
                if entry.as_str() == Some(LEGACY_PROVIDER) {
                    *entry = Value::String(CURRENT_PROVIDER.to_string());
                    changed = true;
                }
            }
        }
    };

    if let Some(environments) = root.get_mut("environment").and_then(Value::as_table_mut) {
        for (_, env) in environments.iter_mut() {
            if let Some(env) = env.as_table_mut() {
                rename_in(env);
            }
        }
    }
    if let Some(defaults) = root
        .get_mut("environment_defaults")
        .and_then(Value::as_table_mut)
    {
        rename_in(defaults);
    }

    changed
}

fn hoist_environment_defaults(root: &mut Table, defaults: &Table) -> Result<()> {
    let Some(environments) = root.get_mut("environment").and_then(Value::as_table_mut) else {
        return Err(DevdagError::ConfigError(
            "`environment_defaults` is set but no environments are defined".to_string(),
        ));
    };

    for (env_name, env_value) in environments.iter_mut() {
        let Some(env) = env_value.as_table_mut() else {
            continue;
        };

        // Provider lists are concatenated: environment first, defaults after.
        if let Some(default_providers) = defaults.get("providers").and_then(Value::as_array) {
            let list = env
                .entry("providers")
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Some(list) = list.as_array_mut() {
                list.extend(default_providers.iter().cloned());
            }
        }

        // A varfile can come from exactly one place.
        if let Some(default_varfile) = defaults.get("varfile") {
            if env.contains_key("varfile") {
                return Err(DevdagError::ConfigError(format!(
                    "environment '{env_name}' and environment_defaults both set `varfile`"
                )));
            }
            env.insert("varfile".to_string(), default_varfile.clone());
        }

        // Variables merge; the environment's own entries win.
        if let Some(default_vars) = defaults.get("variables").and_then(Value::as_table) {
            let vars = env
                .entry("variables")
                .or_insert_with(|| Value::Table(Table::new()));
            if let Some(vars) = vars.as_table_mut() {
                for (name, value) in default_vars {
                    vars.entry(name.clone()).or_insert_with(|| value.clone());
                }
            }
        }
    }

    Ok(())
}

/// A duplicate provider name after the merge makes provider resolution
/// ambiguous, so it fails the migration rather than passing through.
fn check_duplicate_providers(root: &Table) -> Result<()> {
    let Some(environments) = root.get("environment").and_then(Value::as_table) else {
        return Ok(());
    };

    for (env_name, env) in environments {
        let Some(list) = env.get("providers").and_then(Value::as_array) else {
            continue;
        };
        let mut seen = Vec::new();
        for entry in list.iter().filter_map(Value::as_str) {
            if seen.contains(&entry) {
                return Err(DevdagError::ConfigError(format!(
                    "duplicate provider '{entry}' in environment '{env_name}' after merging environment_defaults"
                )));
            }
            seen.push(entry);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattens_project_wrapper_and_renames_provider() {
        let legacy = r#"
[project]
name = "app"

[project.environment.local]
providers = ["local-container"]

[project.provider.local-container]
registry = "localhost:5000"
"#;
        let (migrated, changed) = migrate_document(legacy).unwrap();
        assert!(changed);

        let table: Table = toml::from_str(&migrated).unwrap();
        let env = &table["environment"]["local"];
        assert_eq!(
            env["providers"].as_array().unwrap()[0].as_str(),
            Some("container")
        );
        assert!(table["provider"].as_table().unwrap().contains_key("container"));
        assert!(table["project"].as_table().unwrap().contains_key("name"));
        assert!(!table["project"].as_table().unwrap().contains_key("environment"));
    }

    #[test]
    fn hoists_environment_defaults() {
        let legacy = r#"
[project]
name = "app"

[project.environment_defaults]
providers = ["local-container"]
varfile = "defaults.env"

[project.environment_defaults.variables]
LOG = "debug"

[project.environment.local]
providers = ["kubernetes"]

[project.environment.local.variables]
LOG = "info"
"#;
        let (migrated, changed) = migrate_document(legacy).unwrap();
        assert!(changed);

        let table: Table = toml::from_str(&migrated).unwrap();
        let env = table["environment"]["local"].as_table().unwrap();
        let providers: Vec<&str> = env["providers"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(providers, vec!["kubernetes", "container"]);
        assert_eq!(env["varfile"].as_str(), Some("defaults.env"));
        // The environment's own variable wins.
        assert_eq!(env["variables"]["LOG"].as_str(), Some("info"));
        assert!(!table.contains_key("environment_defaults"));
    }

    #[test]
    fn varfile_conflict_is_a_hard_error() {
        let legacy = r#"
[project]
name = "app"

[project.environment_defaults]
varfile = "defaults.env"

[project.environment.local]
varfile = "local.env"
"#;
        let err = migrate_document(legacy).unwrap_err();
        assert!(err.to_string().contains("varfile"));
    }

    #[test]
    fn duplicate_provider_after_merge_is_a_hard_error() {
        let legacy = r#"
[project]
name = "app"

[project.environment_defaults]
providers = ["container"]

[project.environment.local]
providers = ["container"]
"#;
        let err = migrate_document(legacy).unwrap_err();
        assert!(err.to_string().contains("duplicate provider"));
    }

    #[test]
    fn hoists_module_wrapper_tables() {
        let legacy = r#"
[module]
name = "api"
type = "local-container"

[module.service.api]
cmd = "run api"
deps = ["api-migrate"]

[module.task.api-migrate]
cmd = "migrate"
"#;
        let (migrated, changed) = migrate_document(legacy).unwrap();
        assert!(changed);

        let table: Table = toml::from_str(&migrated).unwrap();
        assert_eq!(table["module"]["type"].as_str(), Some("container"));
        assert!(table["service"].as_table().unwrap().contains_key("api"));
        assert!(table["task"].as_table().unwrap().contains_key("api-migrate"));
        assert!(!table["module"].as_table().unwrap().contains_key("service"));
    }

    #[test]
    fn current_schema_passes_through_unchanged() {
        let current = r#"
[project]
name = "app"

[environment.local]
providers = ["container"]
"#;
        let (migrated, changed) = migrate_document(current).unwrap();
        assert!(!changed);
        assert_eq!(migrated, current);
    }
}
