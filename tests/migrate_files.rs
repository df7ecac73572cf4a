// tests/migrate_files.rs

use std::fs;

use devdag::config::migrate::migrate_files;

const LEGACY_MODULE: &str = r#"
[module]
name = "api"
type = "local-container"

[module.service.api]
cmd = "run api"
"#;

#[test]
fn migrate_rewrites_legacy_files_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("module.toml");
    fs::write(&path, LEGACY_MODULE).unwrap();

    let outcomes = migrate_files(&[path.clone()], false).unwrap();
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].changed);

    let rewritten = fs::read_to_string(&path).unwrap();
    let table: toml::Table = toml::from_str(&rewritten).unwrap();
    assert_eq!(table["module"]["type"].as_str(), Some("container"));
    assert!(table["service"].as_table().unwrap().contains_key("api"));

    // The rewritten file loads under the current schema.
    let file = devdag::config::loader::load_module_file(&path).unwrap();
    assert_eq!(file.module.name, "api");
    assert!(file.service.contains_key("api"));
}

#[test]
fn dry_run_leaves_files_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("module.toml");
    fs::write(&path, LEGACY_MODULE).unwrap();

    let outcomes = migrate_files(&[path.clone()], true).unwrap();
    assert!(outcomes[0].changed);

    assert_eq!(fs::read_to_string(&path).unwrap(), LEGACY_MODULE);
}

#[test]
fn current_files_are_reported_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("module.toml");
    fs::write(&path, "[module]\nname = \"api\"\n").unwrap();

    let outcomes = migrate_files(&[path], false).unwrap();
    assert!(!outcomes[0].changed);
}
