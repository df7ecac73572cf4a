// src/lib.rs

pub mod actions;
pub mod cli;
pub mod config;
pub mod errors;
pub mod events;
pub mod exec;
pub mod graph;
pub mod logging;
pub mod project;
pub mod telemetry;
pub mod types;
pub mod vcs;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::actions::{ActionFactory, ShellRunner};
use crate::cli::{CliArgs, Command};
use crate::config::model::ProjectFile;
use crate::config::{loader, migrate, validate};
use crate::errors::Result;
use crate::events::{EventBus, StatusReporter};
use crate::exec::{GraphNode, NodeOutcome, TaskGraph};
use crate::graph::{ConfigGraph, EntityKind, VersionResolver};
use crate::project::PROJECT_MARKER;
use crate::telemetry::Telemetry;
use crate::types::ActionKind;
use crate::vcs::{ConfigScanner, VcsHandler};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - project-root discovery and config scanning
/// - declaration loading, validation and graph construction
/// - event bus, status reporter and telemetry
/// - the action factory and the task graph
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let start = match &args.root {
        Some(root) => root.clone(),
        None => std::env::current_dir()?,
    };
    let root = project::find_project_root(&start)?;
    let scanner = ConfigScanner::new(root.clone())?;

    match &args.command {
        Command::Migrate { paths, dry_run } => run_migrate(&scanner, paths, *dry_run),
        Command::Validate => run_validate(&root, &scanner),
        Command::Build { modules } => {
            run_batch(&args, &root, &scanner, ActionKind::Build, modules).await
        }
        Command::Deploy { services } => {
            run_batch(&args, &root, &scanner, ActionKind::Deploy, services).await
        }
        Command::Test { tests } => {
            run_batch(&args, &root, &scanner, ActionKind::RunTest, tests).await
        }
        Command::RunTask { task } => {
            run_batch(
                &args,
                &root,
                &scanner,
                ActionKind::RunTask,
                std::slice::from_ref(task),
            )
            .await
        }
    }
}

fn run_migrate(scanner: &ConfigScanner, paths: &[PathBuf], dry_run: bool) -> Result<()> {
    let paths = if paths.is_empty() {
        scanner.tracked_config_files()?
    } else {
        paths.to_vec()
    };

    let outcomes = migrate::migrate_files(&paths, dry_run)?;
    let changed = outcomes.iter().filter(|o| o.changed).count();
    println!("migrated {changed} of {} config files", outcomes.len());
    Ok(())
}

fn run_validate(root: &Path, scanner: &ConfigScanner) -> Result<()> {
    let (project, graph, _declarations) = resolve_graph(root, scanner)?;
    print_graph(&project, &graph);
    Ok(())
}

async fn run_batch(
    args: &CliArgs,
    root: &Path,
    scanner: &ConfigScanner,
    action: ActionKind,
    names: &[String],
) -> Result<()> {
    let (project, graph, declarations) = resolve_graph(root, scanner)?;
    let graph = Arc::new(graph);

    let fingerprint = scanner.repo_fingerprint()?;
    let versions = VersionResolver::resolve(&graph, &declarations, &fingerprint)?;

    let bus = EventBus::new();
    let _reporter = StatusReporter::attach(&bus);
    let telemetry = Telemetry::attach(&bus, &project.project.name);

    let task_graph = TaskGraph::new(args.concurrency, bus.clone());
    let runner = Arc::new(ShellRunner::new(root.to_path_buf()));
    let factory = ActionFactory::new(Arc::clone(&graph), &declarations, versions, runner);

    // Ctrl-C → cooperative cancellation of the run.
    {
        let cancel = task_graph.cancel_handle();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let roots: Vec<Arc<dyn GraphNode>> = if names.is_empty() {
        factory.request_all(action)?
    } else {
        names
            .iter()
            .map(|name| factory.request(action, name))
            .collect::<Result<_>>()?
    };

    let batch_id = format!("{}-{}", action.as_str(), std::process::id());
    let results = task_graph.process(batch_id, roots, &factory).await?;

    bus.flush().await;
    telemetry.flush();
    telemetry.shutdown(&bus);

    summarize(&results);

    let failed = results
        .roots()
        .filter(|(_, outcome)| !outcome.is_complete())
        .count();
    if failed > 0 {
        let total = results.roots().count();
        return Err(anyhow::anyhow!("{failed} of {total} requests did not complete").into());
    }
    Ok(())
}

fn resolve_graph(
    root: &Path,
    scanner: &ConfigScanner,
) -> Result<(ProjectFile, ConfigGraph, Vec<config::ModuleDeclaration>)> {
    let project = loader::load_project(root.join(PROJECT_MARKER))?;
    let module_files = scanner.module_files()?;
    let declarations = loader::load_modules(&module_files)?;
    validate::validate_declarations(&declarations)?;
    let graph = ConfigGraph::build(&declarations)?;

    info!(
        project = %project.project.name,
        modules = declarations.len(),
        "configuration resolved"
    );
    Ok((project, graph, declarations))
}

/// Plain-text graph dump for `devdag validate`.
fn print_graph(project: &ProjectFile, graph: &ConfigGraph) {
    println!("project '{}'", project.project.name);

    for module in graph.entities(Some(EntityKind::Module)) {
        println!("  module {}", module.name);
        if !module.deps.is_empty() {
            let deps: Vec<&str> = module.deps.iter().map(|d| d.name.as_str()).collect();
            println!("    build_deps: {deps:?}");
        }
        for entity in graph.entities(None) {
            if entity.module_name == module.name
                && entity.kind != EntityKind::Module
                && entity.kind != EntityKind::Build
            {
                let deps: Vec<String> = entity.deps.iter().map(|d| d.to_string()).collect();
                if deps.is_empty() {
                    println!("    {} {}", entity.kind, entity.name);
                } else {
                    println!("    {} {} (deps: {})", entity.kind, entity.name, deps.join(", "));
                }
            }
        }
    }

    println!("processing order:");
    for (i, batch) in graph.processing_batches().iter().enumerate() {
        let names: Vec<String> = batch.iter().map(|e| e.entity_ref().to_string()).collect();
        println!("  {}: {}", i + 1, names.join(", "));
    }
}

fn summarize(results: &exec::BatchResults) {
    println!("batch {}:", results.batch_id);
    for (key, outcome) in results.roots() {
        match outcome {
            NodeOutcome::Complete(result) if result.cached => {
                println!("  complete  {key} (cached)")
            }
            NodeOutcome::Complete(_) => println!("  complete  {key}"),
            NodeOutcome::Error(err) => println!("  error     {key}: {err}"),
            NodeOutcome::Aborted(reason) => println!("  aborted   {key}: {reason}"),
        }
    }
}
