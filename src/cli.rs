// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::exec::DEFAULT_CONCURRENCY;

/// Command-line arguments for `devdag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "devdag",
    version,
    about = "Build, deploy and test project modules against their dependency graph.",
    long_about = None
)]
pub struct CliArgs {
    /// Directory to start project-root discovery from.
    ///
    /// Default: the current working directory.
    #[arg(long, value_name = "PATH")]
    pub root: Option<PathBuf>,

    /// Maximum number of operations processing at the same time.
    #[arg(long, value_name = "N", default_value_t = DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `DEVDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Build modules (all modules when none are named).
    Build {
        modules: Vec<String>,
    },

    /// Deploy services (all services when none are named).
    Deploy {
        services: Vec<String>,
    },

    /// Run tests (all tests when none are named).
    Test {
        tests: Vec<String>,
    },

    /// Run a task to completion.
    RunTask {
        task: String,
    },

    /// Resolve and print the configuration graph without executing.
    Validate,

    /// Rewrite legacy configuration files to the current schema.
    Migrate {
        /// Files to rewrite. Defaults to every tracked config file.
        paths: Vec<PathBuf>,

        /// Print the rewritten files instead of writing them.
        #[arg(long)]
        dry_run: bool,
    },
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
