// src/actions/runner.rs

//! Pluggable command execution.
//!
//! Action bodies drive an opaque command descriptor through a
//! [`CommandRunner`]. Production uses [`ShellRunner`] (a shell child
//! process per command); tests substitute a fake that never spawns
//! processes.

use std::collections::VecDeque;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, info};

/// How many trailing stdout lines are kept as the result summary.
const TAIL_LINES: usize = 20;

/// An opaque command descriptor attached to an action.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Work-item key, for logging.
    pub label: String,
    pub cmd: String,
}

/// What a command produced.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    /// Last stdout lines, newline-joined.
    pub tail: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Trait abstracting how action commands are executed.
pub trait CommandRunner: Send + Sync {
    /// Run the command to completion, observing `cancel` cooperatively.
    ///
    /// A non-zero exit is an `Ok` outcome here; mapping it to an action
    /// failure is the caller's decision. `Err` means the command could not
    /// be run or was stopped by cancellation.
    fn run(
        &self,
        spec: CommandSpec,
        cancel: watch::Receiver<bool>,
    ) -> Pin<Box<dyn Future<Output = Result<CommandOutput>> + Send + '_>>;
}

/// Real runner: executes the descriptor through the platform shell.
pub struct ShellRunner {
    cwd: PathBuf,
}

impl ShellRunner {
    pub fn new(cwd: PathBuf) -> Self {
        Self { cwd }
    }
}

impl CommandRunner for ShellRunner {
    fn run(
        &self,
        spec: CommandSpec,
        mut cancel: watch::Receiver<bool>,
    ) -> Pin<Box<dyn Future<Output = Result<CommandOutput>> + Send + '_>> {
        let cwd = self.cwd.clone();

        Box::pin(async move {
            info!(label = %spec.label, cmd = %spec.cmd, "starting command");

            let mut cmd = if cfg!(windows) {
                let mut c = Command::new("cmd");
                c.arg("/C").arg(&spec.cmd);
                c
            } else {
                let mut c = Command::new("sh");
                c.arg("-c").arg(&spec.cmd);
                c
            };

            cmd.current_dir(&cwd)
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);

            let mut child = cmd
                .spawn()
                .with_context(|| format!("spawning command for '{}'", spec.label))?;

            let stdout = child.stdout.take();
            let tail_task = tokio::spawn(collect_tail(stdout));

            // Always consume stderr so buffers don't fill; log at debug.
            if let Some(stderr) = child.stderr.take() {
                let label = spec.label.clone();
                tokio::spawn(async move {
                    let mut lines = BufReader::new(stderr).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        debug!(label = %label, "stderr: {line}");
                    }
                });
            }

            tokio::select! {
                status_res = child.wait() => {
                    let status = status_res
                        .with_context(|| format!("waiting for command of '{}'", spec.label))?;
                    let exit_code = status.code().unwrap_or(-1);
                    let tail = tail_task.await.unwrap_or_default();

                    info!(
                        label = %spec.label,
                        exit_code,
                        success = status.success(),
                        "command exited"
                    );

                    Ok(CommandOutput { exit_code, tail })
                }
                _ = cancelled(&mut cancel) => {
                    info!(label = %spec.label, "cancellation requested; killing command");
                    let _ = child.kill().await;
                    anyhow::bail!("command for '{}' cancelled", spec.label)
                }
            }
        })
    }
}

/// Resolves once the cancel flag flips to `true`; never resolves if the
/// sender goes away without cancelling.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

async fn collect_tail(stdout: Option<tokio::process::ChildStdout>) -> String {
    let Some(stdout) = stdout else {
        return String::new();
    };

    let mut lines = BufReader::new(stdout).lines();
    let mut tail: VecDeque<String> = VecDeque::with_capacity(TAIL_LINES);

    while let Ok(Some(line)) = lines.next_line().await {
        if tail.len() == TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }

    tail.into_iter().collect::<Vec<_>>().join("\n")
}
