// src/exec/runner.rs

//! Runs a single external command through the execution registry.

use std::fmt;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::CommandConfig;

use super::registry::ExecutionRegistry;

/// How long to keep reading output after the process is gone. Bounded so a
/// grandchild that inherited the pipes cannot stall the caller.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Result of running one command.
///
/// Callers rely on the distinction between `Cancelled` and `Failed` to
/// publish `<INTERRUPTED>` rather than `<FAILED>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Exit status 0.
    Success(String),
    /// The cancellation scope fired before or during execution.
    Cancelled(String),
    /// Launch failure, non-zero exit or death by signal.
    Failed { output: String, reason: String },
}

impl RunOutcome {
    /// Captured (trimmed) combined output.
    pub fn output(&self) -> &str {
        match self {
            RunOutcome::Success(output) | RunOutcome::Cancelled(output) => output,
            RunOutcome::Failed { output, .. } => output,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RunOutcome::Cancelled(_))
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Success(_) => write!(f, "success"),
            RunOutcome::Cancelled(_) => write!(f, "cancelled"),
            RunOutcome::Failed { reason, .. } => write!(f, "failed: {reason}"),
        }
    }
}

/// Executes commands, each registered with the shared [`ExecutionRegistry`]
/// for as long as its process runs.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    registry: Arc<ExecutionRegistry>,
}

impl ProcessRunner {
    pub fn new(registry: Arc<ExecutionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ExecutionRegistry> {
        &self.registry
    }

    /// Run `command` to completion inside a scope derived from `parent`.
    ///
    /// Cancelling `parent` (or draining the registry) kills the process and
    /// yields [`RunOutcome::Cancelled`] with whatever output was captured. A
    /// registry that is already closed refuses the execution, which is also
    /// reported as `Cancelled`.
    pub async fn run(&self, command: &CommandConfig, parent: &CancellationToken) -> RunOutcome {
        let execution = match self.registry.register(parent).await {
            Ok(execution) => execution,
            Err(e) => {
                info!(command = %command.name, error = %e, "command not started");
                return RunOutcome::Cancelled(String::new());
            }
        };

        debug!(
            command = %command.name,
            args = ?command.arguments,
            execution = %execution.id(),
            "starting command"
        );

        let outcome = run_process(command, execution.token()).await;

        match outcome {
            RunOutcome::Success(_) => {
                debug!(command = %command.name, execution = %execution.id(), "command finished")
            }
            RunOutcome::Cancelled(_) => {
                info!(command = %command.name, execution = %execution.id(), "command execution cancelled")
            }
            RunOutcome::Failed { ref reason, .. } => error!(
                command = %command.name,
                execution = %execution.id(),
                error = %reason,
                "command execution failed"
            ),
        }

        outcome
    }
}

async fn run_process(command: &CommandConfig, token: &CancellationToken) -> RunOutcome {
    if token.is_cancelled() {
        return RunOutcome::Cancelled(String::new());
    }

    let mut cmd = Command::new(&command.name);
    cmd.args(&command.arguments)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            return RunOutcome::Failed {
                output: String::new(),
                reason: format!("failed to launch '{}': {e}", command.name),
            };
        }
    };

    // stdout and stderr land in one buffer in arrival order.
    let combined = Arc::new(Mutex::new(Vec::new()));
    let readers = [
        spawn_reader(child.stdout.take(), Arc::clone(&combined)),
        spawn_reader(child.stderr.take(), Arc::clone(&combined)),
    ];

    let status = tokio::select! {
        status = child.wait() => Some(status),
        _ = token.cancelled() => {
            if let Err(e) = child.kill().await {
                warn!(command = %command.name, error = %e, "failed to kill process on cancellation");
            }
            None
        }
    };

    for reader in readers.into_iter().flatten() {
        drain_reader(reader).await;
    }

    let output = {
        let bytes = combined.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).trim().to_string()
    };

    if token.is_cancelled() {
        return RunOutcome::Cancelled(output);
    }

    match status {
        Some(Ok(status)) if status.success() => RunOutcome::Success(output),
        Some(Ok(status)) => RunOutcome::Failed {
            output,
            reason: describe_exit(status),
        },
        Some(Err(e)) => RunOutcome::Failed {
            output,
            reason: format!("waiting for '{}' failed: {e}", command.name),
        },
        None => RunOutcome::Cancelled(output),
    }
}

fn spawn_reader<R>(pipe: Option<R>, sink: Arc<Mutex<Vec<u8>>>) -> Option<JoinHandle<()>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut pipe = pipe?;

    Some(tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        loop {
            match pipe.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => sink
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .extend_from_slice(&buf[..n]),
                Err(e) => {
                    debug!(error = %e, "error reading process output");
                    break;
                }
            }
        }
    }))
}

async fn drain_reader(mut reader: JoinHandle<()>) {
    if tokio::time::timeout(OUTPUT_DRAIN_GRACE, &mut reader).await.is_err() {
        debug!("output pipe still open after process exit; abandoning reader");
        reader.abort();
    }
}

fn describe_exit(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit status {code}"),
        None => "terminated by signal".to_string(),
    }
}
