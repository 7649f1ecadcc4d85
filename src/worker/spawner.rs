//! Worker process spawner.
//!
//! Spawns one child process per stdio backend descriptor with piped stdio
//! and `kill_on_drop(true)` so abandoned processes are cleaned up by the
//! runtime. Stderr is drained by a logging task; workers commonly write
//! startup noise there and blocking the pipe would stall them.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::BackendConfig;
use crate::{AppError, Result};

/// Captured stdio handles for a freshly spawned worker.
#[derive(Debug)]
pub struct WorkerIo {
    /// Child process handle; kept alive so `kill_on_drop` works.
    pub child: Child,
    /// Worker stdin for outbound JSON-RPC lines.
    pub stdin: ChildStdin,
    /// Worker stdout carrying inbound JSON-RPC lines.
    pub stdout: ChildStdout,
    /// Worker stderr, drained by [`spawn_stderr_logger`].
    pub stderr: ChildStderr,
}

/// Spawn the worker process described by `backend` and capture its pipes.
///
/// # Errors
///
/// - [`AppError::Config`] — the descriptor has no `cmd`.
/// - [`AppError::Io`] — the OS spawn failed or a pipe could not be captured.
pub fn spawn_worker(backend: &BackendConfig) -> Result<WorkerIo> {
    let cmd_name = backend.cmd.as_deref().ok_or_else(|| {
        AppError::Config(format!("stdio backend '{}' is missing cmd", backend.id))
    })?;

    info!(
        server_id = %backend.id,
        cmd = cmd_name,
        args = ?backend.args,
        "spawning stdio worker"
    );

    let mut child = Command::new(cmd_name)
        .args(&backend.args)
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|err| AppError::Io(format!("failed to spawn worker '{}': {err}", backend.id)))?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AppError::Io("failed to capture worker stdin".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Io("failed to capture worker stdout".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::Io("failed to capture worker stderr".into()))?;

    Ok(WorkerIo {
        child,
        stdin,
        stdout,
        stderr,
    })
}

/// Spawn a task that logs each worker stderr line at `WARN`.
///
/// The task exits on EOF or when `cancel` fires.
#[must_use]
pub fn spawn_stderr_logger(
    server_id: String,
    stderr: ChildStderr,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => break,

                line = lines.next_line() => {
                    match line {
                        Ok(Some(text)) => {
                            let trimmed = text.trim();
                            if !trimmed.is_empty() {
                                warn!(server_id, stderr = trimmed, "worker stderr");
                            }
                        }
                        Ok(None) => {
                            debug!(server_id, "worker stderr closed");
                            break;
                        }
                        Err(err) => {
                            warn!(server_id, error = %err, "failed to read worker stderr");
                            break;
                        }
                    }
                }
            }
        }
    })
}
