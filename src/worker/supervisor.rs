//! Worker supervisor — explicit registry of live worker processes.
//!
//! Ensures at most one live worker per backend id. The registry is owned by
//! [`WorkerSupervisor`] and reached only through its operations; there are
//! no module-global process tables.
//!
//! Lifecycle state machine per worker:
//!
//! ```text
//! stopped → starting → ready → { stopped | error }
//! ```
//!
//! No transition skips `starting`. A worker that exits — cleanly or not —
//! has every in-flight request on its channel rejected with
//! [`AppError::ProcessExited`] and is dropped from the registry, so the
//! next `acquire` spawns a fresh process.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::process::Child;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{BackendConfig, HostConfig, RpcConfig, TransportKind};
use crate::rpc::RpcChannel;
use crate::worker::discovery::{self, ListVariant};
use crate::worker::retry::RetryPolicy;
use crate::worker::{handshake, spawner};
use crate::{AppError, Result};

/// Lifecycle status of one worker process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    /// No live process.
    Stopped,
    /// Process spawned, handshake not yet complete.
    Starting,
    /// Handshake complete; accepting calls.
    Ready,
    /// Initialization failed; worker is being torn down.
    Error,
}

impl WorkerStatus {
    /// Lowercase status label for logs and inventory listings.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Error => "error",
        }
    }
}

/// One backend's descriptor annotated with its live status.
#[derive(Debug, Clone)]
pub struct BackendStatus {
    /// Backend id.
    pub id: String,
    /// Display label.
    pub label: String,
    /// Declared transport.
    pub transport: TransportKind,
    /// Current lifecycle status; `Stopped` when no worker is live.
    pub status: WorkerStatus,
}

/// Handle to one live worker: its channel, status, and task cancellation.
#[derive(Debug)]
pub struct WorkerHandle {
    backend: BackendConfig,
    channel: Arc<RpcChannel>,
    status: Mutex<WorkerStatus>,
    init_lock: Mutex<()>,
    last_list_variant: Mutex<Option<ListVariant>>,
    cancel: CancellationToken,
}

impl WorkerHandle {
    fn new(backend: BackendConfig, channel: Arc<RpcChannel>, cancel: CancellationToken) -> Self {
        Self {
            backend,
            channel,
            status: Mutex::new(WorkerStatus::Starting),
            init_lock: Mutex::new(()),
            last_list_variant: Mutex::new(None),
            cancel,
        }
    }

    /// Backend descriptor this worker was spawned from.
    #[must_use]
    pub fn backend(&self) -> &BackendConfig {
        &self.backend
    }

    /// RPC channel to this worker.
    #[must_use]
    pub fn channel(&self) -> &RpcChannel {
        &self.channel
    }

    /// Current lifecycle status.
    pub async fn status(&self) -> WorkerStatus {
        *self.status.lock().await
    }

    /// The `tools/list` variant that last settled discovery, if any.
    pub async fn last_list_variant(&self) -> Option<ListVariant> {
        *self.last_list_variant.lock().await
    }

    async fn record_list_variant(&self, variant: ListVariant) {
        *self.last_list_variant.lock().await = Some(variant);
    }

    async fn set_status(&self, status: WorkerStatus) {
        *self.status.lock().await = status;
    }

    fn cancel_tasks(&self) {
        self.cancel.cancel();
    }

    /// Run the initialization handshake unless the worker is already ready.
    ///
    /// Serialized behind an init lock: concurrent callers racing a boot all
    /// wait for the single handshake to finish. Callers never check
    /// readiness themselves.
    ///
    /// # Errors
    ///
    /// - [`AppError::ProcessExited`] — the process died before or during
    ///   the handshake.
    /// - Any `initialize` failure; the status moves to `Error` and the
    ///   supervisor tears the worker down.
    pub async fn ensure_ready(&self, rpc: &RpcConfig) -> Result<()> {
        let _guard = self.init_lock.lock().await;

        match self.status().await {
            WorkerStatus::Ready => return Ok(()),
            WorkerStatus::Stopped => return Err(AppError::ProcessExited(None)),
            WorkerStatus::Error => {
                return Err(AppError::Rpc(format!(
                    "worker '{}' failed initialization",
                    self.backend.id
                )));
            }
            WorkerStatus::Starting => {}
        }

        match handshake::initialize_worker(&self.channel, rpc).await {
            Ok(()) => {
                self.set_status(WorkerStatus::Ready).await;
                info!(server_id = %self.backend.id, "worker ready");
                Ok(())
            }
            Err(err) => {
                self.set_status(WorkerStatus::Error).await;
                warn!(server_id = %self.backend.id, error = %err, "worker initialization failed");
                Err(err)
            }
        }
    }
}

type WorkerTable = Arc<Mutex<HashMap<String, Arc<WorkerHandle>>>>;

/// Registry of live workers, one per backend id.
#[derive(Debug)]
pub struct WorkerSupervisor {
    config: Arc<HostConfig>,
    workers: WorkerTable,
    cancel: CancellationToken,
}

impl WorkerSupervisor {
    /// Create a supervisor over the configured backend list.
    #[must_use]
    pub fn new(config: Arc<HostConfig>) -> Self {
        Self {
            config,
            workers: Arc::new(Mutex::new(HashMap::new())),
            cancel: CancellationToken::new(),
        }
    }

    /// Return the live worker for `id`, spawning and initializing one if
    /// absent.
    ///
    /// # Errors
    ///
    /// - [`AppError::Config`] — no descriptor exists for `id`.
    /// - [`AppError::TransportUnsupported`] — the descriptor is not stdio.
    /// - Spawn or initialization failures; a failed boot is torn down so
    ///   the next `acquire` starts fresh.
    pub async fn acquire(&self, id: &str) -> Result<Arc<WorkerHandle>> {
        let backend = self
            .config
            .backend(id)
            .ok_or_else(|| AppError::Config(format!("no backend configured for id '{id}'")))?;

        if backend.transport != TransportKind::Stdio {
            return Err(AppError::TransportUnsupported(format!(
                "backend '{id}' is not a stdio transport"
            )));
        }

        let handle = {
            let mut table = self.workers.lock().await;
            if let Some(existing) = table.get(id) {
                Arc::clone(existing)
            } else {
                let fresh = self.boot(backend)?;
                table.insert(id.to_owned(), Arc::clone(&fresh));
                fresh
            }
        };

        if let Err(err) = handle.ensure_ready(&self.config.rpc).await {
            self.evict(id, &handle).await;
            handle.cancel_tasks();
            return Err(err);
        }

        Ok(handle)
    }

    /// List a backend's tools through the discovery fallback chain,
    /// acquiring and initializing the worker as needed.
    ///
    /// # Errors
    ///
    /// Acquisition failures, or the last variant's error once the chain is
    /// exhausted.
    pub async fn list_tools(&self, id: &str) -> Result<Value> {
        let handle = self.acquire(id).await?;
        let policy = RetryPolicy::from_config(&self.config.rpc);

        match discovery::list_tools(handle.channel(), &policy).await {
            Ok((tools, variant)) => {
                handle.record_list_variant(variant).await;
                Ok(tools)
            }
            Err(err) => {
                // The chain ran to its end; record the last shape tried.
                handle.record_list_variant(ListVariant::EmptyCursor).await;
                Err(err)
            }
        }
    }

    /// Invoke a tool on a backend, acquiring and initializing the worker as
    /// needed.
    ///
    /// # Errors
    ///
    /// Acquisition failures, or the final RPC failure after retries.
    pub async fn call_tool(&self, id: &str, name: &str, arguments: Value) -> Result<Value> {
        let handle = self.acquire(id).await?;
        let policy = RetryPolicy::from_config(&self.config.rpc);
        discovery::call_tool(handle.channel(), name, arguments, &policy).await
    }

    /// The full backend inventory annotated with live statuses.
    pub async fn inventory(&self) -> Vec<BackendStatus> {
        let table = self.workers.lock().await;
        let mut out = Vec::with_capacity(self.config.backends.len());

        for backend in &self.config.backends {
            let status = match table.get(&backend.id) {
                Some(handle) => handle.status().await,
                None => WorkerStatus::Stopped,
            };
            out.push(BackendStatus {
                id: backend.id.clone(),
                label: backend.label().to_owned(),
                transport: backend.transport,
                status,
            });
        }

        out
    }

    /// Kill every live worker and clear the registry.
    pub async fn shutdown(&self) {
        info!("worker supervisor shutting down");
        self.cancel.cancel();
        self.workers.lock().await.clear();
    }

    /// Spawn a worker process and wire its channel and monitor tasks.
    fn boot(&self, backend: &BackendConfig) -> Result<Arc<WorkerHandle>> {
        let io = spawner::spawn_worker(backend)?;
        let cancel = self.cancel.child_token();

        let channel = RpcChannel::spawn(
            backend.id.clone(),
            io.stdout,
            io.stdin,
            self.config.rpc.request_timeout(),
            &cancel,
        );
        let _stderr_task = spawner::spawn_stderr_logger(backend.id.clone(), io.stderr, cancel.clone());

        let handle = Arc::new(WorkerHandle::new(
            backend.clone(),
            channel,
            cancel.clone(),
        ));

        let _monitor = spawn_exit_monitor(
            backend.id.clone(),
            io.child,
            Arc::clone(&handle),
            Arc::clone(&self.workers),
            cancel,
        );

        Ok(handle)
    }

    /// Remove `handle` from the registry if it is still the live entry.
    async fn evict(&self, id: &str, handle: &Arc<WorkerHandle>) {
        let mut table = self.workers.lock().await;
        if table.get(id).is_some_and(|live| Arc::ptr_eq(live, handle)) {
            table.remove(id);
        }
    }
}

/// Spawn a task that awaits child exit, rejects every in-flight request on
/// the worker's channel with [`AppError::ProcessExited`], and drops the
/// worker from the registry so the next `acquire` respawns.
///
/// On cancellation (supervisor shutdown) the child is killed instead and no
/// rejection is emitted.
fn spawn_exit_monitor(
    server_id: String,
    mut child: Child,
    handle: Arc<WorkerHandle>,
    workers: WorkerTable,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                if let Err(err) = child.kill().await {
                    warn!(server_id, error = %err, "failed to kill worker during shutdown");
                }
            }

            status = child.wait() => {
                let code = match status {
                    Ok(exit) => exit.code(),
                    Err(err) => {
                        warn!(server_id, error = %err, "error waiting for worker process");
                        None
                    }
                };

                info!(server_id, ?code, "worker process exited");

                handle.set_status(WorkerStatus::Stopped).await;
                handle.channel().fail_all(&AppError::ProcessExited(code)).await;
                workers.lock().await.remove(&server_id);
                handle.cancel_tasks();
            }
        }
    })
}
