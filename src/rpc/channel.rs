//! Request/response correlation over one worker's stdio streams.
//!
//! An [`RpcChannel`] owns the pending-request table for a single worker:
//! every outbound request registers a oneshot continuation keyed by a
//! channel-scoped monotonically increasing id, and the reader task settles
//! it exactly once — with the matching response, a timeout, or a
//! process-exit rejection. Late responses for already-settled ids are
//! discarded.
//!
//! Reader and writer tasks are generic over [`AsyncRead`] / [`AsyncWrite`]
//! so tests can drive a channel over in-memory duplex pipes instead of a
//! real child process.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::rpc::codec::RpcCodec;
use crate::rpc::message::{render_error, RpcNotification, RpcRequest};
use crate::{AppError, Result};

/// Outbound queue depth before senders apply backpressure.
const OUTBOUND_QUEUE: usize = 64;

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value>>>>>;

/// JSON-RPC channel over one worker's stdio streams.
#[derive(Debug)]
pub struct RpcChannel {
    server_id: String,
    next_id: AtomicU64,
    pending: PendingMap,
    outbound: mpsc::Sender<Value>,
    request_timeout: Duration,
}

impl RpcChannel {
    /// Wire a channel over `reader` (worker stdout) and `writer` (worker
    /// stdin), spawning its reader and writer tasks.
    ///
    /// Both tasks exit on EOF, unrecoverable I/O error, or when `cancel`
    /// fires. Dropping the returned channel closes the outbound queue, which
    /// stops the writer.
    pub fn spawn<R, W>(
        server_id: impl Into<String>,
        reader: R,
        writer: W,
        request_timeout: Duration,
        cancel: &CancellationToken,
    ) -> Arc<Self>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let server_id = server_id.into();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE);

        tokio::spawn(run_reader(
            server_id.clone(),
            reader,
            Arc::clone(&pending),
            cancel.clone(),
        ));
        tokio::spawn(run_writer(
            server_id.clone(),
            writer,
            outbound_rx,
            cancel.clone(),
        ));

        Arc::new(Self {
            server_id,
            next_id: AtomicU64::new(1),
            pending,
            outbound: outbound_tx,
            request_timeout,
        })
    }

    /// Backend id this channel belongs to.
    #[must_use]
    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    /// Number of requests currently awaiting settlement.
    pub async fn outstanding(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Send a request and await its settlement.
    ///
    /// Allocates the next channel-scoped id, writes one newline-terminated
    /// frame, and suspends until the matching response arrives or the
    /// configured timeout elapses. On timeout the pending entry is removed,
    /// so a response arriving afterwards is discarded rather than
    /// double-settling.
    ///
    /// # Errors
    ///
    /// - [`AppError::RpcTimeout`] — no response within the timeout window.
    /// - [`AppError::Rpc`] — the worker returned a JSON-RPC error payload.
    /// - [`AppError::ProcessExited`] — the channel was torn down while the
    ///   call was in flight.
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let frame = match serde_json::to_value(RpcRequest::new(id, method, params)) {
            Ok(frame) => frame,
            Err(err) => {
                self.pending.lock().await.remove(&id);
                return Err(AppError::Rpc(format!(
                    "failed to serialize request '{method}': {err}"
                )));
            }
        };

        if self.outbound.send(frame).await.is_err() {
            self.pending.lock().await.remove(&id);
            return Err(AppError::ProcessExited(None));
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_closed)) => Err(AppError::ProcessExited(None)),
            Err(_elapsed) => {
                self.pending.lock().await.remove(&id);
                debug!(
                    server_id = %self.server_id,
                    method,
                    id,
                    "request timed out; late responses for this id will be discarded"
                );
                Err(AppError::RpcTimeout(format!(
                    "{method} received no response within {:?}",
                    self.request_timeout
                )))
            }
        }
    }

    /// Send a fire-and-forget notification; failures are swallowed.
    pub async fn notify(&self, method: &str, params: Option<Value>) {
        let Ok(frame) = serde_json::to_value(RpcNotification::new(method, params)) else {
            return;
        };
        if self.outbound.send(frame).await.is_err() {
            debug!(
                server_id = %self.server_id,
                method,
                "notify dropped: outbound queue closed"
            );
        }
    }

    /// Reject every outstanding request with a clone of `err`.
    ///
    /// Each pending entry is settled exactly once; entries already settled
    /// or timed out are unaffected.
    pub async fn fail_all(&self, err: &AppError) {
        let mut pending = self.pending.lock().await;
        let count = pending.len();
        for (_, tx) in pending.drain() {
            let _ = tx.send(Err(err.clone()));
        }
        if count > 0 {
            warn!(
                server_id = %self.server_id,
                rejected = count,
                error = %err,
                "rejected all in-flight requests"
            );
        }
    }
}

// ── Reader task ───────────────────────────────────────────────────────────────

/// Read newline-delimited frames from the worker's stdout and settle
/// pending requests. Malformed lines are logged and skipped; they never
/// terminate the reader.
async fn run_reader<R>(server_id: String, reader: R, pending: PendingMap, cancel: CancellationToken)
where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(reader, RpcCodec::new());

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(server_id, "rpc reader: cancellation received, stopping");
                break;
            }

            item = framed.next() => {
                match item {
                    None => {
                        debug!(server_id, "rpc reader: EOF on worker stdout");
                        break;
                    }
                    Some(Err(AppError::Rpc(ref msg))) => {
                        // Framing-level error (line too long) — skip the line.
                        warn!(server_id, error = msg.as_str(), "rpc reader: framing error, skipping");
                    }
                    Some(Err(e)) => {
                        warn!(server_id, error = %e, "rpc reader: IO error, stopping");
                        break;
                    }
                    Some(Ok(line)) => {
                        settle_line(&server_id, &line, &pending).await;
                    }
                }
            }
        }
    }
}

/// Parse one inbound line and settle the matching pending request, if any.
///
/// Non-JSON lines are logged and discarded. Frames without an id are worker
/// notifications and are skipped. A frame with an `error` payload rejects
/// the call; `result` resolves it; a frame with neither resolves with the
/// whole frame.
async fn settle_line(server_id: &str, line: &str, pending: &PendingMap) {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return;
    }

    let value: Value = match serde_json::from_str(trimmed) {
        Ok(value) => value,
        Err(err) => {
            warn!(server_id, error = %err, raw = trimmed, "rpc reader: non-json line, discarding");
            return;
        }
    };

    let Some(id) = value.get("id").and_then(Value::as_u64) else {
        debug!(
            server_id,
            method = value.get("method").and_then(serde_json::Value::as_str).unwrap_or(""),
            "rpc reader: frame without id, skipping"
        );
        return;
    };

    let Some(tx) = pending.lock().await.remove(&id) else {
        debug!(server_id, id, "rpc reader: late or unknown response id, discarding");
        return;
    };

    let outcome = if let Some(error) = value.get("error") {
        Err(AppError::Rpc(render_error(error)))
    } else if let Some(result) = value.get("result") {
        Ok(result.clone())
    } else {
        // No result and no error: settle with the whole frame.
        Ok(value)
    };

    let _ = tx.send(outcome);
}

// ── Writer task ───────────────────────────────────────────────────────────────

/// Serialize outbound frames to compact single-line JSON and write each as
/// a `\n`-terminated line to the worker's stdin.
async fn run_writer<W>(
    server_id: String,
    writer: W,
    mut outbound: mpsc::Receiver<Value>,
    cancel: CancellationToken,
) where
    W: AsyncWrite + Unpin + Send,
{
    let mut framed = FramedWrite::new(writer, RpcCodec::new());

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(server_id, "rpc writer: cancellation received, stopping");
                break;
            }

            frame = outbound.recv() => {
                match frame {
                    None => {
                        debug!(server_id, "rpc writer: outbound queue closed, stopping");
                        break;
                    }
                    Some(value) => {
                        let Ok(line) = serde_json::to_string(&value) else {
                            warn!(server_id, "rpc writer: unserializable frame, skipping");
                            continue;
                        };

                        if let Err(err) = framed.send(line).await {
                            warn!(server_id, error = %err, "rpc writer: write to stdin failed, stopping");
                            break;
                        }
                    }
                }
            }
        }
    }
}
