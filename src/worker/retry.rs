//! Bounded exponential retry for transient protocol failures.
//!
//! A worker may reject a call issued microseconds after declaring ready, so
//! the policy is applied uniformly to every outbound call rather than only
//! to initialization-adjacent ones. Two error signatures are treated as
//! transient race conditions; everything else propagates unchanged.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::config::RpcConfig;
use crate::rpc::RpcChannel;
use crate::{AppError, Result};

/// Retry schedule for calls failing with a transient signature.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub tries: u32,
    /// Delay before the first retry; doubles per attempt.
    pub base_delay: Duration,
    /// Delay cap.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Build a policy from the host RPC settings.
    #[must_use]
    pub fn from_config(rpc: &RpcConfig) -> Self {
        Self {
            tries: rpc.retry_tries,
            base_delay: Duration::from_millis(rpc.retry_base_delay_ms),
            max_delay: Duration::from_millis(rpc.retry_max_delay_ms),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            tries: 6,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_millis(1500),
        }
    }
}

/// Whether `err` carries a known transient signature.
///
/// Matches a request issued before worker initialization completed, or the
/// `-32602` invalid-params protocol code. The code match is deliberately
/// broad: a genuine application-level invalid-argument error sharing the
/// code is also retried, delaying its surfacing by a few seconds. Known
/// false-positive risk, preserved rather than narrowed.
#[must_use]
pub fn is_transient(err: &AppError) -> bool {
    let AppError::Rpc(msg) = err else {
        return false;
    };
    msg.to_ascii_lowercase()
        .contains("before initialization was complete")
        || msg.contains("-32602")
}

/// Issue `method` over `channel`, retrying transient failures per `policy`.
///
/// The identical call is reissued after a doubling delay until it succeeds,
/// fails with a non-transient error, or the attempt ceiling is reached.
///
/// # Errors
///
/// The final error, unchanged, once attempts are exhausted or the failure
/// is not transient.
pub async fn call_with_retry(
    channel: &RpcChannel,
    method: &str,
    params: Option<Value>,
    policy: &RetryPolicy,
) -> Result<Value> {
    let mut delay = policy.base_delay;
    let mut attempt: u32 = 0;

    loop {
        match channel.request(method, params.clone()).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_transient(&err) || attempt + 1 >= policy.tries {
                    return Err(err);
                }
                debug!(
                    server_id = %channel.server_id(),
                    method,
                    attempt,
                    delay = ?delay,
                    error = %err,
                    "transient rpc failure, retrying"
                );
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(policy.max_delay);
                attempt += 1;
            }
        }
    }
}
