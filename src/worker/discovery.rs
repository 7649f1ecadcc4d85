//! Tool discovery fallback chain and tool invocation.
//!
//! Servers disagree on what a bare `tools/list` should look like, so the
//! listing probes parameter-shape variants in fixed priority order. Each
//! variant gets its own pass through the retry policy; the first one that
//! succeeds wins and its identity is recorded for diagnostics. Exhausted
//! variants are not retried individually.

use std::fmt::{Display, Formatter};

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::rpc::RpcChannel;
use crate::worker::retry::{call_with_retry, RetryPolicy};
use crate::{AppError, Result};

/// Parameter-shape variant for a `tools/list` probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListVariant {
    /// `{}` — an empty params object.
    EmptyObject,
    /// Params field omitted entirely.
    NoParams,
    /// `{"limit": 200}` — a paging hint.
    PagingHint,
    /// `{"cursor": ""}` — an empty cursor.
    EmptyCursor,
}

impl ListVariant {
    /// Probe order, highest priority first.
    pub const ALL: [Self; 4] = [
        Self::EmptyObject,
        Self::NoParams,
        Self::PagingHint,
        Self::EmptyCursor,
    ];

    /// Params payload this variant sends.
    #[must_use]
    pub fn params(self) -> Option<Value> {
        match self {
            Self::EmptyObject => Some(json!({})),
            Self::NoParams => None,
            Self::PagingHint => Some(json!({ "limit": 200 })),
            Self::EmptyCursor => Some(json!({ "cursor": "" })),
        }
    }

    /// Diagnostic label matching the shape sent on the wire.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EmptyObject => "tools/list {}",
            Self::NoParams => "tools/list (no params)",
            Self::PagingHint => "tools/list {limit:200}",
            Self::EmptyCursor => "tools/list {cursor:\"\"}",
        }
    }
}

impl Display for ListVariant {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// List the worker's tools, probing each [`ListVariant`] in priority order.
///
/// Returns the first successful result together with the variant that
/// produced it.
///
/// # Errors
///
/// The error of the last variant once every shape has been exhausted.
pub async fn list_tools(
    channel: &RpcChannel,
    policy: &RetryPolicy,
) -> Result<(Value, ListVariant)> {
    let mut last_err: Option<AppError> = None;

    for variant in ListVariant::ALL {
        match call_with_retry(channel, "tools/list", variant.params(), policy).await {
            Ok(tools) => {
                debug!(
                    server_id = %channel.server_id(),
                    variant = %variant,
                    "tools/list variant succeeded"
                );
                return Ok((tools, variant));
            }
            Err(err) => {
                warn!(
                    server_id = %channel.server_id(),
                    variant = %variant,
                    error = %err,
                    "tools/list variant failed, falling through"
                );
                last_err = Some(err);
            }
        }
    }

    Err(last_err.unwrap_or_else(|| AppError::Rpc("tools/list failed with no attempts".into())))
}

/// Invoke a tool by name with the given arguments, under the retry policy.
///
/// # Errors
///
/// Propagates the final RPC failure after retries.
pub async fn call_tool(
    channel: &RpcChannel,
    name: &str,
    arguments: Value,
    policy: &RetryPolicy,
) -> Result<Value> {
    let params = json!({ "name": name, "arguments": arguments });
    call_with_retry(channel, "tools/call", Some(params), policy).await
}
