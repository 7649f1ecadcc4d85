//! JSON-RPC 2.0 message construction and error rendering.
//!
//! One JSON object per newline-terminated line. Requests carry
//! `{jsonrpc, id, method, params}`; notifications omit `id`; inbound frames
//! carry `result` or `error`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol tag stamped on every outbound message.
pub const JSONRPC_VERSION: &str = "2.0";

/// Outbound request carrying a channel-scoped correlation id.
#[derive(Debug, Serialize)]
pub struct RpcRequest {
    /// Always [`JSONRPC_VERSION`].
    pub jsonrpc: &'static str,
    /// Correlation id; unique within one channel's lifetime.
    pub id: u64,
    /// Method name, e.g. `tools/list`.
    pub method: String,
    /// Method parameters; omitted from the wire when `None`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RpcRequest {
    /// Build a request frame for `method` with optional `params`.
    #[must_use]
    pub fn new(id: u64, method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method: method.to_owned(),
            params,
        }
    }
}

/// Outbound fire-and-forget notification; carries no id.
#[derive(Debug, Serialize)]
pub struct RpcNotification {
    /// Always [`JSONRPC_VERSION`].
    pub jsonrpc: &'static str,
    /// Method name.
    pub method: String,
    /// Method parameters; omitted from the wire when `None`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RpcNotification {
    /// Build a notification frame for `method` with optional `params`.
    #[must_use]
    pub fn new(method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method: method.to_owned(),
            params,
        }
    }
}

/// Structured JSON-RPC error object.
#[derive(Debug, Deserialize)]
pub struct RpcErrorObject {
    /// Numeric protocol error code, e.g. `-32602`.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
}

/// Render a JSON-RPC `error` payload into a single diagnostic string.
///
/// Structured `{code, message}` objects keep the numeric code in the text so
/// downstream signature matching (e.g. `-32602`) still works; anything else
/// is rendered as compact JSON.
#[must_use]
pub fn render_error(error: &Value) -> String {
    match serde_json::from_value::<RpcErrorObject>(error.clone()) {
        Ok(obj) => format!("{} ({})", obj.message, obj.code),
        Err(_) => match error {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        },
    }
}
