//! Worker initialization handshake.
//!
//! Brings a freshly spawned worker from `starting` to usable:
//!
//! 1. Send an `initialize` request carrying the protocol version, client
//!    identity, and capabilities, and await its result.
//! 2. Send the `initialized` notification, plus the legacy-compatible
//!    `notifications/initialized` alias some servers require.
//! 3. Sleep a short settle delay; several servers accept requests only a
//!    beat after acknowledging initialization.
//!
//! The caller owns the status transitions around this sequence.

use std::time::Duration;

use serde_json::json;
use tracing::debug;

use crate::config::RpcConfig;
use crate::rpc::RpcChannel;
use crate::Result;

/// Protocol version announced during `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Client name announced during `initialize`.
pub const CLIENT_NAME: &str = "mcp-bridge";

/// Run the initialize/initialized exchange over `channel`.
///
/// # Errors
///
/// Propagates the failure of the `initialize` request; notification sends
/// are fire-and-forget.
pub async fn initialize_worker(channel: &RpcChannel, rpc: &RpcConfig) -> Result<()> {
    let params = json!({
        "protocolVersion": PROTOCOL_VERSION,
        "clientInfo": {
            "name": CLIENT_NAME,
            "version": env!("CARGO_PKG_VERSION"),
        },
        "capabilities": { "experimental": {} },
    });

    channel.request("initialize", Some(params)).await?;
    debug!(server_id = %channel.server_id(), "handshake: initialize acknowledged");

    channel.notify("initialized", Some(json!({}))).await;
    // Legacy alias required by several servers.
    channel
        .notify("notifications/initialized", Some(json!({})))
        .await;

    tokio::time::sleep(Duration::from_millis(rpc.settle_delay_ms)).await;
    debug!(server_id = %channel.server_id(), "handshake: settle delay elapsed");
    Ok(())
}
