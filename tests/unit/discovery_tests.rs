//! Tool discovery fallback chain tests.

use std::sync::Arc;
use std::time::Duration;

use mcp_bridge::errors::AppError;
use mcp_bridge::rpc::RpcChannel;
use mcp_bridge::worker::discovery::{call_tool, list_tools};
use mcp_bridge::worker::{ListVariant, RetryPolicy};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio_util::sync::CancellationToken;

fn one_shot_policy() -> RetryPolicy {
    RetryPolicy {
        tries: 1,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(1),
    }
}

fn wire() -> (Arc<RpcChannel>, DuplexStream, DuplexStream) {
    let (worker_stdout, host_reader) = tokio::io::duplex(4096);
    let (host_writer, worker_stdin) = tokio::io::duplex(4096);
    let channel = RpcChannel::spawn(
        "disco-worker",
        host_reader,
        host_writer,
        Duration::from_millis(500),
        &CancellationToken::new(),
    );
    (channel, worker_stdout, worker_stdin)
}

/// Responder failing the first `fail_count` requests and succeeding after;
/// returns the request frames it saw.
fn failing_responder(
    mut worker_stdout: DuplexStream,
    worker_stdin: DuplexStream,
    fail_count: usize,
) -> tokio::task::JoinHandle<Vec<Value>> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(worker_stdin).lines();
        let mut seen = Vec::new();
        while let Ok(Some(line)) = lines.next_line().await {
            let frame: Value = serde_json::from_str(&line).unwrap();
            let id = frame["id"].as_u64().unwrap();
            let reply = if seen.len() < fail_count {
                json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": { "code": -32601, "message": "Method not found" }
                })
            } else {
                json!({ "jsonrpc": "2.0", "id": id, "result": { "tools": [{ "name": "add" }] } })
            };
            seen.push(frame);
            worker_stdout
                .write_all(format!("{reply}\n").as_bytes())
                .await
                .unwrap();
        }
        seen
    })
}

#[test]
fn probe_order_is_fixed() {
    assert_eq!(
        ListVariant::ALL,
        [
            ListVariant::EmptyObject,
            ListVariant::NoParams,
            ListVariant::PagingHint,
            ListVariant::EmptyCursor,
        ]
    );
}

#[test]
fn variant_params_match_their_wire_shapes() {
    assert_eq!(ListVariant::EmptyObject.params(), Some(json!({})));
    assert_eq!(ListVariant::NoParams.params(), None);
    assert_eq!(ListVariant::PagingHint.params(), Some(json!({ "limit": 200 })));
    assert_eq!(ListVariant::EmptyCursor.params(), Some(json!({ "cursor": "" })));
}

#[tokio::test]
async fn first_successful_variant_wins() {
    let (channel, worker_stdout, worker_stdin) = wire();
    let responder = failing_responder(worker_stdout, worker_stdin, 0);

    let (tools, variant) = list_tools(&channel, &one_shot_policy()).await.unwrap();
    assert_eq!(variant, ListVariant::EmptyObject);
    assert_eq!(tools["tools"][0]["name"], "add");

    drop(channel);
    let seen = responder.await.unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0]["params"], json!({}));
}

#[tokio::test]
async fn failed_variant_falls_through_to_the_next_shape() {
    let (channel, worker_stdout, worker_stdin) = wire();
    let responder = failing_responder(worker_stdout, worker_stdin, 1);

    let (_, variant) = list_tools(&channel, &one_shot_policy()).await.unwrap();
    assert_eq!(variant, ListVariant::NoParams);

    drop(channel);
    let seen = responder.await.unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0]["params"], json!({}));
    assert!(seen[1].get("params").is_none(), "second probe omits params");
}

#[tokio::test]
async fn exhausted_chain_returns_the_last_variants_error() {
    let (channel, worker_stdout, worker_stdin) = wire();
    let responder = failing_responder(worker_stdout, worker_stdin, usize::MAX);

    let err = list_tools(&channel, &one_shot_policy()).await.unwrap_err();
    assert!(matches!(err, AppError::Rpc(ref msg) if msg.contains("-32601")));

    drop(channel);
    let seen = responder.await.unwrap();
    assert_eq!(seen.len(), 4, "every variant probed exactly once");
    assert_eq!(seen[3]["params"], json!({ "cursor": "" }));
}

#[tokio::test]
async fn call_tool_wraps_name_and_arguments() {
    let (channel, worker_stdout, worker_stdin) = wire();
    let responder = failing_responder(worker_stdout, worker_stdin, 0);

    let result = call_tool(&channel, "add", json!({ "a": 1, "b": 2 }), &one_shot_policy())
        .await
        .unwrap();
    assert_eq!(result["tools"][0]["name"], "add");

    drop(channel);
    let seen = responder.await.unwrap();
    assert_eq!(seen[0]["method"], "tools/call");
    assert_eq!(
        seen[0]["params"],
        json!({ "name": "add", "arguments": { "a": 1, "b": 2 } })
    );
}
