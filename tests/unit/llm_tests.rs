//! Text-generation request construction and throttle-retry tests.

use std::time::Duration;

use mcp_bridge::config::LlmConfig;
use mcp_bridge::errors::AppError;
use mcp_bridge::llm::{build_chat_request, parse_suggested_wait, wire_role, LlmClient};
use mcp_bridge::session::context::{ContextPart, ContextRole};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

fn config() -> LlmConfig {
    LlmConfig {
        model: "test-model".into(),
        max_tokens: 256,
        temperature: 0.3,
        ..LlmConfig::default()
    }
}

fn sample_context() -> Vec<ContextPart> {
    vec![
        ContextPart {
            role: ContextRole::System,
            content: "- Host: earlier business".into(),
        },
        ContextPart {
            role: ContextRole::Host,
            content: "what changed?".into(),
        },
        ContextPart {
            role: ContextRole::Server,
            content: "two files".into(),
        },
    ]
}

#[test]
fn roles_map_onto_chat_wire_roles() {
    assert_eq!(wire_role(ContextRole::System), "system");
    assert_eq!(wire_role(ContextRole::Host), "user");
    assert_eq!(wire_role(ContextRole::Server), "assistant");
}

#[test]
fn request_body_carries_context_then_prompt() {
    let request = build_chat_request(&config(), "and now?", &sample_context(), 256);
    let body = serde_json::to_value(&request).unwrap();

    assert_eq!(body["model"], "test-model");
    assert_eq!(body["stream"], false);
    assert_eq!(body["max_tokens"], 256);
    assert_eq!(body["temperature"], 0.3);

    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[0]["role"], "system");
    assert_eq!(messages[1]["role"], "user");
    assert_eq!(messages[2]["role"], "assistant");
    assert_eq!(
        messages[3],
        json!({ "role": "user", "content": "and now?" })
    );
}

#[test]
fn empty_context_yields_prompt_only() {
    let request = build_chat_request(&config(), "hello", &[], 128);
    assert_eq!(request.messages.len(), 1);
    assert_eq!(request.messages[0].role, "user");
    assert_eq!(request.max_tokens, 128);
}

#[test]
fn retry_after_header_is_preferred() {
    let wait = parse_suggested_wait(Some("3"), "Please try again in 10s.").unwrap();
    assert_eq!(wait, Duration::from_secs(3));
}

#[test]
fn fractional_header_values_parse() {
    let wait = parse_suggested_wait(Some("1.5"), "").unwrap();
    assert_eq!(wait, Duration::from_secs_f64(1.5));
}

#[test]
fn body_phrase_is_parsed_and_rounded_up() {
    let body = r#"{"error":{"message":"Rate limit reached. Please try again in 2.318s."}}"#;
    let wait = parse_suggested_wait(None, body).unwrap();
    assert_eq!(wait, Duration::from_secs(3));
}

#[test]
fn body_phrase_match_is_case_insensitive() {
    let wait = parse_suggested_wait(None, "TRY AGAIN IN 4S").unwrap();
    assert_eq!(wait, Duration::from_secs(4));
}

#[test]
fn unusable_hints_yield_none() {
    assert!(parse_suggested_wait(None, "slow down").is_none());
    assert!(parse_suggested_wait(Some("soon"), "slow down").is_none());
    assert!(parse_suggested_wait(None, "").is_none());
}

#[test]
fn garbage_header_falls_back_to_the_body() {
    let wait = parse_suggested_wait(Some("Wed, 21 Oct 2015"), "try again in 2s").unwrap();
    assert_eq!(wait, Duration::from_secs(2));
}

/// Read one HTTP request off `stream` and return its body.
async fn read_request_body(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "client closed before the request completed");
        buf.extend_from_slice(&chunk[..n]);

        let Some(split) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let headers = String::from_utf8_lossy(&buf[..split]).to_string();
        let length: usize = headers
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse().ok())?
            })
            .unwrap_or(0);

        let body_start = split + 4;
        while buf.len() < body_start + length {
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client closed mid-body");
            buf.extend_from_slice(&chunk[..n]);
        }
        return String::from_utf8_lossy(&buf[body_start..body_start + length]).to_string();
    }
}

/// Serve exactly one canned HTTP response, returning the request body seen.
async fn respond_once(
    listener: &TcpListener,
    status: &str,
    extra_headers: &str,
    body: &str,
) -> String {
    let (mut stream, _) = listener.accept().await.unwrap();
    let request_body = read_request_body(&mut stream).await;
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n{extra_headers}\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await.unwrap();
    stream.shutdown().await.unwrap();
    request_body
}

fn local_client(addr: std::net::SocketAddr, max_tokens: u32) -> LlmClient {
    let config = LlmConfig {
        api_url: format!("http://{addr}/v1/chat/completions"),
        api_key: "test-key".into(),
        max_tokens,
        ..config()
    };
    LlmClient::new(config).unwrap()
}

#[tokio::test]
async fn throttled_request_is_retried_once_at_reduced_budget() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let first = respond_once(
            &listener,
            "429 Too Many Requests",
            "Retry-After: 0\r\n",
            r#"{"error":{"message":"Rate limit reached. Please try again in 20s."}}"#,
        )
        .await;
        let second = respond_once(
            &listener,
            "200 OK",
            "",
            r#"{"choices":[{"message":{"role":"assistant","content":"recovered"}}],"usage":{"total_tokens":9}}"#,
        )
        .await;
        (first, second)
    });

    let client = local_client(addr, 512);
    let reply = client.ask("hello", &[]).await.unwrap();
    assert_eq!(reply.reply, "recovered");
    assert_eq!(reply.usage, Some(json!({ "total_tokens": 9 })));

    let (first, second) = server.await.unwrap();
    let first: Value = serde_json::from_str(&first).unwrap();
    let second: Value = serde_json::from_str(&second).unwrap();
    assert_eq!(first["max_tokens"], 512);
    // Retry runs at max(128, max_tokens / 2).
    assert_eq!(second["max_tokens"], 256);
    assert_eq!(second["messages"], first["messages"]);
}

#[tokio::test]
async fn throttle_retry_budget_never_drops_below_the_floor() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        respond_once(&listener, "503 Service Unavailable", "Retry-After: 0\r\n", "busy").await;
        let second = respond_once(
            &listener,
            "200 OK",
            "",
            r#"{"choices":[{"message":{"role":"assistant","content":"ok"}}]}"#,
        )
        .await;
        second
    });

    let client = local_client(addr, 64);
    client.ask("hello", &[]).await.unwrap();

    let second: Value = serde_json::from_str(&server.await.unwrap()).unwrap();
    assert_eq!(second["max_tokens"], 128);
}

#[tokio::test]
async fn non_throttle_failures_are_not_retried() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        respond_once(&listener, "500 Internal Server Error", "", "boom").await
    });

    let client = local_client(addr, 256);
    let err = client.ask("hello", &[]).await.unwrap_err();
    match err {
        AppError::Llm(msg) => {
            assert!(msg.contains("500"), "msg: {msg}");
            assert!(msg.contains("boom"), "msg: {msg}");
        }
        other => panic!("expected Llm error, got {other:?}"),
    }

    // The server task only serves one response; a retry would hang here.
    server.await.unwrap();
}

#[tokio::test]
async fn missing_api_key_fails_before_any_request() {
    let client = LlmClient::new(config()).unwrap();
    let err = client.ask("hello", &[]).await.unwrap_err();
    assert!(matches!(err, AppError::Llm(ref msg) if msg.contains("LLM_API_KEY")));
}
