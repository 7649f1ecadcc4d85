//! Remote text-generation client.
//!
//! Sends a non-streaming chat-completions request carrying the
//! byte-bounded context parts followed by the new prompt. Throttled
//! responses (HTTP 429/503) are retried exactly once after honoring the
//! server-suggested wait, at a reduced token budget.

use std::time::Duration;

use regex::Regex;
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::config::LlmConfig;
use crate::session::context::{ContextPart, ContextRole};
use crate::{AppError, Result};

/// Cap on how long a server-suggested wait is honored.
const MAX_THROTTLE_WAIT: Duration = Duration::from_secs(8);

/// Wait applied when a throttled response suggests nothing usable.
const DEFAULT_THROTTLE_WAIT: Duration = Duration::from_secs(2);

/// Floor for the reduced token budget on the throttle retry.
const MIN_REDUCED_TOKENS: u32 = 128;

/// One message of a chat-completions request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    /// Wire role: `system`, `user`, or `assistant`.
    pub role: &'static str,
    /// Message content.
    pub content: String,
}

/// Full chat-completions request body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    /// Model identifier.
    pub model: String,
    /// Ordered messages: context parts, then the new prompt.
    pub messages: Vec<ChatMessage>,
    /// Always `false`; streaming is not used.
    pub stream: bool,
    /// Completion token budget.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Successful completion result.
#[derive(Debug, Clone)]
pub struct LlmReply {
    /// Generated text, possibly empty.
    pub reply: String,
    /// Raw usage object reported by the API, when present.
    pub usage: Option<Value>,
    /// Model the reply came from.
    pub model: String,
}

/// Map a context role onto the chat-completions wire role.
#[must_use]
pub fn wire_role(role: ContextRole) -> &'static str {
    match role {
        ContextRole::System => "system",
        ContextRole::Host => "user",
        ContextRole::Server => "assistant",
    }
}

/// Build the request body for `prompt` preceded by `context`.
#[must_use]
pub fn build_chat_request(
    config: &LlmConfig,
    prompt: &str,
    context: &[ContextPart],
    max_tokens: u32,
) -> ChatRequest {
    let mut messages: Vec<ChatMessage> = context
        .iter()
        .map(|part| ChatMessage {
            role: wire_role(part.role),
            content: part.content.clone(),
        })
        .collect();
    messages.push(ChatMessage {
        role: "user",
        content: prompt.to_owned(),
    });

    ChatRequest {
        model: config.model.clone(),
        messages,
        stream: false,
        max_tokens,
        temperature: config.temperature,
    }
}

/// Extract a server-suggested wait from a throttled response.
///
/// Prefers a numeric `Retry-After` header; falls back to a
/// `try again in <n>s` phrase in the body, rounded up to whole seconds.
#[must_use]
pub fn parse_suggested_wait(retry_after: Option<&str>, body: &str) -> Option<Duration> {
    if let Some(raw) = retry_after {
        if let Ok(secs) = raw.trim().parse::<f64>() {
            if secs >= 0.0 {
                return Some(Duration::from_secs_f64(secs));
            }
        }
    }

    let pattern = Regex::new(r"(?i)try again in ([0-9.]+)s").ok()?;
    let secs: f64 = pattern.captures(body)?.get(1)?.as_str().parse().ok()?;
    Some(Duration::from_secs_f64(secs.ceil()))
}

/// Outcome of one HTTP attempt, keeping throttle metadata for the retry
/// decision.
#[derive(Debug)]
struct SendFailure {
    status: Option<StatusCode>,
    wait: Option<Duration>,
    detail: String,
}

impl SendFailure {
    fn is_throttle(&self) -> bool {
        matches!(
            self.status,
            Some(StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE)
        )
    }
}

impl From<SendFailure> for AppError {
    fn from(failure: SendFailure) -> Self {
        Self::Llm(failure.detail)
    }
}

/// Client for the remote chat-completions endpoint.
#[derive(Debug)]
pub struct LlmClient {
    http: reqwest::Client,
    config: LlmConfig,
}

impl LlmClient {
    /// Create a client for the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Llm`] if the HTTP client cannot be built.
    pub fn new(config: LlmConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|err| AppError::Llm(format!("failed to build http client: {err}")))?;
        Ok(Self { http, config })
    }

    /// Ask the model for a completion of `prompt` with `context` preceding
    /// it.
    ///
    /// # Errors
    ///
    /// - [`AppError::Llm`] — missing API key, network failure, non-success
    ///   status after the single throttle retry, or an unparseable body.
    pub async fn ask(&self, prompt: &str, context: &[ContextPart]) -> Result<LlmReply> {
        if self.config.api_key.is_empty() {
            return Err(AppError::Llm(format!(
                "api key not set; export {}",
                self.config.api_key_env
            )));
        }

        let body = build_chat_request(&self.config, prompt, context, self.config.max_tokens);
        match self.send_once(&body).await {
            Ok(completion) => Ok(self.reply_from(completion)),
            Err(failure) if failure.is_throttle() => {
                let wait = failure
                    .wait
                    .unwrap_or(DEFAULT_THROTTLE_WAIT)
                    .min(MAX_THROTTLE_WAIT);
                warn!(
                    status = ?failure.status,
                    wait = ?wait,
                    "text-generation throttled; retrying once at reduced budget"
                );
                tokio::time::sleep(wait).await;

                let reduced = build_chat_request(
                    &self.config,
                    prompt,
                    context,
                    MIN_REDUCED_TOKENS.max(self.config.max_tokens / 2),
                );
                self.send_once(&reduced)
                    .await
                    .map(|completion| self.reply_from(completion))
                    .map_err(AppError::from)
            }
            Err(failure) => Err(failure.into()),
        }
    }

    async fn send_once(&self, body: &ChatRequest) -> std::result::Result<ChatCompletion, SendFailure> {
        let response = self
            .http
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(|err| SendFailure {
                status: None,
                wait: None,
                detail: format!("request failed: {err}"),
            })?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let text = response.text().await.map_err(|err| SendFailure {
            status: Some(status),
            wait: None,
            detail: format!("failed to read response body: {err}"),
        })?;

        if !status.is_success() {
            let wait = parse_suggested_wait(retry_after.as_deref(), &text);
            return Err(SendFailure {
                status: Some(status),
                wait,
                detail: format!("http {status}: {text}"),
            });
        }

        serde_json::from_str(&text).map_err(|err| SendFailure {
            status: None,
            wait: None,
            detail: format!("invalid response body: {err}"),
        })
    }

    fn reply_from(&self, completion: ChatCompletion) -> LlmReply {
        let reply = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();
        LlmReply {
            reply,
            usage: completion.usage,
            model: self.config.model.clone(),
        }
    }
}
