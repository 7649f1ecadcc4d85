//! Host configuration parsing, validation, and credential loading.

use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::{AppError, Result};

/// Wire transport declared by a backend descriptor.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Child process speaking newline-delimited JSON-RPC over pipes.
    Stdio,
    /// Remote HTTP endpoint; forwarded by an outer layer, not spawned here.
    Http,
}

/// One backend descriptor from the ordered server list.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BackendConfig {
    /// Unique backend identifier; exactly one descriptor per id.
    pub id: String,
    /// Human-readable label; falls back to the id when absent.
    #[serde(default)]
    pub label: Option<String>,
    /// Transport kind; stdio unless declared otherwise.
    #[serde(default = "default_transport")]
    pub transport: TransportKind,
    /// Command to spawn (stdio transport only).
    #[serde(default)]
    pub cmd: Option<String>,
    /// Arguments passed to the spawned command.
    #[serde(default)]
    pub args: Vec<String>,
    /// Remote endpoint (http transport only).
    #[serde(default)]
    pub url: Option<String>,
}

impl BackendConfig {
    /// Display label for logs and inventory listings.
    #[must_use]
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.id)
    }
}

fn default_transport() -> TransportKind {
    TransportKind::Stdio
}

/// Context-window and compaction limits.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ContextConfig {
    /// Number of recent turns included in an outbound context.
    #[serde(default = "default_context_turns")]
    pub context_turns: usize,
    /// Byte budget for one outbound context payload.
    #[serde(default = "default_context_budget")]
    pub context_budget_bytes: usize,
    /// Serialized session size that triggers compaction.
    #[serde(default = "default_session_ceiling")]
    pub session_ceiling_bytes: usize,
    /// Byte ceiling for the rolling summary after compaction.
    #[serde(default = "default_summary_ceiling")]
    pub summary_ceiling_bytes: usize,
    /// Number of evicted turns folded into summary bullets.
    #[serde(default = "default_summary_bullets")]
    pub summary_bullets: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            context_turns: default_context_turns(),
            context_budget_bytes: default_context_budget(),
            session_ceiling_bytes: default_session_ceiling(),
            summary_ceiling_bytes: default_summary_ceiling(),
            summary_bullets: default_summary_bullets(),
        }
    }
}

fn default_context_turns() -> usize {
    6
}

fn default_context_budget() -> usize {
    2048
}

fn default_session_ceiling() -> usize {
    500 * 1024
}

fn default_summary_ceiling() -> usize {
    2000
}

fn default_summary_bullets() -> usize {
    5
}

/// RPC timeout, retry, and handshake settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RpcConfig {
    /// Per-request settlement timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Total attempts for calls failing with a transient signature.
    #[serde(default = "default_retry_tries")]
    pub retry_tries: u32,
    /// Initial retry delay in milliseconds; doubles per attempt.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Retry delay cap in milliseconds.
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    /// Settle delay after the initialized notification, in milliseconds.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
}

impl RpcConfig {
    /// Per-request settlement timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            retry_tries: default_retry_tries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            settle_delay_ms: default_settle_delay_ms(),
        }
    }
}

fn default_request_timeout_ms() -> u64 {
    15_000
}

fn default_retry_tries() -> u32 {
    6
}

fn default_retry_base_delay_ms() -> u64 {
    250
}

fn default_retry_max_delay_ms() -> u64 {
    1500
}

fn default_settle_delay_ms() -> u64 {
    800
}

/// Remote text-generation endpoint settings.
///
/// The API key is loaded at runtime from the environment, not from the
/// config file.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct LlmConfig {
    /// Chat-completions endpoint URL.
    #[serde(default = "default_llm_api_url")]
    pub api_url: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_llm_api_key_env")]
    pub api_key_env: String,
    /// API key (populated at runtime).
    #[serde(skip)]
    pub api_key: String,
    /// Model identifier sent with each request.
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// Token budget for one completion.
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,
    /// Sampling temperature.
    #[serde(default = "default_llm_temperature")]
    pub temperature: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: default_llm_api_url(),
            api_key_env: default_llm_api_key_env(),
            api_key: String::new(),
            model: default_llm_model(),
            max_tokens: default_llm_max_tokens(),
            temperature: default_llm_temperature(),
        }
    }
}

fn default_llm_api_url() -> String {
    "https://api.groq.com/openai/v1/chat/completions".into()
}

fn default_llm_api_key_env() -> String {
    "LLM_API_KEY".into()
}

fn default_llm_model() -> String {
    "llama-3.1-8b-instant".into()
}

fn default_llm_max_tokens() -> u32 {
    256
}

fn default_llm_temperature() -> f64 {
    0.2
}

/// Host configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct HostConfig {
    /// Ordered backend descriptors; exactly one per id.
    pub backends: Vec<BackendConfig>,
    /// Context-window and compaction limits.
    #[serde(default)]
    pub context: ContextConfig,
    /// RPC timeout and retry settings.
    #[serde(default)]
    pub rpc: RpcConfig,
    /// Remote text-generation settings.
    #[serde(default)]
    pub llm: LlmConfig,
}

impl HostConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the LLM API key from the configured environment variable.
    ///
    /// A missing key is not fatal at startup; LLM calls will fail until it
    /// is provided.
    pub fn load_credentials(&mut self) {
        match env::var(&self.llm.api_key_env) {
            Ok(value) if !value.is_empty() => self.llm.api_key = value,
            _ => warn!(
                env = %self.llm.api_key_env,
                "llm api key not set; text-generation calls will fail"
            ),
        }
    }

    /// Look up the descriptor for a backend id.
    #[must_use]
    pub fn backend(&self, id: &str) -> Option<&BackendConfig> {
        self.backends.iter().find(|b| b.id == id)
    }

    fn validate(&self) -> Result<()> {
        if self.backends.is_empty() {
            return Err(AppError::Config("backends must not be empty".into()));
        }

        for (idx, backend) in self.backends.iter().enumerate() {
            if backend.id.trim().is_empty() {
                return Err(AppError::Config(format!("backend #{idx} has an empty id")));
            }
            if self.backends.iter().filter(|b| b.id == backend.id).count() > 1 {
                return Err(AppError::Config(format!(
                    "duplicate backend id '{}'",
                    backend.id
                )));
            }
            match backend.transport {
                TransportKind::Stdio if backend.cmd.is_none() => {
                    return Err(AppError::Config(format!(
                        "stdio backend '{}' is missing cmd",
                        backend.id
                    )));
                }
                TransportKind::Http if backend.url.is_none() => {
                    return Err(AppError::Config(format!(
                        "http backend '{}' is missing url",
                        backend.id
                    )));
                }
                _ => {}
            }
        }

        if self.context.context_turns == 0 {
            return Err(AppError::Config(
                "context_turns must be greater than zero".into(),
            ));
        }
        if self.rpc.retry_tries == 0 {
            return Err(AppError::Config(
                "retry_tries must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}
