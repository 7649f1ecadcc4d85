//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
///
/// Malformed inbound frames are deliberately absent: they are logged and
/// discarded at the channel boundary, never surfaced as errors.
#[derive(Debug, Clone)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Backend descriptor exists but its transport is not handled here.
    TransportUnsupported(String),
    /// Worker process exited; carries the exit code when one exists.
    ProcessExited(Option<i32>),
    /// A single RPC call received no response within its timeout window.
    RpcTimeout(String),
    /// JSON-RPC error payload returned by a worker.
    Rpc(String),
    /// Remote text-generation call failure.
    Llm(String),
    /// Session persistence failure.
    Session(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::TransportUnsupported(msg) => write!(f, "transport unsupported: {msg}"),
            Self::ProcessExited(Some(code)) => write!(f, "process exited with code {code}"),
            Self::ProcessExited(None) => write!(f, "process exited (terminated by signal)"),
            Self::RpcTimeout(msg) => write!(f, "rpc timeout: {msg}"),
            Self::Rpc(msg) => write!(f, "rpc error: {msg}"),
            Self::Llm(msg) => write!(f, "llm: {msg}"),
            Self::Session(msg) => write!(f, "session: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
