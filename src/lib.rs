#![forbid(unsafe_code)]

//! `mcp-bridge` — host-side bridge between a primary process and child MCP
//! worker processes speaking newline-delimited JSON-RPC 2.0 over stdio,
//! plus a byte-budgeted conversational context layer for a remote
//! text-generation API.

pub mod config;
pub mod errors;
pub mod llm;
pub mod rpc;
pub mod session;
pub mod worker;

pub use config::HostConfig;
pub use errors::{AppError, Result};
