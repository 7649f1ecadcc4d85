//! Line-delimited JSON-RPC 2.0 plumbing for worker channels.
//!
//! A [`channel::RpcChannel`] frames a byte stream into JSON messages via
//! [`codec::RpcCodec`], correlates requests with responses through a
//! pending-request table, and enforces per-call timeouts.

pub mod channel;
pub mod codec;
pub mod message;

pub use channel::RpcChannel;
