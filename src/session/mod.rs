//! Per-backend conversation sessions: model, context building, compaction,
//! and file-backed persistence.
//!
//! A session is mutated only by the logic owning its backend id; appends,
//! compaction, and persistence are sequential per id and persistence is
//! last-write-wins.

pub mod compactor;
pub mod context;
pub mod model;
pub mod store;

pub use context::{build_context, trim_by_bytes, ContextPart, ContextRole};
pub use model::{SessionState, Turn, TurnRole};
pub use store::{FsSessionStore, SessionStore};
