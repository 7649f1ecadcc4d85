//! Worker process lifecycle: spawning, initialization, retry, discovery.
//!
//! The [`supervisor::WorkerSupervisor`] owns the registry of live workers
//! keyed by backend id and is the only entry point callers need: `acquire`
//! transparently spawns and initializes a worker, and the tool operations
//! route through the retry policy and discovery fallback chain.

pub mod discovery;
pub mod handshake;
pub mod retry;
pub mod spawner;
pub mod supervisor;

pub use discovery::ListVariant;
pub use retry::RetryPolicy;
pub use supervisor::{BackendStatus, WorkerHandle, WorkerStatus, WorkerSupervisor};
