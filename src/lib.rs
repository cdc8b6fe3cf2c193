/// Roster Sync - applies declarative team manifests to a management API
///
/// The library holds the resilience layer (identity cache, retry executor,
/// batch resolver, error classification) and the apply pipeline built on it.
/// The binary in `main.rs` is a thin CLI wrapper.

pub mod api;
pub mod classify;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod identity;
pub mod manifest;
pub mod metrics;
pub mod output;
pub mod retry;
pub mod sync;

pub use error::{ErrorKind, SyncError, SyncResult};
