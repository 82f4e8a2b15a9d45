//! snapstore engine - async boundary around the core container
//!
//! The core container is synchronous. This crate adds what has to suspend:
//! - `SnapshotSource`, the persistence/transport collaborator
//! - `Reconciler`, fetch-then-commit with cancellation of stale results
//! - `RetryPolicy`, backoff and per-attempt timeouts
//! - `Sweeper`, periodic TTL eviction on a shared container

pub mod reconciler;
pub mod retry;
pub mod source;
pub mod sweeper;

use std::sync::Arc;

use snapstore_core::SnapshotContainer;

pub use reconciler::{FetchTicket, Reconciler};
pub use retry::RetryPolicy;
pub use source::{MemorySource, SnapshotSource};
pub use sweeper::{sweep_once, Sweeper};

/// Container shared between tasks; the lock is never held across a call to
/// a `SnapshotSource`
pub type SharedContainer = Arc<tokio::sync::Mutex<SnapshotContainer>>;

pub fn shared(container: SnapshotContainer) -> SharedContainer {
    Arc::new(tokio::sync::Mutex::new(container))
}
