//! snapstore core - in-memory, versioned, hierarchical snapshot cache
//!
//! This crate provides the synchronous kernel every feature area reads and
//! writes through, including:
//! - Snapshot entity with immutable, versioned metadata records
//! - Per-type snapshot stores with TTL eviction and bounded history
//! - A container presenting one query surface over many stores
//! - Cross-store parent/child hierarchy with cycle-safe traversal
//! - Subscription registry with isolated, synchronous delivery
//! - Batch coordination with partial-failure reporting
//! - Deterministic structural diffs
//!
//! All mutation is synchronous and single-threaded from the caller's point of
//! view. Suspension on external collaborators lives in `snapstore-engine`.

pub mod apply;
pub mod batch;
pub mod clock;
pub mod commands;
pub mod config;
pub mod container;
pub mod diff;
pub mod errors;
pub mod ids;
pub mod logging_facility;
pub mod model;
pub mod policy;
pub mod store;
pub mod subscription;

pub use snapstore_core_types as core_types;

// Re-export commonly used types
pub use apply::{apply, OperationOutcome};
pub use batch::{BatchCoordinator, BatchFailure, BatchObserver, BatchOutcome};
pub use commands::{SnapshotQuery, StoreOperation};
pub use config::{ContainerConfig, StoreConfig};
pub use container::{Locator, SnapshotContainer, SortOrder};
pub use errors::{ExError, ExErrorKind, Result, SnapStoreError};
pub use model::{
    Category, Metadata, NewSnapshot, Priority, Snapshot, SnapshotId, SnapshotPatch, SnapshotRef,
    StoreId,
};
pub use store::{MergeStrategy, SnapshotFilter, SnapshotStore, StoreEnv};
pub use subscription::{EventKind, Selector, SnapshotEvent, SubscriptionRegistry};
