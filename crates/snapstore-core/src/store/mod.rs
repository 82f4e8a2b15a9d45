//! Snapshot store: the owner of one logical type's snapshots

pub mod env;
pub mod filter;
pub mod merge;
pub mod snapshot_store;

pub use env::StoreEnv;
pub use filter::SnapshotFilter;
pub use merge::{MergeStrategy, Resolver, ResolverError};
pub use snapshot_store::SnapshotStore;
