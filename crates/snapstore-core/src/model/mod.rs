pub mod keys;
pub mod metadata;
pub mod patch;
pub mod snapshot;

pub use keys::{Category, SnapshotId, SnapshotRef, StoreId, SubscriptionId};
pub use metadata::{EntryDescriptor, Metadata, MetadataOverrides, Priority};
pub use snapshot::{NewSnapshot, Snapshot, SnapshotPatch, SnapshotStatus};
