use std::fmt;

use crate::model::{SnapshotId, SnapshotRef, StoreId};

/// Store id reported in `NotFound` for a bare id no store holds
pub const ANY_STORE: &str = "*";

/// Addresses a snapshot through a container
///
/// A bare id is resolved across every store and must be unique among live
/// snapshots; a qualified reference names its store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    Id(SnapshotId),
    Ref(SnapshotRef),
}

impl Locator {
    pub fn qualified(store_id: impl Into<StoreId>, id: impl Into<SnapshotId>) -> Self {
        Locator::Ref(SnapshotRef::new(store_id, id))
    }

    pub fn id(&self) -> &SnapshotId {
        match self {
            Locator::Id(id) => id,
            Locator::Ref(r) => &r.id,
        }
    }

    /// The named store, if qualified
    pub fn store_id(&self) -> Option<&StoreId> {
        match self {
            Locator::Id(_) => None,
            Locator::Ref(r) => Some(&r.store_id),
        }
    }

    /// Parse `store/id` as qualified and anything else as a bare id
    pub fn parse(raw: &str) -> Self {
        match raw.split_once('/') {
            Some((store, id)) if !store.is_empty() && !id.is_empty() => {
                Locator::qualified(store, id)
            }
            _ => Locator::Id(SnapshotId::from(raw)),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Id(id) => write!(f, "{}", id),
            Locator::Ref(r) => write!(f, "{}", r),
        }
    }
}

impl From<SnapshotId> for Locator {
    fn from(id: SnapshotId) -> Self {
        Locator::Id(id)
    }
}

impl From<SnapshotRef> for Locator {
    fn from(r: SnapshotRef) -> Self {
        Locator::Ref(r)
    }
}

impl From<&SnapshotRef> for Locator {
    fn from(r: &SnapshotRef) -> Self {
        Locator::Ref(r.clone())
    }
}

/// Bare id; use `Locator::parse` for `store/id` strings
impl From<&str> for Locator {
    fn from(id: &str) -> Self {
        Locator::Id(SnapshotId::from(id))
    }
}

impl From<u64> for Locator {
    fn from(id: u64) -> Self {
        Locator::Id(SnapshotId::from(id))
    }
}
