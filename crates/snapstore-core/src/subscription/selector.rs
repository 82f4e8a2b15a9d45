use serde::{Deserialize, Serialize};

use super::event::SnapshotEvent;
use crate::model::{Category, SnapshotRef, StoreId};

/// Interest of one subscriber
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum Selector {
    /// Events about one snapshot
    Snapshot(SnapshotRef),
    /// Events about any snapshot of a category
    Category(Category),
    /// Every event emitted by one store
    Topic(StoreId),
    All,
}

impl Selector {
    pub fn snapshot(store_id: impl Into<StoreId>, id: impl Into<crate::model::SnapshotId>) -> Self {
        Selector::Snapshot(SnapshotRef::new(store_id, id))
    }

    pub fn category(category: impl Into<Category>) -> Self {
        Selector::Category(category.into())
    }

    pub fn topic(store_id: impl Into<StoreId>) -> Self {
        Selector::Topic(store_id.into())
    }

    pub fn matches(&self, event: &SnapshotEvent) -> bool {
        let snapshot = &event.snapshot;
        match self {
            Selector::Snapshot(target) => {
                target.store_id == snapshot.store_id && target.id == snapshot.id
            }
            Selector::Category(category) => snapshot.category.as_ref() == Some(category),
            Selector::Topic(store_id) => &snapshot.store_id == store_id,
            Selector::All => true,
        }
    }
}
