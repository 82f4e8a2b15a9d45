//! Cross-store category index
//!
//! A derived cache, never the source of truth: every entry can be rebuilt by
//! scanning the stores. Readers re-check each hit against its store.

use std::collections::{BTreeMap, BTreeSet};

use crate::model::{Category, Snapshot, SnapshotRef};

#[derive(Debug, Clone, Default)]
pub struct CrossStoreIndex {
    by_category: BTreeMap<Category, BTreeSet<SnapshotRef>>,
    dirty: bool,
}

impl CrossStoreIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a snapshot under its current category, dropping any stale entry
    pub fn upsert(&mut self, snapshot: &Snapshot) {
        let reference = snapshot.reference();
        self.forget(&reference);
        if let Some(category) = &snapshot.category {
            self.by_category
                .entry(category.clone())
                .or_default()
                .insert(reference);
        }
    }

    pub fn forget(&mut self, reference: &SnapshotRef) {
        self.by_category.retain(|_, refs| {
            refs.remove(reference);
            !refs.is_empty()
        });
    }

    pub fn refs(&self, category: &Category) -> impl Iterator<Item = &SnapshotRef> {
        self.by_category.get(category).into_iter().flatten()
    }

    pub fn categories(&self) -> impl Iterator<Item = &Category> {
        self.by_category.keys()
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Replace the whole index from a full scan
    pub fn rebuild<'a, I>(&mut self, snapshots: I)
    where
        I: IntoIterator<Item = &'a Snapshot>,
    {
        self.by_category.clear();
        for snapshot in snapshots {
            self.upsert(snapshot);
        }
        self.dirty = false;
    }

    pub fn len(&self) -> usize {
        self.by_category.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_category.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Metadata, MetadataOverrides, SnapshotId, StoreId};
    use chrono::Utc;
    use std::sync::Arc;

    fn snapshot(store: &str, id: &str, category: Option<&str>) -> Snapshot {
        let now = Utc::now();
        Snapshot {
            id: SnapshotId::from(id),
            store_id: StoreId::from(store),
            category: category.map(Category::from),
            timestamp: now,
            data: serde_json::Value::Null,
            metadata: Arc::new(Metadata::initial(now, &MetadataOverrides::new())),
            parent: None,
            child_ids: Vec::new(),
            subscribers: Default::default(),
            is_core: false,
            expires_at: None,
            max_age: None,
        }
    }

    #[test]
    fn test_upsert_moves_between_categories() {
        let mut index = CrossStoreIndex::new();
        let mut s = snapshot("tasks", "t1", Some("task"));
        index.upsert(&s);

        s.category = Some(Category::from("subtask"));
        index.upsert(&s);

        assert_eq!(index.refs(&Category::from("task")).count(), 0);
        assert_eq!(index.refs(&Category::from("subtask")).count(), 1);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_rebuild_clears_dirty() {
        let mut index = CrossStoreIndex::new();
        index.mark_dirty();
        let a = snapshot("tasks", "t1", Some("task"));
        let b = snapshot("teams", "t1", Some("task"));
        let c = snapshot("teams", "x", None);
        index.rebuild([&a, &b, &c]);

        assert!(!index.is_dirty());
        let refs: Vec<String> = index
            .refs(&Category::from("task"))
            .map(|r| r.to_string())
            .collect();
        assert_eq!(refs, vec!["tasks/t1", "teams/t1"]);
    }
}
