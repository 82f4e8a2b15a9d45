use std::fmt;
use std::sync::Arc;

use crate::model::{Category, Snapshot, SnapshotStatus};

type Predicate = Arc<dyn Fn(&Snapshot) -> bool + Send + Sync>;

/// Selection criteria for `SnapshotStore::filter`
#[derive(Clone)]
pub enum SnapshotFilter {
    All,
    Predicate(Predicate),
    Category(Category),
    Tag(String),
    Status(SnapshotStatus),
}

impl SnapshotFilter {
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&Snapshot) -> bool + Send + Sync + 'static,
    {
        SnapshotFilter::Predicate(Arc::new(f))
    }

    pub fn category(category: impl Into<Category>) -> Self {
        SnapshotFilter::Category(category.into())
    }

    pub fn tag(tag: impl Into<String>) -> Self {
        SnapshotFilter::Tag(tag.into())
    }

    pub fn matches(&self, snapshot: &Snapshot) -> bool {
        match self {
            SnapshotFilter::All => true,
            SnapshotFilter::Predicate(f) => f(snapshot),
            SnapshotFilter::Category(category) => snapshot.category.as_ref() == Some(category),
            SnapshotFilter::Tag(tag) => snapshot.has_tag(tag),
            SnapshotFilter::Status(status) => status.matches(snapshot),
        }
    }
}

impl fmt::Debug for SnapshotFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotFilter::All => f.write_str("All"),
            SnapshotFilter::Predicate(_) => f.write_str("Predicate(..)"),
            SnapshotFilter::Category(c) => f.debug_tuple("Category").field(c).finish(),
            SnapshotFilter::Tag(t) => f.debug_tuple("Tag").field(t).finish(),
            SnapshotFilter::Status(s) => f.debug_tuple("Status").field(s).finish(),
        }
    }
}
