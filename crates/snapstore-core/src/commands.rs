//! Tagged store operations
//!
//! This module defines the closed operation inventory that serves as the
//! single dispatch entry point over a container via the `apply()` function.

use chrono::{DateTime, Utc};

use crate::container::Locator;
use crate::model::{Category, NewSnapshot, Priority, SnapshotPatch, StoreId};
use crate::store::MergeStrategy;

/// One operation against a container
///
/// Operations are processed by `apply()`, which dispatches each variant to
/// the matching container call.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOperation {
    /// Create a snapshot in the named store
    Create {
        store_id: StoreId,
        snapshot: NewSnapshot,
    },

    /// Patch a snapshot, producing a new version
    Update { target: Locator, patch: SnapshotPatch },

    /// Remove a snapshot; absent targets are a no-op
    Delete { target: Locator },

    /// Merge `right` into `left` with a built-in strategy
    Merge {
        left: Locator,
        right: Locator,
        strategy: MergeStrategy,
    },

    /// Read-only cross-store query
    Query(SnapshotQuery),
}

impl StoreOperation {
    pub fn create(store_id: impl Into<StoreId>, snapshot: NewSnapshot) -> Self {
        StoreOperation::Create {
            store_id: store_id.into(),
            snapshot,
        }
    }

    pub fn update(target: impl Into<Locator>, patch: SnapshotPatch) -> Self {
        StoreOperation::Update {
            target: target.into(),
            patch,
        }
    }

    pub fn delete(target: impl Into<Locator>) -> Self {
        StoreOperation::Delete {
            target: target.into(),
        }
    }

    pub fn merge(left: impl Into<Locator>, right: impl Into<Locator>, strategy: MergeStrategy) -> Self {
        StoreOperation::Merge {
            left: left.into(),
            right: right.into(),
            strategy,
        }
    }

    /// Operation name used in logs and batch failure records
    pub fn name(&self) -> &'static str {
        match self {
            StoreOperation::Create { .. } => "create",
            StoreOperation::Update { .. } => "update",
            StoreOperation::Delete { .. } => "delete",
            StoreOperation::Merge { .. } => "merge",
            StoreOperation::Query(_) => "query",
        }
    }

    /// Short human-readable target, e.g. `update tasks/t1`
    pub fn describe(&self) -> String {
        match self {
            StoreOperation::Create { store_id, snapshot } => match &snapshot.id {
                Some(id) => format!("create {}/{}", store_id, id),
                None => format!("create {}/<new>", store_id),
            },
            StoreOperation::Update { target, .. } => format!("update {}", target),
            StoreOperation::Delete { target } => format!("delete {}", target),
            StoreOperation::Merge { left, right, .. } => format!("merge {} <- {}", left, right),
            StoreOperation::Query(query) => format!("query {}", query.describe()),
        }
    }
}

/// Cross-store read queries
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotQuery {
    All,
    Category(Category),
    Tag(String),
    /// Inclusive on both ends
    DateRange {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
    Priority(Priority),
}

impl SnapshotQuery {
    fn describe(&self) -> String {
        match self {
            SnapshotQuery::All => "all".to_string(),
            SnapshotQuery::Category(c) => format!("category={}", c),
            SnapshotQuery::Tag(t) => format!("tag={}", t),
            SnapshotQuery::DateRange { from, to } => {
                format!("range={}..{}", from.to_rfc3339(), to.to_rfc3339())
            }
            SnapshotQuery::Priority(p) => format!("priority={}", p.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SnapshotRef;
    use serde_json::json;

    #[test]
    fn test_describe_names_target() {
        let op = StoreOperation::create("tasks", NewSnapshot::new(json!({})).with_id("t1"));
        assert_eq!(op.describe(), "create tasks/t1");

        let op = StoreOperation::delete(SnapshotRef::new("tasks", "t2"));
        assert_eq!(op.describe(), "delete tasks/t2");
        assert_eq!(op.name(), "delete");

        let op = StoreOperation::Query(SnapshotQuery::Tag("urgent".to_string()));
        assert_eq!(op.describe(), "query tag=urgent");
    }
}
