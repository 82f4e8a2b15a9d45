//! Single dispatch point for tagged store operations
//!
//! `apply()` routes each `StoreOperation` variant to the container call that
//! implements it, so callers holding a list of heterogeneous operations need
//! one interface instead of the container's full method surface.
//!
//! ## Atomicity Contract
//!
//! - **All-or-nothing per operation**: a failed operation leaves the
//!   container exactly as it was
//! - **No panics**: invalid input returns typed errors
//! - **Queries never mutate** beyond the lazy TTL sweep every read performs
//!
//! ## Example
//!
//! ```
//! use snapstore_core::apply::{apply, OperationOutcome};
//! use snapstore_core::commands::StoreOperation;
//! use snapstore_core::config::{ContainerConfig, StoreConfig};
//! use snapstore_core::container::SnapshotContainer;
//! use snapstore_core::model::NewSnapshot;
//!
//! let mut config = ContainerConfig::default();
//! config.stores.push(StoreConfig::new("tasks"));
//! let mut container = SnapshotContainer::init(&config).unwrap();
//!
//! let op = StoreOperation::create("tasks", NewSnapshot::new(serde_json::json!({"title": "A"})));
//! let outcome = apply(&mut container, op).unwrap();
//! assert!(matches!(outcome, OperationOutcome::Created(_)));
//! ```

use crate::commands::{SnapshotQuery, StoreOperation};
use crate::container::{SnapshotContainer, SortOrder};
use crate::errors::Result;
use crate::model::Snapshot;

/// Result of one applied operation
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutcome {
    Created(Snapshot),
    Updated(Snapshot),
    /// `removed` is false when the target was already absent
    Deleted { removed: bool },
    Merged(Snapshot),
    /// Matches, newest first
    Queried(Vec<Snapshot>),
}

impl OperationOutcome {
    /// The snapshot a mutating operation produced
    pub fn snapshot(&self) -> Option<&Snapshot> {
        match self {
            OperationOutcome::Created(s)
            | OperationOutcome::Updated(s)
            | OperationOutcome::Merged(s) => Some(s),
            OperationOutcome::Deleted { .. } | OperationOutcome::Queried(_) => None,
        }
    }
}

/// Apply one operation to a container
///
/// # Errors
///
/// Returns whatever the underlying container call returns: `NotFound`,
/// `AmbiguousId`, `InvalidCategory`, `AlreadyExists`, `MergeConflict`,
/// `StoreNotFound`. Deleting an absent target is not an error.
pub fn apply(container: &mut SnapshotContainer, op: StoreOperation) -> Result<OperationOutcome> {
    match op {
        StoreOperation::Create { store_id, snapshot } => {
            let created = container.create(&store_id, snapshot)?;
            Ok(OperationOutcome::Created(created))
        }

        StoreOperation::Update { target, patch } => {
            let updated = container.update(&target, patch)?;
            Ok(OperationOutcome::Updated(updated))
        }

        StoreOperation::Delete { target } => {
            let removed = container.remove(&target)?;
            Ok(OperationOutcome::Deleted { removed })
        }

        StoreOperation::Merge {
            left,
            right,
            strategy,
        } => {
            let merged = container.merge_with(&left, &right, strategy)?;
            Ok(OperationOutcome::Merged(merged))
        }

        StoreOperation::Query(query) => {
            container.sweep_expired();
            let matches = match query {
                SnapshotQuery::All => container.get_all_snapshots(None, SortOrder::NewestFirst),
                SnapshotQuery::Category(category) => container.by_category(&category),
                SnapshotQuery::Tag(tag) => container.by_tag(&tag),
                SnapshotQuery::DateRange { from, to } => container.by_date_range(from, to),
                SnapshotQuery::Priority(priority) => container.by_priority(priority),
            };
            Ok(OperationOutcome::Queried(matches))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ContainerConfig, StoreConfig};
    use crate::errors::SnapStoreError;
    use crate::model::{NewSnapshot, SnapshotPatch, SnapshotRef};
    use crate::store::MergeStrategy;
    use serde_json::json;

    fn container() -> SnapshotContainer {
        let mut config = ContainerConfig::default();
        config.stores.push(StoreConfig::new("tasks").with_default_category("task"));
        SnapshotContainer::init(&config).unwrap()
    }

    #[test]
    fn test_apply_create_update_delete() {
        let mut c = container();

        let created = apply(
            &mut c,
            StoreOperation::create("tasks", NewSnapshot::new(json!({"title": "A"})).with_id("t1")),
        )
        .unwrap();
        assert_eq!(created.snapshot().unwrap().version(), 1);

        let updated = apply(
            &mut c,
            StoreOperation::update("t1", SnapshotPatch::data(json!({"title": "B"}))),
        )
        .unwrap();
        assert_eq!(updated.snapshot().unwrap().data, json!({"title": "B"}));

        let deleted = apply(&mut c, StoreOperation::delete("t1")).unwrap();
        assert_eq!(deleted, OperationOutcome::Deleted { removed: true });

        let again = apply(&mut c, StoreOperation::delete("t1")).unwrap();
        assert_eq!(again, OperationOutcome::Deleted { removed: false });
    }

    #[test]
    fn test_apply_update_missing_is_not_found() {
        let mut c = container();
        let err = apply(
            &mut c,
            StoreOperation::update(SnapshotRef::new("tasks", "zzz"), SnapshotPatch::new()),
        )
        .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_apply_merge_and_query() {
        let mut c = container();
        for (id, title) in [("a", "left"), ("b", "right")] {
            apply(
                &mut c,
                StoreOperation::create(
                    "tasks",
                    NewSnapshot::new(json!({ "title": title })).with_id(id).with_tag("x"),
                ),
            )
            .unwrap();
        }

        let merged = apply(
            &mut c,
            StoreOperation::merge("a", "b", MergeStrategy::PreferRight),
        )
        .unwrap();
        assert_eq!(merged.snapshot().unwrap().data, json!({"title": "right"}));

        let OperationOutcome::Queried(found) =
            apply(&mut c, StoreOperation::Query(SnapshotQuery::Tag("x".to_string()))).unwrap()
        else {
            panic!("expected query outcome");
        };
        assert_eq!(found.len(), 2);
        // newest first: the merge restamped "a"
        assert_eq!(found[0].id, crate::model::SnapshotId::from("a"));
    }

    #[test]
    fn test_apply_create_in_unknown_store() {
        let mut c = container();
        let err = apply(
            &mut c,
            StoreOperation::create("teams", NewSnapshot::new(json!({}))),
        )
        .unwrap_err();
        assert!(matches!(err, SnapStoreError::StoreNotFound { .. }));
    }
}
