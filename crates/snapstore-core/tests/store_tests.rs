#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::time::Duration;

use serde_json::json;
use snapstore_core::diff::CompareMode;
use snapstore_core::{
    NewSnapshot, Priority, SnapStoreError, SnapshotFilter, SnapshotId, SnapshotPatch,
};

use common::{task, task_store};

#[test]
fn test_create_then_get_round_trips() {
    // Given: an empty task store
    let (mut store, clock) = task_store();

    // When: creating a snapshot
    let created = store
        .create(task("t1", "Write docs").with_tag("urgent"))
        .unwrap();

    // Then: it reads back as created, stamped with the clock
    let read = store.get(&"t1".into()).unwrap();
    assert_eq!(read, &created);
    assert_eq!(read.data, json!({ "title": "Write docs" }));
    assert_eq!(read.version(), 1);
    assert!(read.has_tag("urgent"));
    assert_eq!(read.timestamp, snapstore_core::clock::Clock::now(&clock));
}

#[test]
fn test_create_generates_id_when_none_given() {
    let (mut store, _clock) = task_store();

    let created = store
        .create(NewSnapshot::new(json!({})).with_category("task"))
        .unwrap();

    assert_eq!(created.id, SnapshotId::from("snap-1"));
}

#[test]
fn test_create_rejects_live_duplicate() {
    let (mut store, _clock) = task_store();
    store.create(task("t1", "first")).unwrap();

    let err = store.create(task("t1", "second")).unwrap_err();

    assert!(matches!(err, SnapStoreError::AlreadyExists { .. }));
    assert_eq!(store.get(&"t1".into()).unwrap().data["title"], "first");
}

#[test]
fn test_update_advances_timestamp_and_keeps_untouched_fields() {
    // Given: a prioritised snapshot
    let (mut store, _clock) = task_store();
    let v1 = store
        .create(
            task("t1", "Draft")
                .with_priority(Priority::High)
                .with_tag("docs"),
        )
        .unwrap();

    // When: patching only the payload, without moving the clock
    let v2 = store
        .update(
            &"t1".into(),
            SnapshotPatch::data(json!({ "status": "done" })),
        )
        .unwrap();

    // Then: the new version is strictly later and keeps everything else
    assert!(v2.timestamp > v1.timestamp);
    assert_eq!(v2.version(), 2);
    assert_eq!(v2.metadata.parent_version, Some(1));
    assert_eq!(v2.data, json!({ "title": "Draft", "status": "done" }));
    assert_eq!(v2.metadata.priority, Some(Priority::High));
    assert!(v2.has_tag("docs"));
    assert_eq!(v2.category, v1.category);

    // And the previous version is retained unchanged
    let history = store.history(&"t1".into());
    assert_eq!(history.len(), 1);
    assert_eq!(history[0], &v1);
}

#[test]
fn test_update_of_unknown_id_is_not_found() {
    let (mut store, _clock) = task_store();
    store.create(task("t1", "only")).unwrap();

    let err = store
        .update(&"zzz".into(), SnapshotPatch::data(json!({ "x": 1 })))
        .unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(store.len(), 1);
}

#[test]
fn test_remove_is_idempotent() {
    let (mut store, _clock) = task_store();
    store.create(task("t1", "gone soon")).unwrap();

    assert!(store.remove(&"t1".into()));
    assert!(!store.remove(&"t1".into()));
    assert!(store.get(&"t1".into()).is_none());
    assert!(store.is_empty());
}

#[test]
fn test_remove_parent_detaches_children() {
    // Given: a parent with one same-store child
    let (mut store, _clock) = task_store();
    store.create(task("p", "parent")).unwrap();
    store
        .create(
            NewSnapshot::new(json!({}))
                .with_id("c")
                .with_category("subtask")
                .with_parent("p"),
        )
        .unwrap();

    // When: the parent is removed
    store.remove(&"p".into());

    // Then: the child stays, without a parent
    let child = store.get(&"c".into()).unwrap();
    assert!(child.parent.is_none());
}

#[test]
fn test_create_with_unknown_parent_fails() {
    let (mut store, _clock) = task_store();

    let err = store
        .create(task("c", "orphan").with_parent("nobody"))
        .unwrap_err();

    assert!(matches!(err, SnapStoreError::ParentNotFound { .. }));
    assert!(store.is_empty());
}

#[test]
fn test_expired_snapshot_is_hidden_before_any_sweep() {
    // Given: a short-lived snapshot and a core snapshot with the same TTL
    let (mut store, clock) = task_store();
    store
        .create(task("temp", "temporary").with_max_age(Duration::from_secs(60)))
        .unwrap();
    store
        .create(
            task("pinned", "core")
                .with_max_age(Duration::from_secs(60))
                .core(),
        )
        .unwrap();

    // When: the TTL elapses
    clock.advance(chrono::Duration::seconds(61));

    // Then: reads without sweeping already hide the expired one
    assert!(store.peek(&"temp".into()).is_none());
    assert!(!store.contains(&"temp".into()));
    assert_eq!(store.len(), 1);
    assert_eq!(store.ids(), vec![SnapshotId::from("pinned")]);

    // And the core snapshot survives a sweep
    let evicted = store.sweep_expired();
    assert_eq!(evicted, vec![SnapshotId::from("temp")]);
    assert!(store.get(&"pinned".into()).is_some());
}

#[test]
fn test_get_on_expired_entry_sweeps() {
    let (mut store, clock) = task_store();
    store
        .create(task("temp", "temporary").with_max_age(Duration::from_secs(5)))
        .unwrap();
    clock.advance(chrono::Duration::seconds(10));

    assert!(store.get(&"temp".into()).is_none());
    // already evicted by the get above
    assert!(store.sweep_expired().is_empty());
}

#[test]
fn test_expired_id_can_be_recreated() {
    let (mut store, clock) = task_store();
    store
        .create(task("t1", "old").with_max_age(Duration::from_secs(5)))
        .unwrap();
    clock.advance(chrono::Duration::seconds(10));

    let fresh = store.create(task("t1", "new")).unwrap();

    assert_eq!(fresh.version(), 1);
    assert_eq!(store.get(&"t1".into()).unwrap().data["title"], "new");
}

#[test]
fn test_category_validation() {
    let (mut store, _clock) = task_store();

    // missing category on a store that requires one
    let err = store
        .create(NewSnapshot::new(json!({})).with_id("x"))
        .unwrap_err();
    assert!(matches!(
        err,
        SnapStoreError::InvalidCategory { category: None, .. }
    ));

    // category outside the accepted set
    let err = store
        .create(NewSnapshot::new(json!({})).with_id("y").with_category("note"))
        .unwrap_err();
    assert!(matches!(err, SnapStoreError::InvalidCategory { .. }));

    // patch to a rejected category leaves the snapshot untouched
    store.create(task("t1", "ok")).unwrap();
    let err = store
        .update(&"t1".into(), SnapshotPatch::new().with_category("note"))
        .unwrap_err();
    assert!(matches!(err, SnapStoreError::InvalidCategory { .. }));
    assert_eq!(store.get(&"t1".into()).unwrap().version(), 1);
}

#[test]
fn test_filter_returns_insertion_order() {
    // Given: snapshots created in a known order
    let (mut store, clock) = task_store();
    for (id, tag) in [("c", "x"), ("a", "x"), ("b", "y"), ("d", "x")] {
        store.create(task(id, id).with_tag(tag)).unwrap();
        clock.advance(chrono::Duration::seconds(1));
    }
    // updating does not move an entry
    store
        .update(&"c".into(), SnapshotPatch::new().add_tag("late"))
        .unwrap();

    // When: filtering by tag
    let found = store.filter(&SnapshotFilter::tag("x"));

    // Then: matches come back in insertion order
    let ids: Vec<String> = found.iter().map(|s| s.id.to_string()).collect();
    assert_eq!(ids, vec!["c", "a", "d"]);
}

#[test]
fn test_filter_by_predicate_never_mutates() {
    let (mut store, _clock) = task_store();
    store.create(task("a", "alpha")).unwrap();
    store.create(task("b", "beta")).unwrap();

    let found = store.filter(&SnapshotFilter::predicate(|s| s.data["title"] == "beta"));

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, SnapshotId::from("b"));
    assert_eq!(store.get(&"b".into()).unwrap().version(), 1);
}

#[test]
fn test_failing_resolver_reports_conflict_with_both_sides() {
    // Given: two snapshots disagreeing on a field
    let (mut store, _clock) = task_store();
    let left = store.create(task("l", "left title")).unwrap();
    let right = store.create(task("r", "right title")).unwrap();

    // When: the resolver refuses
    let err = store
        .merge(&"l".into(), &"r".into(), |_field, _l, _r| {
            Err("refusing to pick".into())
        })
        .unwrap_err();

    // Then: the conflict carries both snapshots and neither changed
    match err {
        SnapStoreError::MergeConflict {
            field,
            left: l,
            right: r,
            message,
        } => {
            assert_eq!(field, "title");
            assert_eq!(*l, left);
            assert_eq!(*r, right);
            assert!(message.contains("refusing"));
        }
        other => panic!("expected MergeConflict, got {other:?}"),
    }
    assert_eq!(store.get(&"l".into()).unwrap(), &left);
    assert_eq!(store.get(&"r".into()).unwrap(), &right);
}

#[test]
fn test_merge_keeps_one_sided_keys_and_resolves_conflicts() {
    let (mut store, _clock) = task_store();
    store
        .create(NewSnapshot::new(json!({ "a": 1, "shared": "l" })).with_id("l").with_category("task"))
        .unwrap();
    store
        .create(NewSnapshot::new(json!({ "b": 2, "shared": "r" })).with_id("r").with_category("task"))
        .unwrap();

    let merged = store
        .merge(&"l".into(), &"r".into(), |_, l, r| {
            Ok(json!(format!("{}+{}", l.as_str().unwrap_or(""), r.as_str().unwrap_or(""))))
        })
        .unwrap();

    assert_eq!(merged.data, json!({ "a": 1, "b": 2, "shared": "l+r" }));
    assert_eq!(merged.id, SnapshotId::from("l"));
    assert_eq!(merged.version(), 2);
}

#[test]
fn test_compare_versions_from_history() {
    // Given: a snapshot updated twice
    let (mut store, _clock) = task_store();
    store.create(task("t1", "v1")).unwrap();
    store
        .update(&"t1".into(), SnapshotPatch::data(json!({ "title": "v2" })))
        .unwrap();
    store
        .update(&"t1".into(), SnapshotPatch::new().add_tag("reviewed"))
        .unwrap();

    // When: comparing the first and the current version
    let diff = store
        .compare_versions(&"t1".into(), 1, 3, CompareMode::Deep)
        .unwrap();

    // Then: the payload change and the tag change are both reported
    assert_eq!(diff.left.version, 1);
    assert_eq!(diff.right.version, 3);
    assert_eq!(diff.version_delta, 2);
    assert!(diff.change_at("data.title").is_some());
    assert!(diff.paths().iter().any(|p| p.starts_with("metadata.tags")));

    // And a version never written is not found
    let err = store
        .compare_versions(&"t1".into(), 1, 9, CompareMode::Deep)
        .unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_batch_create_partial_failure() {
    let (mut store, _clock) = task_store();
    store.create(task("dup", "exists")).unwrap();

    let outcome = store
        .batch_create(vec![
            task("a", "a"),
            task("dup", "again"),
            task("b", "b").with_parent("a"),
        ])
        .unwrap();

    assert_eq!(outcome.fulfilled.len(), 2);
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].index, 1);
    assert!(store.get(&"b".into()).unwrap().parent.is_some());
}
