#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use snapstore_core::errors::{ExError, ExErrorKind, SnapStoreError};
use snapstore_core::{Locator, SnapshotRef, StoreId};

use common::{task, test_container};

#[test]
fn test_error_kind_code_mapping() {
    let kinds = vec![
        (ExErrorKind::NotFound, "ERR_NOT_FOUND"),
        (ExErrorKind::StoreNotFound, "ERR_STORE_NOT_FOUND"),
        (ExErrorKind::AmbiguousSelection, "ERR_AMBIGUOUS_SELECTION"),
        (ExErrorKind::InvalidCategory, "ERR_INVALID_CATEGORY"),
        (ExErrorKind::MergeConflict, "ERR_MERGE_CONFLICT"),
        (ExErrorKind::ParentNotFound, "ERR_PARENT_NOT_FOUND"),
        (ExErrorKind::ChildNotFound, "ERR_CHILD_NOT_FOUND"),
        (ExErrorKind::MultipleParents, "ERR_MULTIPLE_PARENTS"),
        (ExErrorKind::CycleDetected, "ERR_CYCLE_DETECTED"),
        (ExErrorKind::BatchFailed, "ERR_BATCH_FAILED"),
        (ExErrorKind::Cancelled, "ERR_CANCELLED"),
        (ExErrorKind::Timeout, "ERR_TIMEOUT"),
    ];

    for (kind, expected_code) in kinds {
        assert_eq!(kind.code(), expected_code);
    }
}

#[test]
fn test_cycle_detected_carries_both_ends() {
    let err = SnapStoreError::CycleDetected {
        parent: SnapshotRef::new("tasks", "a"),
        child: SnapshotRef::new("teams", "b"),
    };

    let ex_err: ExError = err.into();

    assert_eq!(ex_err.kind(), ExErrorKind::CycleDetected);
    assert_eq!(ex_err.store_id(), Some("teams"));
    assert_eq!(ex_err.entity_id(), Some("b"));
    assert_eq!(ex_err.candidates(), Some(&["tasks/a".to_string()][..]));
}

#[test]
fn test_only_not_found_counts_as_not_found() {
    let not_found = SnapStoreError::NotFound {
        store_id: StoreId::from("tasks"),
        id: "x".into(),
    };
    let missing_store = SnapStoreError::StoreNotFound {
        store_id: StoreId::from("tasks"),
    };

    assert!(not_found.is_not_found());
    assert!(!missing_store.is_not_found());
}

#[test]
fn test_bare_id_not_found_reports_any_store() {
    let (c, _clock) = test_container();

    let err = c.resolve(&Locator::from("ghost")).unwrap_err();

    let ex_err: ExError = err.into();
    assert_eq!(ex_err.code(), "ERR_NOT_FOUND");
    assert_eq!(ex_err.store_id(), Some("*"));
    assert_eq!(ex_err.entity_id(), Some("ghost"));
}

#[test]
fn test_batch_failed_lists_every_target() {
    let (mut c, _clock) = test_container();
    let tasks = StoreId::from("tasks");
    c.create(&tasks, task("dup", "exists")).unwrap();

    let err = snapstore_core::BatchCoordinator::new(&mut c)
        .create(vec![
            (tasks.clone(), task("dup", "again")),
            (StoreId::from("nope"), task("x", "x")),
        ])
        .unwrap_err();

    let ex_err: ExError = err.into();
    assert_eq!(ex_err.kind(), ExErrorKind::BatchFailed);
    assert_eq!(
        ex_err.candidates(),
        Some(&["tasks/dup".to_string(), "nope/x".to_string()][..])
    );
}

#[test]
fn test_merge_conflict_message_is_renderable() {
    let (mut c, _clock) = test_container();
    let tasks = StoreId::from("tasks");
    c.create(&tasks, task("l", "left")).unwrap();
    c.create(&tasks, task("r", "right")).unwrap();

    let err = c
        .merge(&"l".into(), &"r".into(), |field, _, _| {
            Err(format!("no rule for {field}").into())
        })
        .unwrap_err();

    let rendered = ExError::from(err).to_string();
    assert!(rendered.starts_with("[ERR_MERGE_CONFLICT]"));
    assert!(rendered.contains("tasks/l"));
    assert!(rendered.contains("no rule for title"));
}
