#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use serde_json::json;
use snapstore_core::core_types::schema::{
    EVENT_END, EVENT_END_ERROR, EVENT_START, FIELD_DURATION_MS, FIELD_ERR_CODE, FIELD_SNAPSHOT_ID,
};
use snapstore_core::errors::SnapStoreError;
use snapstore_core::logging_facility::test_capture::init_test_capture;
use snapstore_core::{log_op_end, log_op_error, log_op_start};
use snapstore_core::{Locator, NewSnapshot, SnapshotPatch, StoreId};

use common::{task, task_store, test_container};

#[test]
fn test_log_op_start_macro() {
    let capture = init_test_capture();
    let op_name = "test_log_op_start_unique_1";

    log_op_start!(op_name, store_id = "tasks");

    let events = capture.find(|e| e.is(op_name, EVENT_START));
    assert_eq!(events.len(), 1, "Should have exactly one start event");
    assert_eq!(events[0].field("store_id"), Some("tasks"));
}

#[test]
fn test_log_op_end_macro() {
    let capture = init_test_capture();
    let op_name = "test_log_op_end_unique_2";

    log_op_end!(op_name, duration_ms = 42);

    let events = capture.find(|e| e.is(op_name, EVENT_END));
    assert_eq!(events.len(), 1, "Should have exactly one end event");
    assert_eq!(events[0].field(FIELD_DURATION_MS), Some("42"));
}

#[test]
fn test_log_op_error_includes_code() {
    let capture = init_test_capture();
    let op_name = "test_log_op_error_unique_3";

    let err = SnapStoreError::StoreNotFound {
        store_id: "nope".into(),
    };
    log_op_error!(op_name, err, duration_ms = 10);

    let events = capture.find(|e| e.is(op_name, EVENT_END_ERROR));
    assert_eq!(events.len(), 1, "Should have exactly one error event");
    assert_eq!(events[0].field(FIELD_ERR_CODE), Some("ERR_STORE_NOT_FOUND"));
}

#[test]
fn test_create_logs_start_and_end() {
    // Given: a capture and a store
    let capture = init_test_capture();
    let (mut store, _clock) = task_store();

    // When: creating a snapshot with an id no other test uses
    store.create(task("log-create-1", "logged")).unwrap();

    // Then: the end event names the new snapshot
    let ends = capture.find(|e| {
        e.is("create_snapshot", EVENT_END) && e.field(FIELD_SNAPSHOT_ID) == Some("log-create-1")
    });
    assert_eq!(ends.len(), 1);
    assert_eq!(ends[0].field("store_id"), Some("tasks"));
    capture.assert_event_exists("create_snapshot", EVENT_START);
}

#[test]
fn test_failed_update_logs_end_error_only() {
    let capture = init_test_capture();
    let (mut store, _clock) = task_store();

    let result = store.update(
        &"log-missing-7".into(),
        SnapshotPatch::data(json!({ "x": 1 })),
    );
    assert!(result.is_err());

    let for_id = |event: &str| {
        capture.count_events(|e| {
            e.is("update_snapshot", event) && e.field(FIELD_SNAPSHOT_ID) == Some("log-missing-7")
        })
    };
    assert_eq!(for_id(EVENT_START), 1);
    assert_eq!(for_id(EVENT_END_ERROR), 1);
    assert_eq!(for_id(EVENT_END), 0);

    let errors = capture.find(|e| {
        e.is("update_snapshot", EVENT_END_ERROR) && e.field(FIELD_SNAPSHOT_ID) == Some("log-missing-7")
    });
    assert_eq!(errors[0].field(FIELD_ERR_CODE), Some("ERR_NOT_FOUND"));
}

#[test]
fn test_hierarchy_errors_are_logged_with_code() {
    let capture = init_test_capture();
    let (mut c, _clock) = test_container();
    c.create(&StoreId::from("tasks"), task("log-parent-9", "p"))
        .unwrap();

    let _ = c.add_child(
        &Locator::from("log-parent-9"),
        &Locator::from("log-parent-9"),
        None,
    );

    let errors = capture.find(|e| {
        e.is("add_child", EVENT_END_ERROR) && e.field("parent") == Some("log-parent-9")
    });
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].field(FIELD_ERR_CODE), Some("ERR_CYCLE_DETECTED"));
}

#[test]
fn test_container_init_is_logged() {
    let capture = init_test_capture();

    let (c, _clock) = test_container();
    c.dispose();

    capture.assert_event_exists("container_init", EVENT_END);
    capture.assert_event_exists("container_dispose", EVENT_END);
}

#[test]
fn test_remove_logs_whether_anything_was_removed() {
    let capture = init_test_capture();
    let (mut store, _clock) = task_store();
    store
        .create(NewSnapshot::new(json!({})).with_id("log-rm-4").with_category("task"))
        .unwrap();

    store.remove(&"log-rm-4".into());
    store.remove(&"log-rm-4".into());

    let removed: Vec<Option<String>> = capture
        .find(|e| e.is("remove_snapshot", EVENT_END) && e.field(FIELD_SNAPSHOT_ID) == Some("log-rm-4"))
        .iter()
        .map(|e| e.field("removed").map(str::to_string))
        .collect();
    assert_eq!(
        removed,
        vec![Some("true".to_string()), Some("false".to_string())]
    );
}
