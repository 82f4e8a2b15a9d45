#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use snapstore_core::subscription::callback;
use snapstore_core::{
    ContainerConfig, EventKind, Locator, NewSnapshot, Selector, SnapshotRef, StoreId,
};
use snapstore_engine::{sweep_once, Sweeper};

use common::shared_container;

async fn seed_expiring(container: &snapstore_engine::SharedContainer) {
    let tasks = StoreId::from("tasks");
    let mut guard = container.lock().await;
    guard
        .create(
            &tasks,
            NewSnapshot::new(json!({})).with_id("short").with_max_age(Duration::from_secs(30)),
        )
        .unwrap();
    guard
        .create(&tasks, NewSnapshot::new(json!({})).with_id("kept"))
        .unwrap();
}

#[tokio::test]
async fn test_sweep_once_evicts_only_expired() {
    // Given: one snapshot past its max age
    let (container, clock) = shared_container();
    seed_expiring(&container).await;
    clock.advance(chrono::Duration::seconds(31));

    // When: sweeping
    let evicted = sweep_once(&container).await;

    // Then: only that one is gone
    assert_eq!(evicted, vec![SnapshotRef::new("tasks", "short")]);
    let guard = container.lock().await;
    assert_eq!(guard.len(), 1);
    assert!(guard.contains(&Locator::from("kept")));
}

#[tokio::test]
async fn test_background_sweeper_evicts_and_shuts_down() {
    // Given: a running sweeper, an expired snapshot and a deletion watcher
    let (container, clock) = shared_container();
    seed_expiring(&container).await;
    let deleted = Arc::new(Mutex::new(Vec::new()));
    let sink = deleted.clone();
    container.lock().await.subscribe(
        Selector::Topic(StoreId::from("tasks")),
        callback(move |event| {
            if event.kind == EventKind::Deleted {
                sink.lock().unwrap().push(event.snapshot.reference());
            }
            Ok(())
        }),
    );
    let sweeper = Sweeper::spawn(container.clone(), Duration::from_millis(10));
    clock.advance(chrono::Duration::seconds(31));

    // When: a few intervals pass with no reads
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        if !deleted.lock().unwrap().is_empty() {
            break;
        }
    }

    // Then: the sweeper evicted it, and shutdown is clean
    assert_eq!(
        *deleted.lock().unwrap(),
        vec![SnapshotRef::new("tasks", "short")]
    );
    tokio_test::assert_ok!(sweeper.shutdown().await);
}

#[tokio::test]
async fn test_sweeper_from_config_respects_disabled_interval() {
    let (container, _clock) = shared_container();

    let disabled = ContainerConfig {
        sweep_interval_secs: 0,
        ..ContainerConfig::default()
    };
    assert!(Sweeper::from_config(container.clone(), &disabled).is_none());

    let enabled = ContainerConfig {
        sweep_interval_secs: 60,
        ..ContainerConfig::default()
    };
    let sweeper = Sweeper::from_config(container, &enabled).unwrap();
    tokio_test::assert_ok!(sweeper.shutdown().await);
}
