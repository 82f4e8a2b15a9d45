use std::sync::{Arc, Mutex};

use chrono::{TimeZone, Utc};
use serde_json::json;
use snapstore_core::clock::ManualClock;
use snapstore_core::ids::SequentialIdGenerator;
use snapstore_core::subscription::{callback, Callback, SnapshotEvent};
use snapstore_core::{
    ContainerConfig, NewSnapshot, SnapshotContainer, SnapshotStore, StoreConfig, StoreEnv,
};

/// Deterministic collaborators starting at 2024-01-01T00:00:00Z
#[allow(dead_code)]
pub fn test_env() -> (StoreEnv, ManualClock) {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    let env = StoreEnv::new()
        .with_clock(clock.clone())
        .with_ids(SequentialIdGenerator::new("snap"));
    (env, clock)
}

/// Standalone "tasks" store accepting `task` and `subtask`, category required
#[allow(dead_code)]
pub fn task_store() -> (SnapshotStore, ManualClock) {
    let (env, clock) = test_env();
    let store = SnapshotStore::new(
        StoreConfig::new("tasks")
            .accept("task")
            .accept("subtask")
            .require_category(),
    )
    .unwrap()
    .with_env(env);
    (store, clock)
}

/// Container with a "tasks" store (category required) and a "teams" store
#[allow(dead_code)]
pub fn test_container() -> (SnapshotContainer, ManualClock) {
    let mut config = ContainerConfig::default();
    config.stores.push(
        StoreConfig::new("tasks")
            .with_default_category("task")
            .accept("task")
            .accept("subtask")
            .require_category(),
    );
    config
        .stores
        .push(StoreConfig::new("teams").with_default_category("team"));
    let (env, clock) = test_env();
    let container = SnapshotContainer::init_with_env(&config, env).unwrap();
    (container, clock)
}

/// A `task` snapshot with a title payload
#[allow(dead_code)]
pub fn task(id: &str, title: &str) -> NewSnapshot {
    NewSnapshot::new(json!({ "title": title }))
        .with_id(id)
        .with_category("task")
}

/// Callback recording every event it receives
#[allow(dead_code)]
pub fn recorder() -> (Callback, Arc<Mutex<Vec<SnapshotEvent>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let cb = callback(move |event| {
        sink.lock().unwrap().push(event.clone());
        Ok(())
    });
    (cb, seen)
}
