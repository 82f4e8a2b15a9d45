use chrono::{TimeZone, Utc};
use serde_json::json;
use snapstore_core::clock::ManualClock;
use snapstore_core::ids::SequentialIdGenerator;
use snapstore_core::{ContainerConfig, NewSnapshot, Snapshot, SnapshotContainer, StoreConfig, StoreEnv, StoreId};
use snapstore_engine::{shared, SharedContainer};

/// Shared container with a "tasks" store, clock at 2024-01-01T00:00:00Z
#[allow(dead_code)]
pub fn shared_container() -> (SharedContainer, ManualClock) {
    let (container, clock) = container_with_prefix("snap");
    (shared(container), clock)
}

/// Unshared container; `prefix` names generated ids
#[allow(dead_code)]
pub fn container_with_prefix(prefix: &str) -> (SnapshotContainer, ManualClock) {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    let env = StoreEnv::new()
        .with_clock(clock.clone())
        .with_ids(SequentialIdGenerator::new(prefix));
    let mut config = ContainerConfig::default();
    config
        .stores
        .push(StoreConfig::new("tasks").with_default_category("task"));
    let container = SnapshotContainer::init_with_env(&config, env).unwrap();
    (container, clock)
}

/// A fully formed "tasks" snapshot, as a remote source would hold it
#[allow(dead_code)]
pub fn remote_task(id: &str, title: &str) -> Snapshot {
    let (mut origin, _clock) = container_with_prefix("remote");
    origin
        .create(
            &StoreId::from("tasks"),
            NewSnapshot::new(json!({ "title": title })).with_id(id),
        )
        .unwrap()
}
