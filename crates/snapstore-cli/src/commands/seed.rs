//! Seed file loading
//!
//! A seed is a JSON array of snapshots:
//!
//! ```json
//! [
//!   { "store": "tasks", "id": "t1", "category": "task", "data": { "title": "Plan" },
//!     "tags": ["q3"], "priority": "high" },
//!   { "store": "tasks", "id": "t2", "data": {}, "parent": "tasks/t1" }
//! ]
//! ```
//!
//! Stores the configuration does not declare are registered with defaults.
//! Parents are linked after every item is created, so order does not matter.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use serde::Deserialize;
use serde_json::Value;
use snapstore_core::{
    ContainerConfig, Locator, NewSnapshot, Priority, SnapStoreError, SnapshotContainer,
    StoreConfig, StoreId,
};

#[derive(Debug, Args)]
pub struct SeedArgs {
    /// Seed file (JSON array of snapshots)
    #[arg(long)]
    pub seed: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedItem {
    pub store: String,
    pub id: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    /// Locator of the parent, `store/id` or a bare id
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub core: bool,
}

impl SeedItem {
    fn to_new_snapshot(&self) -> NewSnapshot {
        let mut new = NewSnapshot::new(self.data.clone()).with_id(self.id.as_str());
        if let Some(category) = &self.category {
            new = new.with_category(category.as_str());
        }
        for tag in &self.tags {
            new = new.with_tag(tag.as_str());
        }
        if let Some(priority) = self.priority {
            new = new.with_priority(priority);
        }
        if self.core {
            new = new.core();
        }
        new
    }
}

pub fn read_seed(path: &Path) -> anyhow::Result<Vec<SeedItem>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read seed {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid seed {}", path.display()))
}

/// A parent link the container refused
#[derive(Debug)]
pub struct LinkFailure {
    pub child: String,
    pub parent: String,
    pub error: SnapStoreError,
}

/// Build a container from `config` and populate it from the seed file
///
/// Link failures are returned rather than raised, so that callers can report
/// them alongside other hierarchy violations.
pub fn populate(
    config: &ContainerConfig,
    args: &SeedArgs,
) -> anyhow::Result<(SnapshotContainer, Vec<LinkFailure>)> {
    let items = read_seed(&args.seed)?;

    let mut config = config.clone();
    for item in &items {
        if !config.stores.iter().any(|s| s.store_id.as_str() == item.store) {
            config.stores.push(StoreConfig::new(item.store.as_str()));
        }
    }
    let mut container = SnapshotContainer::init(&config)?;

    for item in &items {
        container
            .create(&StoreId::from(item.store.as_str()), item.to_new_snapshot())
            .with_context(|| format!("seed item {}/{}", item.store, item.id))?;
    }

    let mut failures = Vec::new();
    for item in &items {
        let Some(parent) = &item.parent else {
            continue;
        };
        let child = Locator::qualified(item.store.as_str(), item.id.as_str());
        if let Err(error) = container.add_child(&Locator::parse(parent), &child, None) {
            failures.push(LinkFailure {
                child: child.to_string(),
                parent: parent.clone(),
                error,
            });
        }
    }
    Ok((container, failures))
}

/// Same as `populate`, failing on the first refused link
pub fn load_container(config: &ContainerConfig, args: &SeedArgs) -> anyhow::Result<SnapshotContainer> {
    let (container, failures) = populate(config, args)?;
    if let Some(failure) = failures.into_iter().next() {
        return Err(anyhow::Error::new(failure.error)
            .context(format!("linking {} under {}", failure.child, failure.parent)));
    }
    Ok(container)
}
