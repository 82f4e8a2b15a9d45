//! Snapshot container
//!
//! One query surface over N stores. Callers address snapshots through a
//! `Locator` and do not need to know which store holds an id. The container
//! is an explicit object owned by the application bootstrap (`init` /
//! `dispose`) and passed by reference to whatever needs it; there is no
//! ambient instance.
//!
//! All stores share one subscription registry and one set of injected
//! collaborators (clock, id generator, eviction policy).

mod hierarchy;
pub mod index;
pub mod locator;
mod validation;

pub use index::CrossStoreIndex;
pub use locator::{Locator, ANY_STORE};

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::config::{ContainerConfig, StoreConfig};
use crate::diff::{self, CompareMode, SnapshotDiff};
use crate::errors::{Result, SnapStoreError};
use crate::model::{
    Category, NewSnapshot, Priority, Snapshot, SnapshotId, SnapshotPatch, SnapshotRef, StoreId,
    SubscriptionId,
};
use crate::store::{MergeStrategy, Resolver, ResolverError, SnapshotFilter, SnapshotStore, StoreEnv};
use crate::subscription::{Callback, Selector, SubscriptionRegistry};
use crate::{log_op_end, log_op_error, log_op_start};

/// Ordering of cross-store query results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Timestamp descending; ties keep store registration then insertion order
    #[default]
    NewestFirst,
    OldestFirst,
    /// Store registration order, then insertion order within a store
    Insertion,
}

impl SortOrder {
    fn apply(self, snapshots: &mut [Snapshot]) {
        match self {
            SortOrder::NewestFirst => snapshots.sort_by(|a, b| b.timestamp.cmp(&a.timestamp)),
            SortOrder::OldestFirst => snapshots.sort_by(|a, b| a.timestamp.cmp(&b.timestamp)),
            SortOrder::Insertion => {}
        }
    }
}

#[derive(Debug)]
pub struct SnapshotContainer {
    /// Store ids in registration order
    order: Vec<StoreId>,
    stores: HashMap<StoreId, SnapshotStore>,
    registry: Arc<SubscriptionRegistry>,
    env: StoreEnv,
    history_depth: usize,
    index: CrossStoreIndex,
}

impl SnapshotContainer {
    /// Build a container and register every configured store
    ///
    /// # Errors
    ///
    /// Returns `Config` when the configuration is invalid.
    pub fn init(config: &ContainerConfig) -> Result<Self> {
        Self::init_with_env(config, StoreEnv::default())
    }

    /// Same as `init`, with injected collaborators
    ///
    /// # Errors
    ///
    /// Returns `Config` when the configuration is invalid.
    pub fn init_with_env(config: &ContainerConfig, env: StoreEnv) -> Result<Self> {
        log_op_start!("container_init", item_count = config.stores.len() as u64);
        let start = Instant::now();

        let result = Self::init_impl(config, env).map_err(|e| {
            log_op_error!(
                "container_init",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64
            );
            e
        })?;

        log_op_end!(
            "container_init",
            duration_ms = start.elapsed().as_millis() as u64,
            item_count = result.order.len() as u64
        );
        Ok(result)
    }

    fn init_impl(config: &ContainerConfig, env: StoreEnv) -> Result<Self> {
        config.validate()?;
        let mut container = Self {
            order: Vec::new(),
            stores: HashMap::new(),
            registry: SubscriptionRegistry::new(),
            env,
            history_depth: config.history_depth,
            index: CrossStoreIndex::new(),
        };
        for store in &config.stores {
            container.register_store(store.clone())?;
        }
        Ok(container)
    }

    /// Tear the container down, dropping every store and subscription
    pub fn dispose(self) {
        log_op_start!("container_dispose", item_count = self.order.len() as u64);
        let start = Instant::now();
        let snapshots = self.len() as u64;
        let subscriptions = self.registry.len() as u64;
        drop(self);
        log_op_end!(
            "container_dispose",
            duration_ms = start.elapsed().as_millis() as u64,
            snapshots = snapshots,
            subscriptions = subscriptions
        );
    }

    /// # Errors
    ///
    /// - `StoreAlreadyExists` when the id is taken
    /// - `Config` when the store configuration is invalid
    pub fn register_store(&mut self, config: StoreConfig) -> Result<&SnapshotStore> {
        let store_id = config.store_id.clone();
        if self.stores.contains_key(&store_id) {
            return Err(SnapStoreError::StoreAlreadyExists { store_id });
        }
        let store = SnapshotStore::with_parts(
            config,
            self.history_depth,
            self.registry.clone(),
            self.env.clone(),
        )?;
        tracing::debug!(store_id = %store_id, "store registered");
        self.order.push(store_id.clone());
        let store = self.stores.entry(store_id).or_insert(store);
        Ok(&*store)
    }

    /// # Errors
    ///
    /// Returns `StoreNotFound` when no store is registered under `store_id`.
    pub fn store(&self, store_id: &StoreId) -> Result<&SnapshotStore> {
        self.stores
            .get(store_id)
            .ok_or_else(|| SnapStoreError::StoreNotFound {
                store_id: store_id.clone(),
            })
    }

    /// Direct mutable access to one store
    ///
    /// Changes made this way bypass the cross-store index, which is marked
    /// dirty and rebuilt on demand, and do not detach links held in other
    /// stores.
    ///
    /// # Errors
    ///
    /// Returns `StoreNotFound` when no store is registered under `store_id`.
    pub fn store_mut(&mut self, store_id: &StoreId) -> Result<&mut SnapshotStore> {
        self.index.mark_dirty();
        self.slot(store_id)
    }

    fn slot(&mut self, store_id: &StoreId) -> Result<&mut SnapshotStore> {
        self.stores
            .get_mut(store_id)
            .ok_or_else(|| SnapStoreError::StoreNotFound {
                store_id: store_id.clone(),
            })
    }

    pub fn store_ids(&self) -> &[StoreId] {
        &self.order
    }

    /// Stores in registration order
    pub fn stores(&self) -> impl Iterator<Item = &SnapshotStore> {
        self.order.iter().filter_map(move |id| self.stores.get(id))
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    pub fn index(&self) -> &CrossStoreIndex {
        &self.index
    }

    /// Live snapshots across all stores
    pub fn len(&self) -> usize {
        self.stores().map(SnapshotStore::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ===== Lookup =====

    /// Resolve a locator to the live snapshot it names
    ///
    /// # Errors
    ///
    /// - `NotFound` when no live snapshot matches (store `*` for bare ids)
    /// - `AmbiguousId` when a bare id is live in more than one store
    /// - `StoreNotFound` when a qualified locator names an unknown store
    pub fn resolve(&self, locator: &Locator) -> Result<SnapshotRef> {
        match locator {
            Locator::Ref(r) => {
                self.store(&r.store_id)?.require(&r.id)?;
                Ok(r.clone())
            }
            Locator::Id(id) => {
                let candidates: Vec<StoreId> = self
                    .stores()
                    .filter(|s| s.contains(id))
                    .map(|s| s.store_id().clone())
                    .collect();
                match candidates.as_slice() {
                    [] => Err(SnapStoreError::NotFound {
                        store_id: StoreId::from(ANY_STORE),
                        id: id.clone(),
                    }),
                    [only] => Ok(SnapshotRef::new(only.clone(), id.clone())),
                    _ => Err(SnapStoreError::AmbiguousId {
                        id: id.clone(),
                        candidates,
                    }),
                }
            }
        }
    }

    /// Live snapshot without sweeping
    ///
    /// # Errors
    ///
    /// Same as `resolve`.
    pub fn peek(&self, locator: &Locator) -> Result<&Snapshot> {
        let r = self.resolve(locator)?;
        self.store(&r.store_id)?.require(&r.id)
    }

    /// Live snapshot; hitting an expired entry sweeps first
    pub fn get(&mut self, locator: &Locator) -> Option<&Snapshot> {
        self.sweep_if_expired(locator);
        self.peek(locator).ok()
    }

    /// Owned copy of a live snapshot; hitting an expired entry sweeps first
    ///
    /// # Errors
    ///
    /// Same as `resolve`.
    pub fn fetch(&mut self, locator: &Locator) -> Result<Snapshot> {
        self.sweep_if_expired(locator);
        self.peek(locator).cloned()
    }

    /// Live snapshot behind an already-qualified reference
    fn lookup(&self, reference: &SnapshotRef) -> Option<&Snapshot> {
        self.stores.get(&reference.store_id)?.peek(&reference.id)
    }

    /// Live snapshots of every store in registration then insertion order
    fn live(&self) -> impl Iterator<Item = &Snapshot> {
        self.stores().flat_map(SnapshotStore::snapshots)
    }

    pub fn contains(&self, locator: &Locator) -> bool {
        self.resolve(locator).is_ok()
    }

    fn sweep_if_expired(&mut self, locator: &Locator) {
        let expired = match locator {
            Locator::Ref(r) => self
                .stores
                .get(&r.store_id)
                .is_some_and(|s| s.holds_expired(&r.id)),
            Locator::Id(id) => self.stores.values().any(|s| s.holds_expired(id)),
        };
        if expired {
            self.sweep_expired();
        }
    }

    // ===== Mutations =====

    /// # Errors
    ///
    /// - `StoreNotFound` when the store is not registered
    /// - whatever `SnapshotStore::create` returns
    pub fn create(&mut self, store_id: &StoreId, new: NewSnapshot) -> Result<Snapshot> {
        // An expired holder of the id must leave through the container sweep
        // so links held by other stores are released first.
        if let Some(id) = &new.id {
            self.sweep_if_expired(&Locator::qualified(store_id.clone(), id.clone()));
        }
        let created = self.slot(store_id)?.create(new)?;
        self.index.upsert(&created);
        Ok(created)
    }

    /// # Errors
    ///
    /// - `NotFound` / `AmbiguousId` when the locator does not resolve
    /// - whatever `SnapshotStore::update` returns
    pub fn update(&mut self, locator: &Locator, patch: SnapshotPatch) -> Result<Snapshot> {
        self.sweep_if_expired(locator);
        let r = self.resolve(locator)?;
        let updated = self.slot(&r.store_id)?.update(&r.id, patch)?;
        self.index.upsert(&updated);
        Ok(updated)
    }

    /// Remove a snapshot and detach its links in every store
    ///
    /// Returns `Ok(false)` when nothing live matches; removal is idempotent.
    ///
    /// # Errors
    ///
    /// - `AmbiguousId` when a bare id is live in several stores
    /// - `StoreNotFound` when a qualified locator names an unknown store
    pub fn remove(&mut self, locator: &Locator) -> Result<bool> {
        let r = match self.resolve(locator) {
            Ok(r) => r,
            Err(e) if e.is_not_found() => return Ok(false),
            Err(e) => return Err(e),
        };
        let Some(removed) = self.slot(&r.store_id)?.take(&r.id) else {
            return Ok(false);
        };
        self.detach_foreign_links(&removed);
        self.index.forget(&r);
        Ok(true)
    }

    /// Merge `right` into `left` with a caller-supplied resolver
    ///
    /// The result replaces `left` as a new version in its store.
    ///
    /// # Errors
    ///
    /// - `NotFound` / `AmbiguousId` when either locator does not resolve
    /// - `MergeConflict` when the resolver fails
    pub fn merge<F>(&mut self, left: &Locator, right: &Locator, mut resolver: F) -> Result<Snapshot>
    where
        F: FnMut(&str, &Value, &Value) -> std::result::Result<Value, ResolverError>,
    {
        self.merge_using(left, right, &mut resolver)
    }

    /// # Errors
    ///
    /// Returns `NotFound` / `AmbiguousId` when either locator does not resolve.
    pub fn merge_with(
        &mut self,
        left: &Locator,
        right: &Locator,
        strategy: MergeStrategy,
    ) -> Result<Snapshot> {
        let mut resolver = {
            let l = self.peek(left)?;
            let r = self.peek(right)?;
            strategy.resolver_for(l, r)
        };
        self.merge_using(left, right, &mut resolver)
    }

    /// # Errors
    ///
    /// - `NotFound` / `AmbiguousId` when either locator does not resolve
    /// - `MergeConflict` when the resolver fails
    pub fn merge_using(
        &mut self,
        left: &Locator,
        right: &Locator,
        resolver: &mut dyn Resolver,
    ) -> Result<Snapshot> {
        let l = self.resolve(left)?;
        let r = self.resolve(right)?;
        let merged = if l.store_id == r.store_id {
            self.slot(&l.store_id)?.merge_using(&l.id, &r.id, resolver)?
        } else {
            let other = self.store(&r.store_id)?.require(&r.id)?.clone();
            self.slot(&l.store_id)?
                .merge_external(&l.id, &other, resolver)?
        };
        self.index.upsert(&merged);
        Ok(merged)
    }

    /// Bring a remote copy into the store it names
    ///
    /// Unknown ids are imported as they are; live ids are merged with
    /// `strategy`, the local copy on the left.
    ///
    /// # Errors
    ///
    /// - `StoreNotFound` when the copy names an unregistered store
    /// - `MergeConflict` / `InvalidCategory` from the store
    pub fn reconcile(&mut self, remote: Snapshot, strategy: MergeStrategy) -> Result<Snapshot> {
        let store_id = remote.store_id.clone();
        self.sweep_if_expired(&Locator::qualified(store_id.clone(), remote.id.clone()));
        let reconciled = self.slot(&store_id)?.reconcile(remote, strategy)?;
        self.index.upsert(&reconciled);
        Ok(reconciled)
    }

    /// Evict expired snapshots in every store
    ///
    /// Returns the evicted references in store registration order.
    pub fn sweep_expired(&mut self) -> Vec<SnapshotRef> {
        let mut evicted = Vec::new();
        for store_id in self.order.clone() {
            if let Some(store) = self.stores.get_mut(&store_id) {
                evicted.extend(store.sweep_collect());
            }
        }
        for snapshot in &evicted {
            self.detach_foreign_links(snapshot);
            self.index.forget(&snapshot.reference());
        }
        evicted.iter().map(Snapshot::reference).collect()
    }

    /// Drop links to `removed` held by snapshots in other stores
    fn detach_foreign_links(&mut self, removed: &Snapshot) {
        let reference = removed.reference();
        if let Some(parent) = &removed.parent {
            if parent.store_id != removed.store_id {
                if let Some(store) = self.stores.get_mut(&parent.store_id) {
                    store.detach_child(&parent.id, &reference);
                }
            }
        }
        for child in &removed.child_ids {
            if child.store_id != removed.store_id {
                if let Some(store) = self.stores.get_mut(&child.store_id) {
                    store.release_child(&child.id, &reference);
                }
            }
        }
    }

    // ===== Queries =====

    /// Live snapshots of every store, optionally filtered, in `order`
    ///
    /// Sorting is stable. Never mutates.
    pub fn get_all_snapshots(&self, filter: Option<&SnapshotFilter>, order: SortOrder) -> Vec<Snapshot> {
        let mut all = self.collect(filter.unwrap_or(&SnapshotFilter::All));
        order.apply(&mut all);
        all
    }

    /// Same as `get_all_snapshots` with a caller ordering
    pub fn get_all_snapshots_by<C>(&self, filter: Option<&SnapshotFilter>, mut compare: C) -> Vec<Snapshot>
    where
        C: FnMut(&Snapshot, &Snapshot) -> Ordering,
    {
        let mut all = self.collect(filter.unwrap_or(&SnapshotFilter::All));
        all.sort_by(|a, b| compare(a, b));
        all
    }

    fn collect(&self, filter: &SnapshotFilter) -> Vec<Snapshot> {
        self.stores()
            .flat_map(|s| s.select(filter))
            .cloned()
            .collect()
    }

    /// Apply `f` to one live snapshot without touching the store's copy
    ///
    /// Returns `None` when the store or id is absent.
    pub fn map_snapshot<U, F>(&self, store_id: &StoreId, id: &SnapshotId, f: F) -> Option<U>
    where
        F: FnOnce(&Snapshot) -> U,
    {
        self.stores.get(store_id)?.peek(id).map(f)
    }

    /// Live snapshots of a category across stores, newest first
    ///
    /// Served from the cross-store index unless it is dirty.
    pub fn by_category(&self, category: &Category) -> Vec<Snapshot> {
        let mut found: Vec<Snapshot> = if self.index.is_dirty() {
            self.collect(&SnapshotFilter::Category(category.clone()))
        } else {
            self.index
                .refs(category)
                .filter_map(|r| self.stores.get(&r.store_id)?.peek(&r.id))
                .filter(|s| s.category.as_ref() == Some(category))
                .cloned()
                .collect()
        };
        SortOrder::NewestFirst.apply(&mut found);
        found
    }

    pub fn by_tag(&self, tag: &str) -> Vec<Snapshot> {
        self.get_all_snapshots(Some(&SnapshotFilter::tag(tag)), SortOrder::NewestFirst)
    }

    /// Snapshots stamped within `[from, to]`, newest first
    pub fn by_date_range(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<Snapshot> {
        let filter = SnapshotFilter::predicate(move |s| s.timestamp >= from && s.timestamp <= to);
        self.get_all_snapshots(Some(&filter), SortOrder::NewestFirst)
    }

    pub fn by_priority(&self, priority: Priority) -> Vec<Snapshot> {
        let filter = SnapshotFilter::predicate(move |s| s.metadata.priority == Some(priority));
        self.get_all_snapshots(Some(&filter), SortOrder::NewestFirst)
    }

    /// Rebuild the cross-store index from a full scan
    pub fn rebuild_index(&mut self) {
        log_op_start!("rebuild_index");
        let start = Instant::now();
        let stores = &self.stores;
        let live = self
            .order
            .iter()
            .filter_map(|id| stores.get(id))
            .flat_map(SnapshotStore::snapshots);
        self.index.rebuild(live);
        log_op_end!(
            "rebuild_index",
            duration_ms = start.elapsed().as_millis() as u64,
            item_count = self.index.len() as u64
        );
    }

    // ===== Comparison =====

    /// Structural diff; each side reports its store and version
    ///
    /// # Errors
    ///
    /// Same as `resolve`, for either side.
    pub fn compare_snapshots(
        &self,
        left: &Locator,
        right: &Locator,
        mode: CompareMode,
    ) -> Result<SnapshotDiff> {
        Ok(diff::compare_snapshots(self.peek(left)?, self.peek(right)?, mode))
    }

    /// Diff of the `data` payloads only
    ///
    /// # Errors
    ///
    /// Same as `resolve`, for either side.
    pub fn compare_snapshot_items(
        &self,
        left: &Locator,
        right: &Locator,
        mode: CompareMode,
    ) -> Result<SnapshotDiff> {
        Ok(diff::compare_snapshot_data(self.peek(left)?, self.peek(right)?, mode))
    }

    // ===== Subscriptions =====

    pub fn subscribe(&self, selector: Selector, callback: Callback) -> SubscriptionId {
        self.registry.subscribe(selector, callback)
    }

    /// # Errors
    ///
    /// Same as `resolve`.
    pub fn subscribe_snapshot(&mut self, locator: &Locator, callback: Callback) -> Result<SubscriptionId> {
        let r = self.resolve(locator)?;
        self.slot(&r.store_id)?.subscribe_snapshot(&r.id, callback)
    }

    /// Idempotent; returns whether the subscription was live
    pub fn unsubscribe(&mut self, sub: SubscriptionId) -> bool {
        for store in self.stores.values_mut() {
            store.forget_subscriber(sub);
        }
        self.registry.unsubscribe(sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ids::SequentialIdGenerator;
    use chrono::TimeZone;
    use serde_json::json;

    fn container() -> (SnapshotContainer, ManualClock) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let mut config = ContainerConfig::default();
        config.stores.push(StoreConfig::new("tasks").with_default_category("task"));
        config.stores.push(StoreConfig::new("teams").with_default_category("team"));
        let env = StoreEnv::new()
            .with_clock(clock.clone())
            .with_ids(SequentialIdGenerator::new("s"));
        (SnapshotContainer::init_with_env(&config, env).unwrap(), clock)
    }

    #[test]
    fn test_bare_id_ambiguity() {
        let (mut c, _) = container();
        c.create(&"tasks".into(), NewSnapshot::new(json!({})).with_id("x")).unwrap();
        assert!(c.resolve(&Locator::from("x")).is_ok());

        c.create(&"teams".into(), NewSnapshot::new(json!({})).with_id("x")).unwrap();
        let err = c.resolve(&Locator::from("x")).unwrap_err();
        match err {
            SnapStoreError::AmbiguousId { candidates, .. } => {
                assert_eq!(candidates, vec![StoreId::from("tasks"), StoreId::from("teams")]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(c.resolve(&Locator::qualified("teams", "x")).is_ok());
    }

    #[test]
    fn test_register_duplicate_store() {
        let (mut c, _) = container();
        let err = c.register_store(StoreConfig::new("tasks")).unwrap_err();
        assert!(matches!(err, SnapStoreError::StoreAlreadyExists { .. }));
    }

    #[test]
    fn test_index_follows_category_change() {
        let (mut c, _) = container();
        c.create(&"tasks".into(), NewSnapshot::new(json!({})).with_id("t1")).unwrap();
        assert_eq!(c.by_category(&"task".into()).len(), 1);

        c.update(
            &Locator::from("t1"),
            SnapshotPatch::new().with_category("subtask"),
        )
        .unwrap();
        assert!(c.by_category(&"task".into()).is_empty());
        assert_eq!(c.by_category(&"subtask".into()).len(), 1);
    }

    #[test]
    fn test_store_mut_marks_index_dirty() {
        let (mut c, _) = container();
        c.store_mut(&"tasks".into())
            .unwrap()
            .create(NewSnapshot::new(json!({})).with_id("raw"))
            .unwrap();
        assert!(c.index().is_dirty());
        // dirty index falls back to a scan
        assert_eq!(c.by_category(&"task".into()).len(), 1);

        c.rebuild_index();
        assert!(!c.index().is_dirty());
        assert_eq!(c.by_category(&"task".into()).len(), 1);
    }

    #[test]
    fn test_get_all_snapshots_newest_first() {
        let (mut c, clock) = container();
        c.create(&"tasks".into(), NewSnapshot::new(json!({})).with_id("old")).unwrap();
        clock.advance(chrono::Duration::seconds(1));
        c.create(&"teams".into(), NewSnapshot::new(json!({})).with_id("new")).unwrap();

        let ids: Vec<String> = c
            .get_all_snapshots(None, SortOrder::NewestFirst)
            .iter()
            .map(|s| s.id.to_string())
            .collect();
        assert_eq!(ids, vec!["new", "old"]);

        let ids: Vec<String> = c
            .get_all_snapshots(None, SortOrder::Insertion)
            .iter()
            .map(|s| s.id.to_string())
            .collect();
        assert_eq!(ids, vec!["old", "new"]);
    }

    #[test]
    fn test_map_snapshot_is_a_query() {
        let (mut c, _) = container();
        c.create(&"tasks".into(), NewSnapshot::new(json!({"n": 2})).with_id("t1")).unwrap();

        let doubled = c.map_snapshot(&"tasks".into(), &"t1".into(), |s| {
            s.data["n"].as_i64().unwrap_or_default() * 2
        });
        assert_eq!(doubled, Some(4));
        assert_eq!(c.map_snapshot(&"tasks".into(), &"nope".into(), |_| ()), None);
        assert_eq!(c.peek(&Locator::from("t1")).unwrap().data, json!({"n": 2}));
    }
}
