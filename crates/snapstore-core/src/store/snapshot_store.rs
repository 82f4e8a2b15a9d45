use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use super::env::StoreEnv;
use super::filter::SnapshotFilter;
use super::merge::{self, MergeFailure, MergeStrategy, Resolver, ResolverError};
use crate::batch::{self, BatchResult};
use crate::clock::MonotonicStamper;
use crate::config::StoreConfig;
use crate::diff::{self, CompareMode, SnapshotDiff};
use crate::errors::{Result, SnapStoreError};
use crate::model::patch::patched;
use crate::model::{
    Category, Metadata, NewSnapshot, Snapshot, SnapshotId, SnapshotPatch, SnapshotRef, StoreId,
    SubscriptionId,
};
use crate::subscription::{Callback, EventKind, Selector, SnapshotEvent, SubscriptionRegistry};
use crate::{log_op_end, log_op_error, log_op_start};

/// History depth used by stores built outside a container
const DEFAULT_HISTORY_DEPTH: usize = 8;

#[derive(Debug, Clone)]
struct StoreEntry {
    /// Insertion sequence; filter results follow it
    seq: u64,
    snapshot: Snapshot,
}

/// In-memory owner of one logical type's snapshots
///
/// All mutation is synchronous: a reader sees a snapshot either before or
/// after an update, never half-applied. Expired, non-core snapshots are
/// invisible to every read; `get` and `filter` also sweep them out.
#[derive(Debug)]
pub struct SnapshotStore {
    config: StoreConfig,
    history_depth: usize,
    items: HashMap<SnapshotId, StoreEntry>,
    next_seq: u64,
    /// Previous versions per id, oldest first
    history: HashMap<SnapshotId, VecDeque<Snapshot>>,
    registry: Arc<SubscriptionRegistry>,
    env: StoreEnv,
    stamper: MonotonicStamper,
}

impl SnapshotStore {
    /// Standalone store with its own registry and default collaborators
    ///
    /// # Errors
    ///
    /// Returns `Config` when the store configuration is invalid.
    pub fn new(config: StoreConfig) -> Result<Self> {
        let depth = config.history_depth.unwrap_or(DEFAULT_HISTORY_DEPTH);
        Self::with_parts(config, depth, SubscriptionRegistry::new(), StoreEnv::default())
    }

    /// Store wired to shared collaborators
    ///
    /// `history_depth` applies unless the store configuration overrides it.
    ///
    /// # Errors
    ///
    /// Returns `Config` when the store configuration is invalid.
    pub fn with_parts(
        config: StoreConfig,
        history_depth: usize,
        registry: Arc<SubscriptionRegistry>,
        env: StoreEnv,
    ) -> Result<Self> {
        config.validate()?;
        let stamper = MonotonicStamper::new(env.clock.clone());
        Ok(Self {
            history_depth: config.history_depth.unwrap_or(history_depth),
            config,
            items: HashMap::new(),
            next_seq: 0,
            history: HashMap::new(),
            registry,
            env,
            stamper,
        })
    }

    /// Replace the injected collaborators
    pub fn with_env(mut self, env: StoreEnv) -> Self {
        self.stamper = MonotonicStamper::new(env.clock.clone());
        self.env = env;
        self
    }

    pub fn store_id(&self) -> &StoreId {
        &self.config.store_id
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.stamper.now()
    }

    // ===== Reads =====

    fn is_visible(snapshot: &Snapshot, now: DateTime<Utc>) -> bool {
        snapshot.is_core || !snapshot.is_expired(now)
    }

    /// Live snapshot by id without sweeping
    pub fn peek(&self, id: &SnapshotId) -> Option<&Snapshot> {
        let now = self.now();
        self.items
            .get(id)
            .map(|e| &e.snapshot)
            .filter(|s| Self::is_visible(s, now))
    }

    /// Live snapshot by id
    ///
    /// Hitting an expired entry triggers a sweep and returns `None`.
    pub fn get(&mut self, id: &SnapshotId) -> Option<&Snapshot> {
        if self.holds_expired(id) {
            self.sweep_expired();
            return None;
        }
        self.items.get(id).map(|e| &e.snapshot)
    }

    /// Live snapshot by id, or `NotFound`
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the id is absent or expired.
    pub fn require(&self, id: &SnapshotId) -> Result<&Snapshot> {
        self.peek(id).ok_or_else(|| self.not_found(id))
    }

    pub fn contains(&self, id: &SnapshotId) -> bool {
        self.peek(id).is_some()
    }

    /// Number of live snapshots
    pub fn len(&self) -> usize {
        let now = self.now();
        self.items
            .values()
            .filter(|e| Self::is_visible(&e.snapshot, now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live snapshots in insertion order
    pub fn snapshots(&self) -> Vec<&Snapshot> {
        self.select(&SnapshotFilter::All)
    }

    /// Live snapshot ids in insertion order
    pub fn ids(&self) -> Vec<SnapshotId> {
        self.snapshots().into_iter().map(|s| s.id.clone()).collect()
    }

    /// Matching live snapshots in insertion order, without sweeping
    pub fn select(&self, filter: &SnapshotFilter) -> Vec<&Snapshot> {
        let now = self.now();
        let mut entries: Vec<&StoreEntry> = self
            .items
            .values()
            .filter(|e| Self::is_visible(&e.snapshot, now) && filter.matches(&e.snapshot))
            .collect();
        entries.sort_by_key(|e| e.seq);
        entries.into_iter().map(|e| &e.snapshot).collect()
    }

    /// Matching snapshots in insertion order
    ///
    /// Sweeps expired entries first; never mutates a snapshot.
    pub fn filter(&mut self, filter: &SnapshotFilter) -> Vec<Snapshot> {
        self.sweep_expired();
        self.select(filter).into_iter().cloned().collect()
    }

    /// Retained previous versions of `id`, oldest first
    pub fn history(&self, id: &SnapshotId) -> Vec<&Snapshot> {
        self.history
            .get(id)
            .map(|h| h.iter().collect())
            .unwrap_or_default()
    }

    /// A specific version of `id`, current or retained
    pub fn version(&self, id: &SnapshotId, version: u64) -> Option<&Snapshot> {
        self.peek(id)
            .filter(|s| s.version() == version)
            .or_else(|| {
                self.history
                    .get(id)
                    .and_then(|h| h.iter().find(|s| s.version() == version))
            })
    }

    // ===== Mutations =====

    /// Create a snapshot
    ///
    /// An expired snapshot holding the requested id is evicted first. The id
    /// is generated when `new` carries none, and the timestamp comes from the
    /// store's stamper.
    ///
    /// # Arguments
    /// * `new` - Payload, optional id, category, parent and metadata overrides
    ///
    /// # Returns
    /// The stored snapshot at version 1
    ///
    /// # Errors
    ///
    /// - `AlreadyExists` when the id is held by a live snapshot
    /// - `InvalidCategory` when the category is missing but required, or not accepted
    /// - `ParentNotFound` when the same-store parent is absent
    pub fn create(&mut self, new: NewSnapshot) -> Result<Snapshot> {
        log_op_start!("create_snapshot", store_id = %self.config.store_id);
        let start = Instant::now();

        let result = self.create_impl(new).map_err(|e| {
            log_op_error!(
                "create_snapshot",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64,
                store_id = %self.config.store_id
            );
            e
        })?;

        log_op_end!(
            "create_snapshot",
            duration_ms = start.elapsed().as_millis() as u64,
            store_id = %self.config.store_id,
            snapshot_id = %result.id
        );
        Ok(result)
    }

    fn create_impl(&mut self, new: NewSnapshot) -> Result<Snapshot> {
        let id = new.id.unwrap_or_else(|| self.env.ids.next_id());
        if self.contains(&id) {
            return Err(SnapStoreError::AlreadyExists {
                store_id: self.config.store_id.clone(),
                id,
            });
        }
        // An expired entry under the same id is evicted, not overwritten silently
        if self.items.contains_key(&id) {
            self.evict(&id);
        }

        let category = new
            .category
            .or_else(|| self.config.default_category.clone());
        self.validate_category(category.as_ref())?;

        let parent = match new.parent {
            Some(parent_id) => {
                if !self.contains(&parent_id) {
                    return Err(SnapStoreError::ParentNotFound {
                        parent: SnapshotRef::new(self.config.store_id.clone(), parent_id)
                            .to_string(),
                    });
                }
                Some(SnapshotRef::new(self.config.store_id.clone(), parent_id))
            }
            None => None,
        };

        let timestamp = self.stamper.stamp_after(None);
        let overrides = new.metadata.layered_over(&self.config.default_metadata());
        let max_age = match (new.expires_at, new.max_age) {
            (None, None) => self.config.default_ttl(),
            (_, max_age) => max_age,
        };

        let snapshot = Snapshot {
            id: id.clone(),
            store_id: self.config.store_id.clone(),
            category,
            timestamp,
            data: new.data,
            metadata: Arc::new(Metadata::initial(timestamp, &overrides)),
            parent: parent.clone(),
            child_ids: Vec::new(),
            subscribers: BTreeSet::new(),
            is_core: new.is_core,
            expires_at: new.expires_at,
            max_age,
        };

        self.insert_entry(snapshot.clone());
        if let Some(parent) = parent {
            self.attach_child(&parent.id, snapshot.reference());
        }

        self.publish(SnapshotEvent::new(EventKind::Created, snapshot.clone()));
        Ok(snapshot)
    }

    /// Apply a patch, producing a new version
    ///
    /// The previous version moves to history, bounded by the store's
    /// history depth.
    ///
    /// # Arguments
    /// * `id` - Snapshot to change
    /// * `patch` - Data merge patch, category and metadata changes
    ///
    /// # Returns
    /// The new version, with `parent_version` naming the one it replaced
    ///
    /// # Errors
    ///
    /// - `NotFound` when the id is absent or expired
    /// - `InvalidCategory` when the patch sets a category the store rejects
    pub fn update(&mut self, id: &SnapshotId, patch: SnapshotPatch) -> Result<Snapshot> {
        log_op_start!("update_snapshot", store_id = %self.config.store_id, snapshot_id = %id);
        let start = Instant::now();

        let result = self.update_impl(id, patch).map_err(|e| {
            log_op_error!(
                "update_snapshot",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64,
                snapshot_id = %id
            );
            e
        })?;

        log_op_end!(
            "update_snapshot",
            duration_ms = start.elapsed().as_millis() as u64,
            snapshot_id = %id,
            version = result.version()
        );
        Ok(result)
    }

    fn update_impl(&mut self, id: &SnapshotId, patch: SnapshotPatch) -> Result<Snapshot> {
        let current = self.require(id)?.clone();

        if let Some(category) = &patch.category {
            self.validate_category(Some(category))?;
        }

        let timestamp = self.stamper.stamp_after([current.timestamp]);
        let mut metadata = current.metadata.successor(timestamp);
        if patch.touches_metadata() {
            patch.apply_to_metadata(&mut metadata);
        }

        let mut next = current.clone();
        next.timestamp = timestamp;
        next.metadata = Arc::new(metadata);
        if let Some(data_patch) = &patch.data {
            next.data = patched(&current.data, data_patch);
        }
        if let Some(category) = patch.category {
            next.category = Some(category);
        }
        if let Some(is_core) = patch.is_core {
            next.is_core = is_core;
        }
        if let Some(expires_at) = patch.expires_at {
            next.expires_at = expires_at;
        }

        let previous = current.version();
        self.replace(current, next.clone());
        self.publish(
            SnapshotEvent::new(EventKind::Updated, next.clone()).with_previous_version(previous),
        );
        Ok(next)
    }

    /// Remove a snapshot; returns whether a live snapshot was removed
    ///
    /// Absent ids are a no-op. Same-store hierarchy links are detached:
    /// the parent forgets the child and children lose their parent. The
    /// children themselves stay.
    pub fn remove(&mut self, id: &SnapshotId) -> bool {
        self.take(id).is_some()
    }

    /// Remove a snapshot and return its last live version
    pub fn take(&mut self, id: &SnapshotId) -> Option<Snapshot> {
        log_op_start!("remove_snapshot", store_id = %self.config.store_id, snapshot_id = %id);
        let start = Instant::now();

        let removed = if self.contains(id) {
            self.evict(id)
        } else {
            None
        };

        log_op_end!(
            "remove_snapshot",
            duration_ms = start.elapsed().as_millis() as u64,
            snapshot_id = %id,
            removed = removed.is_some()
        );
        removed
    }

    /// Merge `b` into `a` with a caller-supplied resolver
    ///
    /// The result replaces `a` as a new version; `b` is left untouched.
    ///
    /// # Errors
    ///
    /// - `NotFound` when either id is absent
    /// - `MergeConflict` when the resolver fails, carrying both snapshots
    pub fn merge<F>(&mut self, a: &SnapshotId, b: &SnapshotId, mut resolver: F) -> Result<Snapshot>
    where
        F: FnMut(&str, &Value, &Value) -> std::result::Result<Value, ResolverError>,
    {
        self.merge_using(a, b, &mut resolver)
    }

    /// Merge `b` into `a` with a built-in strategy
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when either id is absent.
    pub fn merge_with(
        &mut self,
        a: &SnapshotId,
        b: &SnapshotId,
        strategy: MergeStrategy,
    ) -> Result<Snapshot> {
        let mut resolver = {
            let left = self.require(a)?;
            let right = self.require(b)?;
            strategy.resolver_for(left, right)
        };
        self.merge_using(a, b, &mut resolver)
    }

    /// Merge `b` into `a` through an arbitrary resolver
    ///
    /// # Arguments
    /// * `a` - Left side; the result replaces it as a new version
    /// * `b` - Right side; left unchanged
    /// * `resolver` - Decides fields whose values differ, in key order
    ///
    /// # Returns
    /// The merged snapshot as stored under `a`
    ///
    /// # Errors
    ///
    /// - `NotFound` when either id is absent
    /// - `MergeConflict` when the resolver fails
    pub fn merge_using(
        &mut self,
        a: &SnapshotId,
        b: &SnapshotId,
        resolver: &mut dyn Resolver,
    ) -> Result<Snapshot> {
        let other = SnapshotRef::new(self.config.store_id.clone(), b.clone());
        self.logged_merge(a, &other, |store| store.require(b).cloned(), resolver)
    }

    /// Merge a snapshot that lives elsewhere (another store, a remote copy)
    /// into `a`
    ///
    /// # Errors
    ///
    /// - `NotFound` when `a` is absent
    /// - `MergeConflict` when the resolver fails
    pub fn merge_external(
        &mut self,
        a: &SnapshotId,
        right: &Snapshot,
        resolver: &mut dyn Resolver,
    ) -> Result<Snapshot> {
        self.logged_merge(a, &right.reference(), |_| Ok(right.clone()), resolver)
    }

    fn logged_merge<F>(
        &mut self,
        a: &SnapshotId,
        other: &SnapshotRef,
        right: F,
        resolver: &mut dyn Resolver,
    ) -> Result<Snapshot>
    where
        F: FnOnce(&Self) -> Result<Snapshot>,
    {
        log_op_start!(
            "merge_snapshots",
            store_id = %self.config.store_id,
            snapshot_id = %a,
            other = %other
        );
        let start = Instant::now();

        let result = right(self)
            .and_then(|right| self.merge_impl(a, &right, resolver))
            .map_err(|e| {
                log_op_error!(
                    "merge_snapshots",
                    e.clone(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    snapshot_id = %a
                );
                e
            })?;

        log_op_end!(
            "merge_snapshots",
            duration_ms = start.elapsed().as_millis() as u64,
            snapshot_id = %a,
            version = result.version()
        );
        Ok(result)
    }

    fn merge_impl(
        &mut self,
        a: &SnapshotId,
        right: &Snapshot,
        resolver: &mut dyn Resolver,
    ) -> Result<Snapshot> {
        let left = self.require(a)?.clone();
        let timestamp = self.stamper.stamp_after([left.timestamp, right.timestamp]);

        let merged = merge::merge_snapshots(&left, right, resolver, timestamp).map_err(
            |MergeFailure { field, message }| SnapStoreError::MergeConflict {
                field,
                left: Box::new(left.clone()),
                right: Box::new(right.clone()),
                message,
            },
        )?;

        let previous = left.version();
        self.replace(left, merged.clone());
        self.publish(
            SnapshotEvent::new(EventKind::Merged, merged.clone()).with_previous_version(previous),
        );
        Ok(merged)
    }

    /// Bring a copy from the persistence collaborator into the store
    ///
    /// Unknown ids are imported as they are; known ids are merged with the
    /// given strategy.
    ///
    /// # Errors
    ///
    /// Returns `MergeConflict` when merging fails.
    pub fn reconcile(&mut self, remote: Snapshot, strategy: MergeStrategy) -> Result<Snapshot> {
        let mut remote = remote;
        remote.store_id = self.config.store_id.clone();
        match self.peek(&remote.id) {
            None => {
                self.import(remote.clone())?;
                Ok(remote)
            }
            Some(local) => {
                let mut resolver = strategy.resolver_for(local, &remote);
                let id = remote.id.clone();
                self.merge_external(&id, &remote, &mut resolver)
            }
        }
    }

    /// Insert a fully formed snapshot as it is
    ///
    /// Used to restore snapshots produced elsewhere. Hierarchy links are
    /// taken verbatim and are not checked here; run the container's
    /// hierarchy validation after importing.
    ///
    /// # Errors
    ///
    /// - `AlreadyExists` when the id is held by a live snapshot
    /// - `InvalidCategory` when the category is not accepted
    pub fn import(&mut self, snapshot: Snapshot) -> Result<()> {
        log_op_start!(
            "import_snapshot",
            store_id = %self.config.store_id,
            snapshot_id = %snapshot.id
        );
        let start = Instant::now();

        self.import_impl(snapshot).map_err(|e| {
            log_op_error!(
                "import_snapshot",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64,
                store_id = %self.config.store_id
            );
            e
        })?;

        log_op_end!(
            "import_snapshot",
            duration_ms = start.elapsed().as_millis() as u64,
            store_id = %self.config.store_id
        );
        Ok(())
    }

    fn import_impl(&mut self, mut snapshot: Snapshot) -> Result<()> {
        snapshot.store_id = self.config.store_id.clone();
        if self.contains(&snapshot.id) {
            return Err(SnapStoreError::AlreadyExists {
                store_id: self.config.store_id.clone(),
                id: snapshot.id,
            });
        }
        self.validate_category(snapshot.category.as_ref())?;
        if self.items.contains_key(&snapshot.id) {
            self.evict(&snapshot.id);
        }
        self.insert_entry(snapshot.clone());
        self.publish(SnapshotEvent::new(EventKind::Created, snapshot));
        Ok(())
    }

    // ===== Comparison =====

    /// Compare two live snapshots of this store
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when either id is absent.
    pub fn compare(&self, a: &SnapshotId, b: &SnapshotId, mode: CompareMode) -> Result<SnapshotDiff> {
        let left = self.require(a)?;
        let right = self.require(b)?;
        Ok(diff::compare_snapshots(left, right, mode))
    }

    /// Compare two versions of one snapshot from the retained history
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when either version is no longer retained.
    pub fn compare_versions(
        &self,
        id: &SnapshotId,
        from_version: u64,
        to_version: u64,
        mode: CompareMode,
    ) -> Result<SnapshotDiff> {
        let from = self
            .version(id, from_version)
            .ok_or_else(|| self.not_found(id))?;
        let to = self
            .version(id, to_version)
            .ok_or_else(|| self.not_found(id))?;
        Ok(diff::compare_snapshots(from, to, mode))
    }

    // ===== Expiry =====

    /// Evict expired, non-core snapshots the eviction policy releases
    ///
    /// Returns the evicted ids in insertion order. Evicting a parent
    /// detaches its children like `remove`.
    pub fn sweep_expired(&mut self) -> Vec<SnapshotId> {
        self.sweep_collect().into_iter().map(|s| s.id).collect()
    }

    /// Sweep and return the evicted snapshots with their hierarchy links
    pub(crate) fn sweep_collect(&mut self) -> Vec<Snapshot> {
        let now = self.now();
        let mut candidates: Vec<(u64, SnapshotId)> = self
            .items
            .values()
            .filter(|e| !e.snapshot.is_core && e.snapshot.is_expired(now))
            .filter(|e| self.env.eviction.should_evict(&e.snapshot, now))
            .map(|e| (e.seq, e.snapshot.id.clone()))
            .collect();
        if candidates.is_empty() {
            return Vec::new();
        }
        candidates.sort();

        log_op_start!("sweep_expired", store_id = %self.config.store_id);
        let start = Instant::now();

        let evicted: Vec<Snapshot> = candidates
            .into_iter()
            .filter_map(|(_, id)| self.evict(&id))
            .collect();

        log_op_end!(
            "sweep_expired",
            duration_ms = start.elapsed().as_millis() as u64,
            store_id = %self.config.store_id,
            evicted = evicted.len() as u64
        );
        evicted
    }

    /// True when `id` is held but no longer visible
    pub(crate) fn holds_expired(&self, id: &SnapshotId) -> bool {
        let now = self.now();
        self.items
            .get(id)
            .is_some_and(|e| !Self::is_visible(&e.snapshot, now))
    }

    // ===== Batch =====

    /// Create each item independently, in input order
    ///
    /// Later items may name earlier ones as parent.
    ///
    /// # Errors
    ///
    /// Returns `BatchFailed` only when every item of a non-empty batch failed.
    pub fn batch_create(&mut self, items: Vec<NewSnapshot>) -> BatchResult<Snapshot> {
        let store_id = self.config.store_id.clone();
        batch::run_batch(
            "batch_create",
            items,
            |item| match &item.id {
                Some(id) => SnapshotRef::new(store_id.clone(), id.clone()).to_string(),
                None => format!("{}/<new>", store_id),
            },
            |item| self.create(item),
        )
    }

    /// Update each item independently, in input order
    ///
    /// # Errors
    ///
    /// Returns `BatchFailed` only when every item of a non-empty batch failed.
    pub fn batch_update(&mut self, items: Vec<(SnapshotId, SnapshotPatch)>) -> BatchResult<Snapshot> {
        let store_id = self.config.store_id.clone();
        batch::run_batch(
            "batch_update",
            items,
            |(id, _)| SnapshotRef::new(store_id.clone(), id.clone()).to_string(),
            |(id, patch)| self.update(&id, patch),
        )
    }

    /// Fetch each id independently
    ///
    /// # Errors
    ///
    /// Returns `BatchFailed` only when every item of a non-empty batch failed.
    pub fn batch_fetch(&mut self, ids: &[SnapshotId]) -> BatchResult<Snapshot> {
        self.sweep_expired();
        let store_id = self.config.store_id.clone();
        batch::run_batch(
            "batch_fetch",
            ids.to_vec(),
            |id| SnapshotRef::new(store_id.clone(), id.clone()).to_string(),
            |id| self.require(&id).cloned(),
        )
    }

    // ===== Subscriptions =====

    /// Subscribe to events of this store
    pub fn subscribe(&self, selector: Selector, callback: Callback) -> SubscriptionId {
        self.registry.subscribe(selector, callback)
    }

    /// Subscribe to one snapshot and record the subscription on it
    ///
    /// Recording is membership tracking only and does not create a version.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the id is absent.
    pub fn subscribe_snapshot(&mut self, id: &SnapshotId, callback: Callback) -> Result<SubscriptionId> {
        let reference = self.require(id)?.reference();
        let sub = self.registry.subscribe(Selector::Snapshot(reference), callback);
        if let Some(entry) = self.items.get_mut(id) {
            entry.snapshot.subscribers.insert(sub);
        }
        Ok(sub)
    }

    /// Drop a subscription and forget it on any snapshot that recorded it
    pub fn unsubscribe(&mut self, sub: SubscriptionId) -> bool {
        self.forget_subscriber(sub);
        self.registry.unsubscribe(sub)
    }

    pub(crate) fn forget_subscriber(&mut self, sub: SubscriptionId) {
        for entry in self.items.values_mut() {
            entry.snapshot.subscribers.remove(&sub);
        }
    }

    // ===== Hierarchy plumbing (container) =====

    /// Record `child` under `parent_id`; no new version
    pub(crate) fn attach_child(&mut self, parent_id: &SnapshotId, child: SnapshotRef) {
        if let Some(entry) = self.items.get_mut(parent_id) {
            if !entry.snapshot.child_ids.contains(&child) {
                entry.snapshot.child_ids.push(child);
            }
        }
    }

    /// Forget `child` under `parent_id`; returns whether it was recorded
    pub(crate) fn detach_child(&mut self, parent_id: &SnapshotId, child: &SnapshotRef) -> bool {
        match self.items.get_mut(parent_id) {
            Some(entry) => {
                let before = entry.snapshot.child_ids.len();
                entry.snapshot.child_ids.retain(|c| c != child);
                entry.snapshot.child_ids.len() != before
            }
            None => false,
        }
    }

    /// Set or clear the structural parent of `id`; no new version
    pub(crate) fn set_parent(&mut self, id: &SnapshotId, parent: Option<SnapshotRef>) {
        if let Some(entry) = self.items.get_mut(id) {
            entry.snapshot.parent = parent;
        }
    }

    /// Clear the parent of `id` only if it still points at `parent`
    pub(crate) fn release_child(&mut self, id: &SnapshotId, parent: &SnapshotRef) -> bool {
        match self.items.get_mut(id) {
            Some(entry) if entry.snapshot.parent.as_ref() == Some(parent) => {
                entry.snapshot.parent = None;
                true
            }
            _ => false,
        }
    }

    // ===== Internals =====

    fn validate_category(&self, category: Option<&Category>) -> Result<()> {
        match category {
            None if self.config.require_category => Err(SnapStoreError::InvalidCategory {
                store_id: self.config.store_id.clone(),
                category: None,
                reason: "category is required".to_string(),
            }),
            Some(c) if !self.config.accepts(c) => Err(SnapStoreError::InvalidCategory {
                store_id: self.config.store_id.clone(),
                category: Some(c.clone()),
                reason: "category is not accepted by this store".to_string(),
            }),
            _ => Ok(()),
        }
    }

    fn not_found(&self, id: &SnapshotId) -> SnapStoreError {
        SnapStoreError::NotFound {
            store_id: self.config.store_id.clone(),
            id: id.clone(),
        }
    }

    fn insert_entry(&mut self, snapshot: Snapshot) {
        self.next_seq += 1;
        let seq = self.next_seq;
        self.items
            .insert(snapshot.id.clone(), StoreEntry { seq, snapshot });
    }

    /// Swap in a new version, keeping insertion order and history
    fn replace(&mut self, previous: Snapshot, next: Snapshot) {
        if self.history_depth > 0 {
            let history = self.history.entry(previous.id.clone()).or_default();
            history.push_back(previous);
            while history.len() > self.history_depth {
                history.pop_front();
            }
        }
        if let Some(entry) = self.items.get_mut(&next.id) {
            entry.snapshot = next;
        }
    }

    /// Physically remove an entry, detach same-store links, emit `deleted`
    fn evict(&mut self, id: &SnapshotId) -> Option<Snapshot> {
        let removed = self.items.remove(id)?.snapshot;
        self.history.remove(id);

        let reference = removed.reference();
        if let Some(parent) = &removed.parent {
            if parent.store_id == self.config.store_id {
                self.detach_child(&parent.id, &reference);
            }
        }
        for child in &removed.child_ids {
            if child.store_id == self.config.store_id {
                self.release_child(&child.id, &reference);
            }
        }

        self.publish(SnapshotEvent::new(EventKind::Deleted, removed.clone()));
        Some(removed)
    }

    fn publish(&self, event: SnapshotEvent) {
        let report = self.registry.notify(&event);
        if !report.failed.is_empty() {
            tracing::debug!(
                store_id = %self.config.store_id,
                snapshot_id = %event.snapshot.id,
                event_kind = event.kind.as_str(),
                failed = report.failed.len() as u64,
                "event delivered with subscriber failures"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::ids::SequentialIdGenerator;
    use crate::subscription::callback;
    use chrono::{Duration, TimeZone};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn store_with_clock() -> (SnapshotStore, ManualClock) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let store = SnapshotStore::new(StoreConfig::new("tasks").with_default_category("task"))
            .unwrap()
            .with_env(
                StoreEnv::new()
                    .with_clock(clock.clone())
                    .with_ids(SequentialIdGenerator::new("task")),
            );
        (store, clock)
    }

    #[test]
    fn test_create_assigns_id_and_defaults() {
        let (mut store, _) = store_with_clock();
        let s = store.create(NewSnapshot::new(json!({"title": "A"}))).unwrap();

        assert_eq!(s.id, SnapshotId::from("task-1"));
        assert_eq!(s.category, Some(Category::from("task")));
        assert_eq!(s.version(), 1);
        assert_eq!(store.peek(&s.id), Some(&s));
    }

    #[test]
    fn test_update_stamps_strictly_later_even_when_clock_stalls() {
        let (mut store, _clock) = store_with_clock();
        let s = store
            .create(NewSnapshot::new(json!({"title": "A"})).with_id("t1"))
            .unwrap();

        let updated = store
            .update(&s.id, SnapshotPatch::data(json!({"title": "B"})))
            .unwrap();

        assert!(updated.timestamp > s.timestamp);
        assert_eq!(updated.metadata.parent_version, Some(1));
        assert_eq!(store.history(&s.id).len(), 1);
    }

    #[test]
    fn test_history_is_bounded() {
        let clock = ManualClock::new(Utc::now());
        let mut store = SnapshotStore::new(StoreConfig::new("tasks").with_history_depth(2))
            .unwrap()
            .with_env(StoreEnv::new().with_clock(clock));
        let id = store
            .create(NewSnapshot::new(json!({"n": 0})).with_id("t1"))
            .unwrap()
            .id;
        for n in 1..=5 {
            store.update(&id, SnapshotPatch::data(json!({"n": n}))).unwrap();
        }

        let versions: Vec<u64> = store.history(&id).iter().map(|s| s.version()).collect();
        assert_eq!(versions, vec![4, 5]);
        assert_eq!(store.peek(&id).unwrap().version(), 6);
    }

    #[test]
    fn test_expired_entry_is_swept_on_get() {
        let (mut store, clock) = store_with_clock();
        let id = store
            .create(
                NewSnapshot::new(json!({}))
                    .with_id("t1")
                    .with_max_age(std::time::Duration::from_secs(10)),
            )
            .unwrap()
            .id;

        clock.advance(Duration::seconds(10));
        assert!(store.peek(&id).is_none());
        assert!(store.items.contains_key(&id));

        assert!(store.get(&id).is_none());
        assert!(!store.items.contains_key(&id));
    }

    #[test]
    fn test_deleted_event_on_sweep() {
        let (mut store, clock) = store_with_clock();
        let deleted = Arc::new(AtomicUsize::new(0));
        let d = deleted.clone();
        store.subscribe(
            Selector::All,
            callback(move |e| {
                if e.kind == EventKind::Deleted {
                    d.fetch_add(1, Ordering::SeqCst);
                }
                Ok(())
            }),
        );
        store
            .create(
                NewSnapshot::new(json!({}))
                    .with_id("t1")
                    .with_expires_at(clock.now() + Duration::seconds(1)),
            )
            .unwrap();

        clock.advance(Duration::seconds(2));
        let evicted = store.sweep_expired();

        assert_eq!(evicted, vec![SnapshotId::from("t1")]);
        assert_eq!(deleted.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscribe_snapshot_records_subscriber() {
        let (mut store, _) = store_with_clock();
        let id = store
            .create(NewSnapshot::new(json!({})).with_id("t1"))
            .unwrap()
            .id;

        let sub = store.subscribe_snapshot(&id, callback(|_| Ok(()))).unwrap();
        assert!(store.peek(&id).unwrap().subscribers.contains(&sub));
        assert_eq!(store.peek(&id).unwrap().version(), 1);

        assert!(store.unsubscribe(sub));
        assert!(store.peek(&id).unwrap().subscribers.is_empty());
    }
}
