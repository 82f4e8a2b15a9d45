use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use super::keys::{Category, SnapshotId, SnapshotRef, StoreId, SubscriptionId};
use super::metadata::{Metadata, MetadataOverrides, Priority};
use crate::errors::Result;

/// One versioned capture of a data payload
///
/// `parent` and `child_ids` are store-qualified keys, never object
/// references. A snapshot tracks membership of its children but does not own
/// their lifetime; removing a parent detaches its children and leaves them in
/// place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: SnapshotId,
    pub store_id: StoreId,
    pub category: Option<Category>,
    /// Creation or last-mutation instant, strictly increasing per id
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
    pub metadata: Arc<Metadata>,
    pub parent: Option<SnapshotRef>,
    pub child_ids: Vec<SnapshotRef>,
    pub subscribers: BTreeSet<SubscriptionId>,
    /// Core snapshots are exempt from TTL eviction
    pub is_core: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_age: Option<Duration>,
}

impl Snapshot {
    /// Store-qualified key of this snapshot
    pub fn reference(&self) -> SnapshotRef {
        SnapshotRef::new(self.store_id.clone(), self.id.clone())
    }

    pub fn version(&self) -> u64 {
        self.metadata.version
    }

    /// Effective expiry instant
    ///
    /// `expires_at` and `timestamp + max_age` both apply; the earlier wins.
    pub fn effective_expiry(&self) -> Option<DateTime<Utc>> {
        let by_age = self
            .max_age
            .and_then(|age| chrono::Duration::from_std(age).ok())
            .and_then(|age| self.timestamp.checked_add_signed(age));
        match (self.expires_at, by_age) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// True once the effective expiry has elapsed at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.effective_expiry().is_some_and(|at| at <= now)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.metadata.has_tag(tag)
    }

    pub fn has_child(&self, child: &SnapshotRef) -> bool {
        self.child_ids.contains(child)
    }

    /// Deserialise the opaque payload into a caller type
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.data.clone())?)
    }
}

/// Coarse lifecycle status used by store filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotStatus {
    Active,
    Inactive,
    Core,
}

impl SnapshotStatus {
    pub fn matches(&self, snapshot: &Snapshot) -> bool {
        match self {
            SnapshotStatus::Active => snapshot.metadata.is_active,
            SnapshotStatus::Inactive => !snapshot.metadata.is_active,
            SnapshotStatus::Core => snapshot.is_core,
        }
    }
}

/// Input to `SnapshotStore::create`
///
/// Unset fields fall back to the store's configuration: a generated id,
/// the default category, default tags and TTL.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NewSnapshot {
    pub id: Option<SnapshotId>,
    pub category: Option<Category>,
    pub data: serde_json::Value,
    pub metadata: MetadataOverrides,
    /// Parent within the same store
    pub parent: Option<SnapshotId>,
    pub is_core: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_age: Option<Duration>,
}

impl NewSnapshot {
    pub fn new(data: serde_json::Value) -> Self {
        Self {
            data,
            ..Self::default()
        }
    }

    /// Serialise a typed payload as the snapshot data
    pub fn from_typed<T: Serialize>(data: &T) -> Result<Self> {
        Ok(Self::new(serde_json::to_value(data)?))
    }

    pub fn with_id(mut self, id: impl Into<SnapshotId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<Category>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_metadata(mut self, metadata: MetadataOverrides) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.metadata.tags.insert(tag.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.metadata.priority = Some(priority);
        self
    }

    pub fn with_parent(mut self, parent: impl Into<SnapshotId>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn core(mut self) -> Self {
        self.is_core = true;
        self
    }

    pub fn with_expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }
}

/// Partial change applied by `SnapshotStore::update`
///
/// Only set fields are applied. `data` is a JSON merge patch: object keys
/// are merged recursively, `null` deletes a key, any other value replaces.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotPatch {
    pub data: Option<serde_json::Value>,
    pub category: Option<Category>,
    /// Replaces the whole tag set
    pub tags: Option<BTreeSet<String>>,
    pub add_tags: BTreeSet<String>,
    pub remove_tags: BTreeSet<String>,
    /// `null` removes the field
    pub custom_fields: BTreeMap<String, serde_json::Value>,
    pub is_active: Option<bool>,
    pub is_core: Option<bool>,
    pub priority: Option<Priority>,
    /// `Some(None)` clears the expiry
    pub expires_at: Option<Option<DateTime<Utc>>>,
    pub updated_by: Option<String>,
}

impl SnapshotPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data(data: serde_json::Value) -> Self {
        Self {
            data: Some(data),
            ..Self::default()
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_category(mut self, category: impl Into<Category>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    pub fn add_tag(mut self, tag: impl Into<String>) -> Self {
        self.add_tags.insert(tag.into());
        self
    }

    pub fn remove_tag(mut self, tag: impl Into<String>) -> Self {
        self.remove_tags.insert(tag.into());
        self
    }

    pub fn with_custom_field(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.custom_fields.insert(key.into(), value);
        self
    }

    pub fn with_active(mut self, is_active: bool) -> Self {
        self.is_active = Some(is_active);
        self
    }

    pub fn with_core(mut self, is_core: bool) -> Self {
        self.is_core = Some(is_core);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_expires_at(mut self, at: Option<DateTime<Utc>>) -> Self {
        self.expires_at = Some(at);
        self
    }

    pub fn with_updated_by(mut self, actor: impl Into<String>) -> Self {
        self.updated_by = Some(actor.into());
        self
    }

    /// True when the patch changes nothing
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// True when applying the patch touches the metadata record
    pub(crate) fn touches_metadata(&self) -> bool {
        self.tags.is_some()
            || !self.add_tags.is_empty()
            || !self.remove_tags.is_empty()
            || !self.custom_fields.is_empty()
            || self.is_active.is_some()
            || self.priority.is_some()
            || self.updated_by.is_some()
    }

    /// Apply the metadata part of this patch to a successor record
    pub(crate) fn apply_to_metadata(&self, metadata: &mut Metadata) {
        if let Some(tags) = &self.tags {
            metadata.tags = tags.clone();
        }
        metadata.tags.extend(self.add_tags.iter().cloned());
        for tag in &self.remove_tags {
            metadata.tags.remove(tag);
        }
        for (key, value) in &self.custom_fields {
            if value.is_null() {
                metadata.custom_fields.remove(key);
            } else {
                metadata.custom_fields.insert(key.clone(), value.clone());
            }
        }
        if let Some(is_active) = self.is_active {
            metadata.is_active = is_active;
        }
        if let Some(priority) = self.priority {
            metadata.priority = Some(priority);
        }
        if let Some(actor) = &self.updated_by {
            metadata.updated_by = Some(actor.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn snapshot_at(ts: DateTime<Utc>) -> Snapshot {
        Snapshot {
            id: SnapshotId::from("t1"),
            store_id: StoreId::from("tasks"),
            category: Some(Category::from("task")),
            timestamp: ts,
            data: json!({"title": "A"}),
            metadata: Arc::new(Metadata::initial(ts, &MetadataOverrides::new())),
            parent: None,
            child_ids: Vec::new(),
            subscribers: BTreeSet::new(),
            is_core: false,
            expires_at: None,
            max_age: None,
        }
    }

    #[test]
    fn test_effective_expiry_takes_earliest() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut s = snapshot_at(ts);
        assert_eq!(s.effective_expiry(), None);

        s.max_age = Some(Duration::from_secs(60));
        assert_eq!(s.effective_expiry(), Some(ts + chrono::Duration::seconds(60)));

        s.expires_at = Some(ts + chrono::Duration::seconds(30));
        assert_eq!(s.effective_expiry(), Some(ts + chrono::Duration::seconds(30)));

        assert!(!s.is_expired(ts + chrono::Duration::seconds(29)));
        assert!(s.is_expired(ts + chrono::Duration::seconds(30)));
    }

    #[test]
    fn test_data_as_typed() {
        #[derive(Deserialize)]
        struct Task {
            title: String,
        }
        let s = snapshot_at(Utc::now());
        let task: Task = s.data_as().unwrap();
        assert_eq!(task.title, "A");
    }

    #[test]
    fn test_patch_applies_metadata_changes() {
        let now = Utc::now();
        let mut metadata = Metadata::initial(
            now,
            &MetadataOverrides::new()
                .with_tag("a")
                .with_tag("b")
                .with_custom_field("drop", json!(1)),
        );
        let patch = SnapshotPatch::new()
            .add_tag("c")
            .remove_tag("a")
            .with_custom_field("drop", serde_json::Value::Null)
            .with_custom_field("keep", json!(true))
            .with_active(false);

        assert!(patch.touches_metadata());
        patch.apply_to_metadata(&mut metadata);

        let tags: Vec<_> = metadata.tags.iter().cloned().collect();
        assert_eq!(tags, vec!["b".to_string(), "c".to_string()]);
        assert!(!metadata.custom_fields.contains_key("drop"));
        assert_eq!(metadata.custom_fields.get("keep"), Some(&json!(true)));
        assert!(!metadata.is_active);
    }

    #[test]
    fn test_empty_patch() {
        assert!(SnapshotPatch::new().is_empty());
        assert!(!SnapshotPatch::data(json!({})).is_empty());
    }
}
