use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Priority carried by task-like payloads, used by container priority queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            other => Err(format!("unknown priority '{other}'")),
        }
    }
}

/// Provenance of one metadata entry
///
/// Purely descriptive: the store never interprets these fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EntryDescriptor {
    pub author: Option<String>,
    pub original_path: Option<String>,
    #[serde(default)]
    pub alternate_paths: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Metadata record attached to one snapshot version
///
/// A record is never mutated once attached (snapshots hold it behind an
/// `Arc`); every change to the owning snapshot attaches a successor whose
/// `parent_version` points back at this record's `version`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub version: u64,
    pub parent_version: Option<u64>,
    pub last_updated: DateTime<Utc>,
    pub is_active: bool,
    pub tags: BTreeSet<String>,
    pub custom_fields: BTreeMap<String, serde_json::Value>,
    pub permissions: BTreeSet<String>,
    pub priority: Option<Priority>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub entries: BTreeMap<String, EntryDescriptor>,
}

impl Metadata {
    /// First version of a record, built from already-merged overrides
    pub fn initial(now: DateTime<Utc>, overrides: &MetadataOverrides) -> Self {
        Self {
            version: 1,
            parent_version: None,
            last_updated: now,
            is_active: overrides.is_active.unwrap_or(true),
            tags: overrides.tags.clone(),
            custom_fields: overrides.custom_fields.clone(),
            permissions: overrides.permissions.clone(),
            priority: overrides.priority,
            created_by: overrides.author.clone(),
            updated_by: overrides.author.clone(),
            entries: overrides.entries.clone(),
        }
    }

    /// Next version of this record, stamped at `now`
    ///
    /// The caller applies its changes to the returned value before attaching it.
    pub fn successor(&self, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.version = self.version + 1;
        next.parent_version = Some(self.version);
        next.last_updated = now;
        next
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

/// Caller-supplied values layered over a store's default metadata on create
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataOverrides {
    pub is_active: Option<bool>,
    pub tags: BTreeSet<String>,
    pub custom_fields: BTreeMap<String, serde_json::Value>,
    pub permissions: BTreeSet<String>,
    pub priority: Option<Priority>,
    pub author: Option<String>,
    pub entries: BTreeMap<String, EntryDescriptor>,
}

impl MetadataOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_custom_field(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.custom_fields.insert(key.into(), value);
        self
    }

    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.insert(permission.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_active(mut self, is_active: bool) -> Self {
        self.is_active = Some(is_active);
        self
    }

    pub fn with_entry(mut self, entry_id: impl Into<String>, entry: EntryDescriptor) -> Self {
        self.entries.insert(entry_id.into(), entry);
        self
    }

    /// Layer `self` over `defaults`
    ///
    /// Sets and maps are unioned (keys in `self` win); scalar options fall
    /// back to the default when unset.
    pub fn layered_over(&self, defaults: &MetadataOverrides) -> MetadataOverrides {
        let mut out = defaults.clone();
        if self.is_active.is_some() {
            out.is_active = self.is_active;
        }
        out.tags.extend(self.tags.iter().cloned());
        for (k, v) in &self.custom_fields {
            out.custom_fields.insert(k.clone(), v.clone());
        }
        out.permissions.extend(self.permissions.iter().cloned());
        if self.priority.is_some() {
            out.priority = self.priority;
        }
        if self.author.is_some() {
            out.author = self.author.clone();
        }
        for (k, v) in &self.entries {
            out.entries.insert(k.clone(), v.clone());
        }
        out
    }
}
