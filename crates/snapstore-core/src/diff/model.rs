//! Snapshot diff output types
//!
//! Differences are kept as a sorted `Vec` so serialized output is stable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{SnapshotId, SnapshotRef, StoreId};

/// Depth of comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareMode {
    /// Recursive structural equality down to scalars and array elements
    #[default]
    Deep,
    /// First-level key equality; nested values compare as a whole
    Shallow,
}

/// Identity of one side of a diff: where it came from and which version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSide {
    pub store_id: StoreId,
    pub id: SnapshotId,
    pub version: u64,
    pub timestamp: DateTime<Utc>,
    /// SHA-256 of the canonical payload JSON
    pub data_digest: String,
}

impl DiffSide {
    pub fn reference(&self) -> SnapshotRef {
        SnapshotRef::new(self.store_id.clone(), self.id.clone())
    }
}

/// High-level classification of the diff
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffClassification {
    Identical,
    /// Payloads equal, descriptive fields differ
    MetadataOnly,
    /// Payloads differ
    Changed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Removed,
    Changed,
}

/// One difference at a dotted path (`data.owner.name`, `data.items[2]`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub path: String,
    pub kind: ChangeKind,
    pub left: Option<serde_json::Value>,
    pub right: Option<serde_json::Value>,
}

/// Structured diff between two snapshots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotDiff {
    pub left: DiffSide,
    pub right: DiffSide,
    pub mode: CompareMode,
    pub classification: DiffClassification,
    /// `right.version - left.version`
    pub version_delta: i64,
    pub differences: Vec<FieldChange>,
}

impl SnapshotDiff {
    pub fn is_identical(&self) -> bool {
        self.classification == DiffClassification::Identical
    }

    pub fn paths(&self) -> Vec<&str> {
        self.differences.iter().map(|c| c.path.as_str()).collect()
    }

    pub fn change_at(&self, path: &str) -> Option<&FieldChange> {
        self.differences.iter().find(|c| c.path == path)
    }
}
