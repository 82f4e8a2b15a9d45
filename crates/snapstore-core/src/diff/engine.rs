//! Snapshot diff computation
//!
//! Snapshots are projected onto a comparable JSON view that drops stamping
//! noise (timestamp, version, last_updated, subscribers) and identity, then
//! walked in sorted key order.

use serde_json::{json, Value};
use sha2::{Digest as _, Sha256};
use std::collections::BTreeSet;

use crate::diff::model::{
    ChangeKind, CompareMode, DiffClassification, DiffSide, FieldChange, SnapshotDiff,
};
use crate::model::Snapshot;

/// Path used when the compared roots themselves differ
const ROOT_PATH: &str = "$";

/// SHA-256 hex digest of a payload's canonical JSON
pub fn content_digest(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Compare two payloads
///
/// Deep mode descends into objects and arrays; shallow mode compares the
/// first-level keys and treats nested values as opaque.
pub fn compare_values(left: &Value, right: &Value, mode: CompareMode) -> Vec<FieldChange> {
    let mut out = Vec::new();
    diff_into("", left, right, depth_limit(mode, 1), &mut out);
    out
}

/// Full snapshot comparison
///
/// Shallow mode still looks one level into `data` and `metadata`, so a
/// changed payload key is reported as `data.<key>` rather than `data`.
pub fn compare_snapshots(left: &Snapshot, right: &Snapshot, mode: CompareMode) -> SnapshotDiff {
    let mut differences = Vec::new();
    diff_into(
        "",
        &comparable_view(left),
        &comparable_view(right),
        depth_limit(mode, 2),
        &mut differences,
    );

    let classification = if differences.is_empty() {
        DiffClassification::Identical
    } else if differences.iter().any(|c| is_data_path(&c.path)) {
        DiffClassification::Changed
    } else {
        DiffClassification::MetadataOnly
    };

    build(left, right, mode, classification, differences)
}

/// Payload-only comparison between two snapshots
///
/// Paths are relative to the payload root.
pub fn compare_snapshot_data(
    left: &Snapshot,
    right: &Snapshot,
    mode: CompareMode,
) -> SnapshotDiff {
    let differences = compare_values(&left.data, &right.data, mode);
    let classification = if differences.is_empty() {
        DiffClassification::Identical
    } else {
        DiffClassification::Changed
    };
    build(left, right, mode, classification, differences)
}

fn build(
    left: &Snapshot,
    right: &Snapshot,
    mode: CompareMode,
    classification: DiffClassification,
    differences: Vec<FieldChange>,
) -> SnapshotDiff {
    SnapshotDiff {
        left: side(left),
        right: side(right),
        mode,
        classification,
        version_delta: right.version() as i64 - left.version() as i64,
        differences,
    }
}

fn side(snapshot: &Snapshot) -> DiffSide {
    DiffSide {
        store_id: snapshot.store_id.clone(),
        id: snapshot.id.clone(),
        version: snapshot.version(),
        timestamp: snapshot.timestamp,
        data_digest: content_digest(&snapshot.data),
    }
}

fn depth_limit(mode: CompareMode, shallow_depth: usize) -> Option<usize> {
    match mode {
        CompareMode::Deep => None,
        CompareMode::Shallow => Some(shallow_depth),
    }
}

fn is_data_path(path: &str) -> bool {
    path == "data" || path.starts_with("data.") || path.starts_with("data[")
}

/// Projection of the fields that carry meaning
fn comparable_view(s: &Snapshot) -> Value {
    let m = &s.metadata;
    json!({
        "category": s.category,
        "data": s.data,
        "parent": s.parent.as_ref().map(|p| p.to_string()),
        "child_ids": s.child_ids.iter().map(|c| c.to_string()).collect::<Vec<_>>(),
        "is_core": s.is_core,
        "expires_at": s.expires_at,
        "max_age_secs": s.max_age.map(|d| d.as_secs()),
        "metadata": {
            "is_active": m.is_active,
            "tags": m.tags,
            "custom_fields": m.custom_fields,
            "permissions": m.permissions,
            "priority": m.priority,
            "created_by": m.created_by,
            "updated_by": m.updated_by,
            "entries": m.entries,
        },
    })
}

fn diff_into(
    path: &str,
    left: &Value,
    right: &Value,
    depth: Option<usize>,
    out: &mut Vec<FieldChange>,
) {
    if left == right {
        return;
    }
    let descend = depth.map_or(true, |d| d > 0);
    let next = depth.map(|d| d.saturating_sub(1));

    match (left, right) {
        (Value::Object(l), Value::Object(r)) if descend => {
            let keys: BTreeSet<&String> = l.keys().chain(r.keys()).collect();
            for key in keys {
                let child = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", path, key)
                };
                match (l.get(key), r.get(key)) {
                    (Some(a), Some(b)) => diff_into(&child, a, b, next, out),
                    (Some(a), None) => out.push(change(child, ChangeKind::Removed, Some(a), None)),
                    (None, Some(b)) => out.push(change(child, ChangeKind::Added, None, Some(b))),
                    (None, None) => {}
                }
            }
        }
        // Arrays are element-wise only in deep mode
        (Value::Array(l), Value::Array(r)) if depth.is_none() => {
            for i in 0..l.len().max(r.len()) {
                let child = format!("{}[{}]", path, i);
                match (l.get(i), r.get(i)) {
                    (Some(a), Some(b)) => diff_into(&child, a, b, None, out),
                    (Some(a), None) => out.push(change(child, ChangeKind::Removed, Some(a), None)),
                    (None, Some(b)) => out.push(change(child, ChangeKind::Added, None, Some(b))),
                    (None, None) => {}
                }
            }
        }
        _ => {
            let at = if path.is_empty() { ROOT_PATH } else { path };
            out.push(change(
                at.to_string(),
                ChangeKind::Changed,
                Some(left),
                Some(right),
            ));
        }
    }
}

fn change(path: String, kind: ChangeKind, left: Option<&Value>, right: Option<&Value>) -> FieldChange {
    FieldChange {
        path,
        kind,
        left: left.cloned(),
        right: right.cloned(),
    }
}
