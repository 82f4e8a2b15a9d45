//! Field-level reconciliation of two divergent snapshots

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::model::{Metadata, Snapshot};

/// Error a resolver may raise; it surfaces as `MergeConflict`
pub type ResolverError = Box<dyn std::error::Error + Send + Sync>;

/// Decides the merged value of a field present on both sides with
/// different values
///
/// For object payloads `field` is the top-level key; for any other payload
/// the whole value is resolved under the field name `$`.
pub trait Resolver {
    /// # Errors
    ///
    /// Any error aborts the merge and leaves both snapshots untouched.
    fn resolve(&mut self, field: &str, left: &Value, right: &Value)
        -> Result<Value, ResolverError>;
}

impl<F> Resolver for F
where
    F: FnMut(&str, &Value, &Value) -> Result<Value, ResolverError>,
{
    fn resolve(&mut self, field: &str, left: &Value, right: &Value) -> Result<Value, ResolverError> {
        self(field, left, right)
    }
}

/// Closed set of built-in resolvers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    #[default]
    PreferLeft,
    PreferRight,
    /// The side with the later timestamp wins; ties go left
    PreferNewer,
}

impl MergeStrategy {
    /// Resolver applying this strategy to a given pair
    pub fn resolver_for(self, left: &Snapshot, right: &Snapshot) -> StrategyResolver {
        let take_left = match self {
            MergeStrategy::PreferLeft => true,
            MergeStrategy::PreferRight => false,
            MergeStrategy::PreferNewer => left.timestamp >= right.timestamp,
        };
        StrategyResolver { take_left }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StrategyResolver {
    take_left: bool,
}

impl Resolver for StrategyResolver {
    fn resolve(&mut self, _field: &str, left: &Value, right: &Value) -> Result<Value, ResolverError> {
        Ok(if self.take_left { left } else { right }.clone())
    }
}

/// Field name used when the payload is not an object
pub const WHOLE_PAYLOAD_FIELD: &str = "$";

/// Resolver failure on one field
#[derive(Debug)]
pub(crate) struct MergeFailure {
    pub field: String,
    pub message: String,
}

/// Merge `right` into `left`
///
/// Keys present on one side only are taken as they are; equal values are
/// kept; everything else goes through the resolver in sorted key order, so a
/// deterministic resolver yields a deterministic result. The result keeps
/// the left identity and hierarchy links and is stamped at `timestamp`.
pub(crate) fn merge_snapshots(
    left: &Snapshot,
    right: &Snapshot,
    resolver: &mut dyn Resolver,
    timestamp: DateTime<Utc>,
) -> Result<Snapshot, MergeFailure> {
    let data = merge_data(&left.data, &right.data, resolver)?;

    let mut merged = left.clone();
    merged.data = data;
    merged.timestamp = timestamp;
    merged.metadata = Arc::new(merge_metadata(&left.metadata, &right.metadata, timestamp));
    Ok(merged)
}

fn merge_data(
    left: &Value,
    right: &Value,
    resolver: &mut dyn Resolver,
) -> Result<Value, MergeFailure> {
    match (left, right) {
        (Value::Object(l), Value::Object(r)) => {
            let keys: BTreeSet<&String> = l.keys().chain(r.keys()).collect();
            let mut out = Map::new();
            for key in keys {
                let value = match (l.get(key), r.get(key)) {
                    (Some(a), Some(b)) if a == b => a.clone(),
                    (Some(a), Some(b)) => resolve(resolver, key, a, b)?,
                    (Some(a), None) => a.clone(),
                    (None, Some(b)) => b.clone(),
                    (None, None) => continue,
                };
                out.insert(key.clone(), value);
            }
            Ok(Value::Object(out))
        }
        _ if left == right => Ok(left.clone()),
        _ => resolve(resolver, WHOLE_PAYLOAD_FIELD, left, right),
    }
}

fn resolve(
    resolver: &mut dyn Resolver,
    field: &str,
    left: &Value,
    right: &Value,
) -> Result<Value, MergeFailure> {
    resolver
        .resolve(field, left, right)
        .map_err(|e| MergeFailure {
            field: field.to_string(),
            message: e.to_string(),
        })
}

/// Successor record for a merge
///
/// Version moves past both inputs and links back to the left version.
/// Tags, permissions and entries are unioned; on key clashes the left side
/// wins.
fn merge_metadata(left: &Metadata, right: &Metadata, timestamp: DateTime<Utc>) -> Metadata {
    let mut merged = left.successor(timestamp);
    merged.version = left.version.max(right.version) + 1;
    merged.tags.extend(right.tags.iter().cloned());
    merged.permissions.extend(right.permissions.iter().cloned());
    for (key, value) in &right.custom_fields {
        merged
            .custom_fields
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }
    for (key, entry) in &right.entries {
        merged
            .entries
            .entry(key.clone())
            .or_insert_with(|| entry.clone());
    }
    if merged.priority.is_none() {
        merged.priority = right.priority;
    }
    merged
}
