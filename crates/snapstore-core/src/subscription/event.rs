use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::{Snapshot, StoreId};

/// Lifecycle transition that produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Created,
    Updated,
    Deleted,
    Merged,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Created => "created",
            EventKind::Updated => "updated",
            EventKind::Deleted => "deleted",
            EventKind::Merged => "merged",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed notification payload
///
/// For `Deleted` the snapshot is the last live version; for the other kinds
/// it is the version just written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEvent {
    pub kind: EventKind,
    pub snapshot: Snapshot,
    /// Version replaced by this event, if any
    pub previous_version: Option<u64>,
}

impl SnapshotEvent {
    pub fn new(kind: EventKind, snapshot: Snapshot) -> Self {
        Self {
            kind,
            snapshot,
            previous_version: None,
        }
    }

    pub fn with_previous_version(mut self, version: u64) -> Self {
        self.previous_version = Some(version);
        self
    }

    /// Topic of the event: the id of the store that emitted it
    pub fn topic(&self) -> &StoreId {
        &self.snapshot.store_id
    }
}
