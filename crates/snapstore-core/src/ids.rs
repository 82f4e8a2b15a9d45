//! Identity collaborator
//!
//! The store only relies on ids being unique within one store; the format is
//! the generator's business.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

use crate::model::SnapshotId;

/// Supplies fresh snapshot ids on request
pub trait IdGenerator: Send + Sync + Debug {
    fn next_id(&self) -> SnapshotId;
}

/// Time-ordered UUID v7 ids (default)
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidV7Generator;

impl IdGenerator for UuidV7Generator {
    fn next_id(&self) -> SnapshotId {
        SnapshotId::Text(Uuid::now_v7().to_string())
    }
}

/// Deterministic `prefix-N` ids, starting at 1
#[derive(Debug)]
pub struct SequentialIdGenerator {
    prefix: String,
    counter: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(0),
        }
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&self) -> SnapshotId {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        SnapshotId::Text(format!("{}-{}", self.prefix, n))
    }
}
