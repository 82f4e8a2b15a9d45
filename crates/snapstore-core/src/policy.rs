//! Eviction policy trait and implementations
//!
//! Expired, non-core snapshots are hidden from every read regardless of
//! policy. The policy only decides when such a snapshot is physically
//! removed by a sweep.

use chrono::{DateTime, Duration, Utc};
use std::fmt::Debug;

use crate::model::Snapshot;

/// Decides whether an expired, non-core snapshot is evicted at `now`
///
/// Injected into each store through the container environment.
pub trait EvictionPolicy: Send + Sync + Debug {
    /// Called only for snapshots that are expired and not core
    fn should_evict(&self, snapshot: &Snapshot, now: DateTime<Utc>) -> bool;
}

/// Evict as soon as the snapshot expires (default)
///
/// # Example
/// ```
/// use snapstore_core::policy::{EvictionPolicy, TtlEvictionPolicy};
///
/// let policy = TtlEvictionPolicy;
/// # let _ = &policy as &dyn EvictionPolicy;
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct TtlEvictionPolicy;

impl EvictionPolicy for TtlEvictionPolicy {
    fn should_evict(&self, _snapshot: &Snapshot, _now: DateTime<Utc>) -> bool {
        true
    }
}

/// Keep expired snapshots in memory, hidden
///
/// Useful when history and version comparison must survive expiry.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverEvictPolicy;

impl EvictionPolicy for NeverEvictPolicy {
    fn should_evict(&self, _snapshot: &Snapshot, _now: DateTime<Utc>) -> bool {
        false
    }
}

/// Evict once a snapshot has been expired for longer than `grace`
#[derive(Debug, Clone, Copy)]
pub struct GracePeriodPolicy {
    grace: Duration,
}

impl GracePeriodPolicy {
    pub fn new(grace: Duration) -> Self {
        Self { grace }
    }
}

impl EvictionPolicy for GracePeriodPolicy {
    fn should_evict(&self, snapshot: &Snapshot, now: DateTime<Utc>) -> bool {
        snapshot
            .effective_expiry()
            .is_some_and(|at| at + self.grace <= now)
    }
}
