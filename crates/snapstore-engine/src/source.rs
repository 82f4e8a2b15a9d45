//! Persistence/transport collaborator
//!
//! The store treats both operations as opaque, retryable and fallible. A
//! round-trip through a source must reproduce an equivalent snapshot: same
//! id, same data, and a metadata record the store can reconcile by merge.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use snapstore_core::errors::{Result, SnapStoreError};
use snapstore_core::{Snapshot, SnapshotRef};

#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Fetch the remote copy of one snapshot
    async fn fetch_remote_snapshot(&self, reference: &SnapshotRef) -> Result<Snapshot>;

    /// Persist the given version of a snapshot
    async fn persist_snapshot(&self, snapshot: &Snapshot) -> Result<()>;
}

/// In-process source backed by a map
///
/// Failure injection (`fail_next_persists`, `with_fetch_delay`) lets tests
/// exercise retry and timeout paths.
#[derive(Debug, Default)]
pub struct MemorySource {
    remote: Mutex<HashMap<SnapshotRef, Snapshot>>,
    pending_failures: AtomicUsize,
    persist_calls: AtomicUsize,
    fetch_delay: Option<Duration>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every fetch sleeps this long before answering
    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }

    /// Seed or overwrite the remote copy
    pub fn insert(&self, snapshot: Snapshot) {
        self.remote
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(snapshot.reference(), snapshot);
    }

    pub fn get(&self, reference: &SnapshotRef) -> Option<Snapshot> {
        self.remote
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(reference)
            .cloned()
    }

    /// Make the next `n` persist calls fail with `ExternalService`
    pub fn fail_next_persists(&self, n: usize) {
        self.pending_failures.store(n, Ordering::SeqCst);
    }

    /// Persist calls seen so far, failed ones included
    pub fn persist_calls(&self) -> usize {
        self.persist_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotSource for MemorySource {
    async fn fetch_remote_snapshot(&self, reference: &SnapshotRef) -> Result<Snapshot> {
        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }
        self.get(reference).ok_or_else(|| SnapStoreError::NotFound {
            store_id: reference.store_id.clone(),
            id: reference.id.clone(),
        })
    }

    async fn persist_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        self.persist_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(SnapStoreError::ExternalService {
                target: snapshot.reference().to_string(),
                message: "injected persist failure".to_string(),
            });
        }
        self.insert(snapshot.clone());
        Ok(())
    }
}
