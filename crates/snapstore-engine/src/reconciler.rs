//! Remote reconciliation
//!
//! Fetching from a `SnapshotSource` suspends; mutating the container does
//! not. A fetch therefore runs without the container lock and its result is
//! committed afterwards, guarded by a generation: a newer `begin` or an
//! explicit `cancel` makes every older ticket stale, and a stale result is
//! discarded with `Cancelled` instead of overwriting newer state.
//!
//! Generations come from one counter shared by all references, so a ticket
//! never matches a later request. Only references with a request in flight
//! are tracked; finishing or cancelling drops the entry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use futures::future::join_all;
use snapstore_core::batch::BatchResult;
use snapstore_core::core_types::{BatchId, RequestContext};
use snapstore_core::errors::{Result, SnapStoreError};
use snapstore_core::{
    log_op_end, log_op_error, log_op_start, BatchFailure, BatchOutcome, Locator, MergeStrategy,
    Snapshot, SnapshotContainer, SnapshotRef,
};

use crate::retry::RetryPolicy;
use crate::source::SnapshotSource;
use crate::SharedContainer;

/// Proof that a fetch was started for `reference` at `generation`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub reference: SnapshotRef,
    pub generation: u64,
}

#[derive(Debug, Default)]
struct Generations {
    last: u64,
    outstanding: HashMap<SnapshotRef, u64>,
}

pub struct Reconciler {
    source: Arc<dyn SnapshotSource>,
    retry: RetryPolicy,
    generations: Mutex<Generations>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(source: Arc<dyn SnapshotSource>) -> Self {
        Self {
            source,
            retry: RetryPolicy::default(),
            generations: Mutex::new(Generations::default()),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    fn generations(&self) -> MutexGuard<'_, Generations> {
        self.generations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a request for `reference`, superseding any older one
    pub fn begin(&self, reference: &SnapshotRef) -> FetchTicket {
        let mut generations = self.generations();
        generations.last += 1;
        let generation = generations.last;
        generations.outstanding.insert(reference.clone(), generation);
        FetchTicket {
            reference: reference.clone(),
            generation,
        }
    }

    /// Abandon every outstanding request for `reference`
    pub fn cancel(&self, reference: &SnapshotRef) {
        if let Some(generation) = self.generations().outstanding.remove(reference) {
            tracing::debug!(target_ref = %reference, generation = generation, "request cancelled");
        }
    }

    /// Whether no newer request or cancellation has happened since `ticket`
    pub fn is_current(&self, ticket: &FetchTicket) -> bool {
        self.generations()
            .outstanding
            .get(&ticket.reference)
            .is_some_and(|g| *g == ticket.generation)
    }

    /// Number of references with a request still in flight
    pub fn outstanding(&self) -> usize {
        self.generations().outstanding.len()
    }

    /// Stop tracking `ticket` if it is still the current request
    fn finish(&self, ticket: &FetchTicket) {
        let mut generations = self.generations();
        if generations.outstanding.get(&ticket.reference) == Some(&ticket.generation) {
            generations.outstanding.remove(&ticket.reference);
        }
    }

    /// Fetch the remote copy for `ticket`, with retry
    ///
    /// # Errors
    ///
    /// `NotFound`, `ExternalService` or `Timeout` from the source.
    pub async fn fetch(&self, ticket: &FetchTicket) -> Result<Snapshot> {
        let target = ticket.reference.to_string();
        let source = Arc::clone(&self.source);
        self.retry
            .run(&target, || {
                let source = Arc::clone(&source);
                let reference = ticket.reference.clone();
                async move { source.fetch_remote_snapshot(&reference).await }
            })
            .await
    }

    /// Apply a fetched copy, unless `ticket` went stale meanwhile
    ///
    /// A current ticket is used up by the call, whether or not the container
    /// accepts the copy.
    ///
    /// # Errors
    ///
    /// - `Cancelled` when the ticket is stale
    /// - `StoreNotFound` / `MergeConflict` / `InvalidCategory` from the
    ///   container
    pub fn commit(
        &self,
        container: &mut SnapshotContainer,
        ticket: &FetchTicket,
        remote: Snapshot,
        strategy: MergeStrategy,
    ) -> Result<Snapshot> {
        if !self.is_current(ticket) {
            return Err(SnapStoreError::Cancelled {
                target: ticket.reference.to_string(),
                generation: ticket.generation,
            });
        }
        self.finish(ticket);
        container.reconcile(remote, strategy)
    }

    /// Fetch `reference` from the source and reconcile it into the container
    ///
    /// The container lock is held only for the commit. Every log line of one
    /// refresh carries the same `request_id`.
    ///
    /// # Errors
    ///
    /// Any error of `fetch` or `commit`.
    pub async fn refresh(
        &self,
        container: &SharedContainer,
        reference: &SnapshotRef,
        strategy: MergeStrategy,
    ) -> Result<Snapshot> {
        let ctx = RequestContext::new();
        log_op_start!(
            "refresh_snapshot",
            request_id = %ctx.request_id,
            target_ref = %reference
        );
        let start = Instant::now();

        let result = self.refresh_impl(container, reference, strategy).await.map_err(|e| {
            log_op_error!(
                "refresh_snapshot",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64,
                request_id = %ctx.request_id,
                target_ref = %reference
            );
            e
        })?;

        log_op_end!(
            "refresh_snapshot",
            duration_ms = start.elapsed().as_millis() as u64,
            request_id = %ctx.request_id,
            target_ref = %reference,
            version = result.version()
        );
        Ok(result)
    }

    async fn refresh_impl(
        &self,
        container: &SharedContainer,
        reference: &SnapshotRef,
        strategy: MergeStrategy,
    ) -> Result<Snapshot> {
        let ticket = self.begin(reference);
        let remote = self.fetch(&ticket).await.map_err(|e| {
            self.finish(&ticket);
            e
        })?;
        let mut guard = container.lock().await;
        self.commit(&mut guard, &ticket, remote, strategy)
    }

    /// Fetch several remote copies concurrently
    ///
    /// Results keep input order; the batch fails only when every fetch did.
    /// Nothing is committed.
    ///
    /// # Errors
    ///
    /// `BatchFailed` when every fetch of a non-empty batch failed.
    pub async fn fetch_many(&self, references: Vec<SnapshotRef>) -> BatchResult<Snapshot> {
        let batch_id = BatchId::new();
        log_op_start!(
            "fetch_remote_batch",
            batch_id = %batch_id,
            item_count = references.len() as u64
        );
        let start = Instant::now();

        let tickets: Vec<FetchTicket> = references.iter().map(|r| self.begin(r)).collect();
        let results = join_all(tickets.iter().map(|t| self.fetch(t))).await;
        for ticket in &tickets {
            self.finish(ticket);
        }

        let mut outcome = BatchOutcome::new(batch_id.clone());
        for (index, (ticket, result)) in tickets.into_iter().zip(results).enumerate() {
            match result {
                Ok(snapshot) => outcome.fulfilled.push(snapshot),
                Err(error) => outcome.failed.push(BatchFailure {
                    index,
                    target: ticket.reference.to_string(),
                    error,
                }),
            }
        }

        let fulfilled = outcome.fulfilled.len() as u64;
        let failed = outcome.failed.len() as u64;
        let outcome = outcome.into_result().map_err(|e| {
            log_op_error!(
                "fetch_remote_batch",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64,
                batch_id = %batch_id
            );
            e
        })?;

        log_op_end!(
            "fetch_remote_batch",
            duration_ms = start.elapsed().as_millis() as u64,
            batch_id = %batch_id,
            fulfilled = fulfilled,
            failed = failed
        );
        Ok(outcome)
    }

    /// Persist the current version of the addressed snapshot
    ///
    /// The snapshot is cloned under the lock; the source is called after the
    /// lock is released.
    ///
    /// # Errors
    ///
    /// - `NotFound` / `AmbiguousId` / `StoreNotFound` from the lookup
    /// - `ExternalService` / `Timeout` once retries are exhausted
    pub async fn persist(&self, container: &SharedContainer, locator: &Locator) -> Result<Snapshot> {
        log_op_start!("persist_snapshot", locator = %locator);
        let start = Instant::now();

        let result = self.persist_impl(container, locator).await.map_err(|e| {
            log_op_error!(
                "persist_snapshot",
                e.clone(),
                duration_ms = start.elapsed().as_millis() as u64,
                locator = %locator
            );
            e
        })?;

        log_op_end!(
            "persist_snapshot",
            duration_ms = start.elapsed().as_millis() as u64,
            target_ref = %result.reference(),
            version = result.version()
        );
        Ok(result)
    }

    async fn persist_impl(&self, container: &SharedContainer, locator: &Locator) -> Result<Snapshot> {
        let snapshot = {
            let mut guard = container.lock().await;
            guard.fetch(locator)?
        };
        let target = snapshot.reference().to_string();
        let source = Arc::clone(&self.source);
        self.retry
            .run(&target, || {
                let source = Arc::clone(&source);
                let snapshot = snapshot.clone();
                async move { source.persist_snapshot(&snapshot).await }
            })
            .await?;
        Ok(snapshot)
    }
}
