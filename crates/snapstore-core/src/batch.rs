//! Batch coordinator
//!
//! Multi-item requests report per-item success and failure instead of an
//! all-or-nothing result. Items run in input order, so an item may depend on
//! one earlier in the same batch (a parent created before its child). A
//! whole batch fails only when every item of a non-empty batch failed.

use std::time::Instant;

use crate::apply::{apply, OperationOutcome};
use crate::commands::StoreOperation;
use crate::container::{Locator, SnapshotContainer};
use crate::core_types::BatchId;
use crate::errors::{Result, SnapStoreError};
use crate::model::{NewSnapshot, Snapshot, SnapshotPatch, StoreId};
use crate::{log_op_end, log_op_error, log_op_start};

/// One failed item of a batch
#[derive(Debug, Clone, PartialEq)]
pub struct BatchFailure {
    /// Position in the input
    pub index: usize,
    /// Human-readable target (`store/id`)
    pub target: String,
    pub error: SnapStoreError,
}

/// Partitioned result of a batch
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome<T> {
    pub batch_id: BatchId,
    /// Successful items, in input order
    pub fulfilled: Vec<T>,
    /// Failed items, in input order
    pub failed: Vec<BatchFailure>,
}

impl<T> BatchOutcome<T> {
    pub fn new(batch_id: BatchId) -> Self {
        Self {
            batch_id,
            fulfilled: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn total(&self) -> usize {
        self.fulfilled.len() + self.failed.len()
    }

    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Escalate to `BatchFailed` when every item of a non-empty batch failed
    ///
    /// # Errors
    ///
    /// Returns `BatchFailed` carrying every item failure.
    pub fn into_result(self) -> Result<Self> {
        if self.fulfilled.is_empty() && !self.failed.is_empty() {
            return Err(SnapStoreError::BatchFailed {
                batch_id: self.batch_id.to_string(),
                failures: self.failed,
            });
        }
        Ok(self)
    }
}

pub type BatchResult<T> = Result<BatchOutcome<T>>;

/// Run `f` over `items` in input order and partition the results
///
/// `describe` names each item for its failure record.
pub(crate) fn run_batch<I, T, D, F>(
    op: &'static str,
    items: Vec<I>,
    describe: D,
    mut f: F,
) -> BatchResult<T>
where
    D: Fn(&I) -> String,
    F: FnMut(I) -> Result<T>,
{
    let batch_id = BatchId::new();
    log_op_start!(op, batch_id = %batch_id, item_count = items.len() as u64);
    let start = Instant::now();

    let mut outcome = BatchOutcome::new(batch_id.clone());
    for (index, item) in items.into_iter().enumerate() {
        let target = describe(&item);
        match f(item) {
            Ok(value) => outcome.fulfilled.push(value),
            Err(error) => outcome.failed.push(BatchFailure {
                index,
                target,
                error,
            }),
        }
    }

    let fulfilled = outcome.fulfilled.len() as u64;
    let failed = outcome.failed.len() as u64;
    let outcome = outcome.into_result().map_err(|e| {
        log_op_error!(
            op,
            e.clone(),
            duration_ms = start.elapsed().as_millis() as u64,
            batch_id = %batch_id,
            failed = failed
        );
        e
    })?;

    log_op_end!(
        op,
        duration_ms = start.elapsed().as_millis() as u64,
        batch_id = %batch_id,
        fulfilled = fulfilled,
        failed = failed
    );
    Ok(outcome)
}

/// Receives the partitioned result of a batch
///
/// `on_success` runs once when at least one item succeeded, `on_failure`
/// once when at least one item failed; a mixed batch gets both, each with
/// the full outcome. Never per item.
pub trait BatchObserver<T> {
    fn on_success(&self, outcome: &BatchOutcome<T>);
    fn on_failure(&self, outcome: &BatchOutcome<T>);
}

/// Cross-store batch requests over one container
pub struct BatchCoordinator<'a> {
    container: &'a mut SnapshotContainer,
    observer: Option<&'a dyn BatchObserver<Snapshot>>,
}

impl<'a> BatchCoordinator<'a> {
    pub fn new(container: &'a mut SnapshotContainer) -> Self {
        Self {
            container,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: &'a dyn BatchObserver<Snapshot>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// # Errors
    ///
    /// Returns `BatchFailed` only when every item failed.
    pub fn fetch(&mut self, locators: Vec<Locator>) -> BatchResult<Snapshot> {
        let container = &mut *self.container;
        container.sweep_expired();
        let result = run_batch("batch_fetch", locators, Locator::to_string, |locator| {
            container.fetch(&locator)
        });
        self.observe(result)
    }

    /// # Errors
    ///
    /// Returns `BatchFailed` only when every item failed.
    pub fn create(&mut self, items: Vec<(StoreId, NewSnapshot)>) -> BatchResult<Snapshot> {
        let container = &mut *self.container;
        let result = run_batch(
            "batch_create",
            items,
            |(store_id, new)| match &new.id {
                Some(id) => format!("{}/{}", store_id, id),
                None => format!("{}/<new>", store_id),
            },
            |(store_id, new)| container.create(&store_id, new),
        );
        self.observe(result)
    }

    /// # Errors
    ///
    /// Returns `BatchFailed` only when every item failed.
    pub fn update(&mut self, items: Vec<(Locator, SnapshotPatch)>) -> BatchResult<Snapshot> {
        let container = &mut *self.container;
        let result = run_batch(
            "batch_update",
            items,
            |(locator, _)| locator.to_string(),
            |(locator, patch)| container.update(&locator, patch),
        );
        self.observe(result)
    }

    fn observe(&self, result: BatchResult<Snapshot>) -> BatchResult<Snapshot> {
        let Some(observer) = self.observer else {
            return result;
        };
        match &result {
            Ok(outcome) => {
                if !outcome.fulfilled.is_empty() {
                    observer.on_success(outcome);
                }
                if !outcome.failed.is_empty() {
                    observer.on_failure(outcome);
                }
            }
            Err(SnapStoreError::BatchFailed { batch_id, failures }) => {
                let outcome = BatchOutcome {
                    batch_id: BatchId::from_string(batch_id.clone()),
                    fulfilled: Vec::new(),
                    failed: failures.clone(),
                };
                observer.on_failure(&outcome);
            }
            Err(_) => {}
        }
        result
    }
}

/// Run tagged operations in order with partial-failure reporting
///
/// # Errors
///
/// Returns `BatchFailed` only when every operation failed.
pub fn apply_all(
    container: &mut SnapshotContainer,
    ops: Vec<StoreOperation>,
) -> BatchResult<OperationOutcome> {
    run_batch("apply_all", ops, StoreOperation::describe, |op| {
        apply(container, op)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_result_escalates_only_total_failure() {
        let mut outcome: BatchOutcome<u32> = BatchOutcome::new(BatchId::new());
        assert!(outcome.clone().into_result().is_ok());

        outcome.failed.push(BatchFailure {
            index: 0,
            target: "tasks/x".to_string(),
            error: SnapStoreError::Internal {
                message: "x".to_string(),
            },
        });
        assert!(matches!(
            outcome.clone().into_result(),
            Err(SnapStoreError::BatchFailed { .. })
        ));

        outcome.fulfilled.push(1);
        assert!(outcome.into_result().is_ok());
    }

    #[test]
    fn test_run_batch_keeps_input_order() {
        let outcome = run_batch(
            "test_batch",
            vec![1, 2, 3, 4],
            |n| n.to_string(),
            |n| {
                if n % 2 == 0 {
                    Ok(n * 10)
                } else {
                    Err(SnapStoreError::Internal {
                        message: format!("odd {}", n),
                    })
                }
            },
        )
        .unwrap();

        assert_eq!(outcome.fulfilled, vec![20, 40]);
        let indexes: Vec<usize> = outcome.failed.iter().map(|f| f.index).collect();
        assert_eq!(indexes, vec![0, 2]);
        assert_eq!(outcome.failed[1].target, "3");
    }
}
