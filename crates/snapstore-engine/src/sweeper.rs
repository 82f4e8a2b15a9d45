//! Periodic eviction of expired snapshots

use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use snapstore_core::errors::{Result, SnapStoreError};
use snapstore_core::{log_op_end, log_op_start, ContainerConfig, SnapshotRef};

use crate::SharedContainer;

/// Background task sweeping a shared container on a fixed interval
#[derive(Debug)]
pub struct Sweeper {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl Sweeper {
    /// Start sweeping every `interval`; the first sweep runs one interval in
    pub fn spawn(container: SharedContainer, interval: Duration) -> Self {
        let (shutdown, rx) = watch::channel(false);
        let handle = tokio::spawn(run(container, interval, rx));
        Self { handle, shutdown }
    }

    /// Start a sweeper when the configuration asks for one
    pub fn from_config(container: SharedContainer, config: &ContainerConfig) -> Option<Self> {
        config
            .sweep_interval()
            .map(|interval| Self::spawn(container, interval))
    }

    /// Stop the task and wait for it to finish
    ///
    /// # Errors
    ///
    /// Returns `Internal` when the task panicked.
    pub async fn shutdown(self) -> Result<()> {
        // A closed receiver means the task already ended.
        let _ = self.shutdown.send(true);
        self.handle.await.map_err(|e| SnapStoreError::Internal {
            message: format!("sweeper task failed: {e}"),
        })
    }
}

async fn run(container: SharedContainer, interval: Duration, mut rx: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                sweep_once(&container).await;
            }
            changed = rx.changed() => {
                if changed.is_err() || *rx.borrow() {
                    break;
                }
            }
        }
    }
    tracing::debug!("sweeper stopped");
}

/// Evict expired snapshots once, returning what was evicted
pub async fn sweep_once(container: &SharedContainer) -> Vec<SnapshotRef> {
    log_op_start!("sweep_container");
    let start = Instant::now();

    let evicted = container.lock().await.sweep_expired();

    log_op_end!(
        "sweep_container",
        duration_ms = start.elapsed().as_millis() as u64,
        item_count = evicted.len() as u64
    );
    evicted
}
