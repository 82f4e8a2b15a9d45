use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::event::SnapshotEvent;
use super::selector::Selector;
use crate::model::SubscriptionId;

/// Error a callback may report; it is logged and never propagated
pub type SubscriberError = Box<dyn std::error::Error + Send + Sync>;

pub type Callback = Arc<dyn Fn(&SnapshotEvent) -> Result<(), SubscriberError> + Send + Sync>;

/// Wrap a closure as a registry callback
pub fn callback<F>(f: F) -> Callback
where
    F: Fn(&SnapshotEvent) -> Result<(), SubscriberError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Outcome of one `notify` call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Subscribers whose callback returned `Ok`
    pub delivered: Vec<SubscriptionId>,
    /// Subscribers whose callback failed or panicked, with the reason
    pub failed: Vec<(SubscriptionId, String)>,
}

impl DeliveryReport {
    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.failed.len()
    }
}

struct Entry {
    selector: Selector,
    callback: Callback,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    // ids increase monotonically, so key order is registration order
    subs: BTreeMap<SubscriptionId, Entry>,
}

/// Registry of subscriber callbacks keyed by selector
///
/// Callbacks run synchronously on the notifying thread, outside the registry
/// lock, so a callback may subscribe or unsubscribe without deadlocking.
#[derive(Default)]
pub struct SubscriptionRegistry {
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("subscribers", &self.len())
            .finish()
    }
}

impl SubscriptionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking callback never holds the lock; recover the data anyway
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self, selector: Selector, callback: Callback) -> SubscriptionId {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = SubscriptionId(inner.next_id);
        inner.subs.insert(id, Entry { selector, callback });
        drop(inner);

        tracing::debug!(subscription_id = %id, "subscriber registered");
        id
    }

    /// Remove a subscription; returns false if it was already gone
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.lock().subs.remove(&id).is_some();
        if removed {
            tracing::debug!(subscription_id = %id, "subscriber removed");
        }
        removed
    }

    pub fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.lock().subs.contains_key(&id)
    }

    pub fn selector(&self, id: SubscriptionId) -> Option<Selector> {
        self.lock().subs.get(&id).map(|e| e.selector.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().subs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `event` to every matching subscriber in registration order
    ///
    /// A failing or panicking callback is logged and skipped; delivery to
    /// the remaining subscribers continues.
    pub fn notify(&self, event: &SnapshotEvent) -> DeliveryReport {
        let targets: Vec<(SubscriptionId, Callback)> = {
            let inner = self.lock();
            inner
                .subs
                .iter()
                .filter(|(_, entry)| entry.selector.matches(event))
                .map(|(id, entry)| (*id, entry.callback.clone()))
                .collect()
        };

        let mut report = DeliveryReport::default();
        for (id, cb) in targets {
            let outcome = catch_unwind(AssertUnwindSafe(|| cb(event)));
            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(err.to_string()),
                Err(panic) => Some(panic_message(panic.as_ref())),
            };
            match failure {
                None => report.delivered.push(id),
                Some(reason) => {
                    tracing::warn!(
                        subscription_id = %id,
                        event_kind = event.kind.as_str(),
                        store_id = %event.snapshot.store_id,
                        snapshot_id = %event.snapshot.id,
                        reason = %reason,
                        "subscriber callback failed"
                    );
                    report.failed.push((id, reason));
                }
            }
        }
        report
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}
