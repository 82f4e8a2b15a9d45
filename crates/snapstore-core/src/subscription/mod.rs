//! Subscription & notification engine
//!
//! Producers (store mutations) publish typed [`SnapshotEvent`]s into a
//! [`SubscriptionRegistry`]; consumers register a [`Selector`] and a callback.
//! The registry knows nothing about storage internals.

pub mod event;
pub mod registry;
pub mod selector;

pub use event::{EventKind, SnapshotEvent};
pub use registry::{callback, Callback, DeliveryReport, SubscriberError, SubscriptionRegistry};
pub use selector::Selector;
