//! UI-binding surface (C8): a minimal trait any store or handle can
//! implement so framework bindings can subscribe and read a snapshot
//! without depending on the concrete store type.
//!
//! The concrete framework integration (React, egui, whatever) is out of
//! scope; [`watch_channel`] is the one reference binding provided, built
//! on a `tokio::sync::watch` channel the way `use_sync_external_store`
//! pairs a subscribe function with a snapshot getter.

use std::sync::Arc;

use tokio::sync::watch;

use crate::bus::Unsubscribe;

/// Anything a UI binding can subscribe to and read a snapshot from.
pub trait Subscribable: Send + Sync {
    /// The value handed back by [`Subscribable::get_snapshot`].
    type Snapshot;

    /// The current value, computed fresh (never cached on the trait
    /// implementor's side beyond what the store already keeps).
    fn get_snapshot(&self) -> Self::Snapshot;

    /// Register a callback fired after any change that could affect
    /// `get_snapshot`'s result. The callback carries no payload — on
    /// invocation, re-read via `get_snapshot`.
    fn subscribe(&self, on_change: Arc<dyn Fn() + Send + Sync>) -> Unsubscribe;
}

/// Free-function form of [`Subscribable::subscribe`], for call sites
/// that don't want to name the trait.
pub fn subscribe<T: Subscribable>(target: &T, on_change: impl Fn() + Send + Sync + 'static) -> Unsubscribe {
    target.subscribe(Arc::new(on_change))
}

/// Free-function form of [`Subscribable::get_snapshot`].
pub fn get_snapshot<T: Subscribable>(target: &T) -> T::Snapshot {
    target.get_snapshot()
}

/// Mirrors `target`'s snapshots into a `watch::Receiver`, so a consumer
/// can `.borrow()` the latest value or `.changed().await` for the next
/// one, instead of registering its own closure.
pub fn watch_channel<T>(target: Arc<T>) -> (watch::Receiver<T::Snapshot>, Unsubscribe)
where
    T: Subscribable + 'static,
    T::Snapshot: Clone + Send + Sync + 'static,
{
    let initial = target.get_snapshot();
    let (tx, rx) = watch::channel(initial);

    let publisher = target.clone();
    let unsubscribe = target.subscribe(Arc::new(move || {
        let _ = tx.send(publisher.get_snapshot());
    }));

    (rx, unsubscribe)
}
