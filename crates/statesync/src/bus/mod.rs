//! Path-indexed subscription bus (C1).
//!
//! Notifications are delivered to any subscriber whose path overlaps a
//! changed path: overlap means one path is a prefix of the other, so a
//! subscriber on `/users/u1` is notified by a change to `/users/u1/name`
//! and by a change to `/users` (or to the root), but not by a change to
//! `/users/u2`.

mod subscriber;

pub use subscriber::{Listener, Unsubscribe};

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::path::{Path, Segment};
use subscriber::Entry;

/// The path-indexed subscription bus.
pub struct Bus {
    root: Arc<Mutex<Vec<Entry>>>,
    buckets: Arc<Mutex<HashMap<Segment, Vec<Entry>>>>,
    counter: AtomicUsize,
    on_first_subscribe: Option<Box<dyn Fn() + Send + Sync>>,
    first_subscribed: AtomicBool,
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus")
            .field("root_len", &self.root.lock().len())
            .field("bucket_count", &self.buckets.lock().len())
            .finish()
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus {
    /// A bus with no first-subscribe hook.
    pub fn new() -> Self {
        Self {
            root: Arc::new(Mutex::new(Vec::new())),
            buckets: Arc::new(Mutex::new(HashMap::new())),
            counter: AtomicUsize::new(0),
            on_first_subscribe: None,
            first_subscribed: AtomicBool::new(false),
        }
    }

    /// A bus whose `hook` fires exactly once, the first time any path is
    /// subscribed to.
    pub fn with_first_subscribe_hook(hook: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            on_first_subscribe: Some(Box::new(hook)),
            ..Self::new()
        }
    }

    /// Register `listener` for notifications touching `path` or any
    /// ancestor/descendant of it. Dropping the returned [`Unsubscribe`]
    /// removes the registration.
    pub fn subscribe(&self, path: Path, listener: Listener) -> Unsubscribe {
        if self.on_first_subscribe.is_some()
            && !self.first_subscribed.swap(true, Ordering::SeqCst)
        {
            // Safe to unwrap: guarded by `is_some()` above.
            if let Some(hook) = &self.on_first_subscribe {
                hook();
            }
        }

        let id = self.counter.fetch_add(1, Ordering::Relaxed);
        let entry = Entry {
            id,
            path: path.clone(),
            listener,
        };

        match path.first().cloned() {
            None => self.root.lock().push(entry),
            Some(seg) => self.buckets.lock().entry(seg).or_default().push(entry),
        }

        Unsubscribe::new(id, path, self.root.clone(), self.buckets.clone())
    }

    /// Notify every subscriber whose path overlaps any entry in `changed`.
    ///
    /// A listener that panics is caught so it cannot prevent the rest of
    /// the fan-out from running.
    pub fn notify(&self, changed: &[Path]) {
        let root_changed = changed.iter().any(Path::is_root);

        let mut candidates: Vec<Entry> = Vec::new();
        let mut seen = std::collections::HashSet::new();

        {
            let root_guard = self.root.lock();
            for entry in root_guard.iter() {
                if seen.insert(entry.id) {
                    candidates.push(entry.clone());
                }
            }
        }

        {
            let bucket_guard = self.buckets.lock();
            if root_changed {
                for bucket in bucket_guard.values() {
                    for entry in bucket {
                        if seen.insert(entry.id) {
                            candidates.push(entry.clone());
                        }
                    }
                }
            } else {
                for changed_path in changed {
                    if let Some(seg) = changed_path.first() {
                        if let Some(bucket) = bucket_guard.get(seg) {
                            for entry in bucket {
                                if seen.insert(entry.id) {
                                    candidates.push(entry.clone());
                                }
                            }
                        }
                    }
                }
            }
        }

        for entry in candidates {
            let matches = changed.iter().any(|changed_path| entry.path.overlaps(changed_path));
            if !matches {
                continue;
            }
            let listener = entry.listener.clone();
            let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
                (listener)(&entry.path);
            }));
            if let Err(payload) = result {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "listener panicked".to_string());
                statesync_log::log_error!("bus listener panicked: {message}");
            }
        }
    }

    /// Number of currently registered subscriptions, root and bucketed.
    pub fn active_subscriptions(&self) -> usize {
        self.root.lock().len() + self.buckets.lock().values().map(Vec::len).sum::<usize>()
    }
}
