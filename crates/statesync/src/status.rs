//! Network status monitor (C3).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::Error;

/// Snapshot of a store's loading/connectivity state.
#[derive(Debug, Clone, Default)]
pub struct StoreStatus {
    /// A request is currently in flight and no cached value exists yet.
    pub is_loading: bool,
    /// A stale value is being shown while a background revalidation runs.
    pub is_revalidating: bool,
    /// The status monitor currently considers the host offline.
    pub is_offline: bool,
    /// The most recent operation's error, if any.
    pub error: Option<Arc<Error>>,
    /// Milliseconds since epoch of the last successful update.
    pub last_updated: u64,
}

/// A partial update applied to [`StoreStatus`]; `None` fields are left
/// unchanged.
#[derive(Debug, Clone, Default)]
pub struct StatusPatch {
    /// Overwrite `is_loading`.
    pub is_loading: Option<bool>,
    /// Overwrite `is_revalidating`.
    pub is_revalidating: Option<bool>,
    /// Overwrite `is_offline`.
    pub is_offline: Option<bool>,
    /// Overwrite `error`.
    pub error: Option<Option<Arc<Error>>>,
    /// Overwrite `last_updated`.
    pub last_updated: Option<u64>,
}

/// Reports connectivity transitions. The concrete OS/browser integration
/// is out of scope; only this trait boundary is specified, with a
/// `tokio::sync::watch`-based reference used in tests.
pub trait OnlineWatcher: Send + Sync {
    /// Subscribe to online/offline transitions.
    fn watch(&self) -> watch::Receiver<bool>;
}

/// Reports tab/window focus transitions, same treatment as [`OnlineWatcher`].
pub trait FocusWatcher: Send + Sync {
    /// Subscribe to focus/blur transitions.
    fn watch(&self) -> watch::Receiver<bool>;
}

type StatusListener = Box<dyn Fn(&StoreStatus) + Send + Sync>;

/// Coordinates reconnect/refocus/interval-driven reloads and tracks the
/// current [`StoreStatus`].
pub struct StatusMonitor {
    status: RwLock<StoreStatus>,
    listeners: RwLock<Vec<StatusListener>>,
    reload: Arc<dyn Fn() + Send + Sync>,
    interval_handle: RwLock<Option<JoinHandle<()>>>,
    disposed: AtomicBool,
}

impl std::fmt::Debug for StatusMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusMonitor")
            .field("status", &*self.status.read())
            .finish()
    }
}

/// Configuration for [`StatusMonitor::new`].
pub struct StatusMonitorConfig {
    /// Reload the store's last-used query when connectivity returns.
    pub reload_on_reconnect: bool,
    /// Reload the store's last-used query when the app regains focus.
    pub reload_on_focus: bool,
    /// Reload the store's last-used query on a fixed interval, if set.
    pub reload_interval: Option<Duration>,
}

impl StatusMonitor {
    /// Build a monitor wired to `reload`, started idle (no watchers
    /// attached yet — call [`StatusMonitor::attach`] to start one).
    pub fn new(reload: Arc<dyn Fn() + Send + Sync>) -> Self {
        Self {
            status: RwLock::new(StoreStatus::default()),
            listeners: RwLock::new(Vec::new()),
            reload,
            interval_handle: RwLock::new(None),
            disposed: AtomicBool::new(false),
        }
    }

    /// Start an interval-driven reload loop, if `config.reload_interval`
    /// is set, and wire up the given watchers per `config`.
    pub fn attach(
        &self,
        config: &StatusMonitorConfig,
        online: Option<Arc<dyn OnlineWatcher>>,
        focus: Option<Arc<dyn FocusWatcher>>,
    ) {
        if config.reload_on_reconnect {
            if let Some(online) = online {
                let mut rx = online.watch();
                let reload = self.reload.clone();
                tokio::spawn(async move {
                    let mut was_offline = !*rx.borrow();
                    while rx.changed().await.is_ok() {
                        let online_now = *rx.borrow();
                        if online_now && was_offline {
                            reload();
                        }
                        was_offline = !online_now;
                    }
                });
            }
        }

        if config.reload_on_focus {
            if let Some(focus) = focus {
                let mut rx = focus.watch();
                let reload = self.reload.clone();
                tokio::spawn(async move {
                    while rx.changed().await.is_ok() {
                        if *rx.borrow() {
                            reload();
                        }
                    }
                });
            }
        }

        if let Some(interval) = config.reload_interval {
            let reload = self.reload.clone();
            let handle = tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    ticker.tick().await;
                    reload();
                }
            });
            *self.interval_handle.write() = Some(handle);
        }
    }

    /// Current status snapshot.
    pub fn status(&self) -> StoreStatus {
        self.status.read().clone()
    }

    /// Merge `patch` into the current status, then notify status
    /// subscribers. Not path-scoped, so this does not go through the
    /// subscription bus.
    pub fn set_status(&self, patch: StatusPatch) {
        {
            let mut status = self.status.write();
            if let Some(v) = patch.is_loading {
                status.is_loading = v;
            }
            if let Some(v) = patch.is_revalidating {
                status.is_revalidating = v;
            }
            if let Some(v) = patch.is_offline {
                status.is_offline = v;
            }
            if let Some(v) = patch.error {
                status.error = v;
            }
            if let Some(v) = patch.last_updated {
                status.last_updated = v;
            }
        }
        let snapshot = self.status();
        for listener in self.listeners.read().iter() {
            listener(&snapshot);
        }
    }

    /// Subscribe to status changes. The returned guard, when dropped,
    /// removes the listener — callers keep it alive for as long as they
    /// want updates.
    pub fn subscribe(&self, listener: impl Fn(&StoreStatus) + Send + Sync + 'static) {
        self.listeners.write().push(Box::new(listener));
    }

    /// Release the interval task and stop reacting to watchers. Calling
    /// this more than once is a no-op.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.interval_handle.write().take() {
            handle.abort();
        }
    }
}

impl Drop for StatusMonitor {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn reconnect_triggers_reload() {
        let (tx, rx) = watch::channel(false);
        struct TestWatcher(watch::Receiver<bool>);
        impl OnlineWatcher for TestWatcher {
            fn watch(&self) -> watch::Receiver<bool> {
                self.0.clone()
            }
        }

        let reload_count = Arc::new(AtomicUsize::new(0));
        let reload_count2 = reload_count.clone();
        let monitor = StatusMonitor::new(Arc::new(move || {
            reload_count2.fetch_add(1, Ordering::SeqCst);
        }));

        monitor.attach(
            &StatusMonitorConfig {
                reload_on_reconnect: true,
                reload_on_focus: false,
                reload_interval: None,
            },
            Some(Arc::new(TestWatcher(rx))),
            None,
        );

        tx.send(true).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(reload_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn set_status_merges_partial_fields() {
        let monitor = StatusMonitor::new(Arc::new(|| {}));
        monitor.set_status(StatusPatch {
            is_loading: Some(true),
            ..Default::default()
        });
        assert!(monitor.status().is_loading);

        monitor.set_status(StatusPatch {
            is_offline: Some(true),
            ..Default::default()
        });
        let status = monitor.status();
        assert!(status.is_loading);
        assert!(status.is_offline);
    }

    #[test]
    fn dispose_is_idempotent() {
        let monitor = StatusMonitor::new(Arc::new(|| {}));
        monitor.dispose();
        monitor.dispose();
    }
}
