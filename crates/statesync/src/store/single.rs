//! Single-value store (C6): one record mirrored between memory, cache,
//! and the adapters, with optimistic mutation + rollback.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use crate::adapters::durable::DurableAdapter;
use crate::adapters::AdapterSet;
use crate::binding::Subscribable;
use crate::bus::{Bus, Unsubscribe};
use crate::cache::Cache;
use crate::config::EngineConfig;
use crate::error::{Error, ErrorHook, ErrorMeta};
use crate::handle::Snapshotted;
use crate::path::Path;
use crate::record::Record;
use crate::status::{StatusMonitor, StatusPatch, StoreStatus};

use super::CloneError;

type SharedFetch<R> = Shared<BoxFuture<'static, Result<R, Arc<Error>>>>;

fn default_clock() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Coordinates a single entity's in-memory value, cache entry, and
/// adapter-backed operations.
pub struct SingleStore<R: Record> {
    state: RwLock<Option<R>>,
    adapters: AdapterSet<R>,
    cache: Option<Arc<Cache>>,
    cache_key: Option<String>,
    ttl: Duration,
    bus: Bus,
    status: StatusMonitor,
    clock: fn() -> u64,
    in_flight: Mutex<Option<SharedFetch<R>>>,
    error_hook: Option<Arc<dyn ErrorHook>>,
    config: Option<Arc<EngineConfig>>,
    durable: Option<Arc<DurableAdapter>>,
    self_ref: std::sync::OnceLock<std::sync::Weak<SingleStore<R>>>,
}

impl<R: Record> std::fmt::Debug for SingleStore<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleStore")
            .field("has_value", &self.state.read().is_some())
            .finish()
    }
}

impl<R: Record> SingleStore<R> {
    /// Build a store. `cache_key`/`cache` are both required for caching
    /// to take effect; either omitted disables it.
    pub fn new(adapters: AdapterSet<R>) -> Self {
        let reload = Arc::new(|| {});
        Self {
            state: RwLock::new(None),
            adapters,
            cache: None,
            cache_key: None,
            ttl: Duration::from_secs(60),
            bus: Bus::new(),
            status: StatusMonitor::new(reload),
            clock: default_clock,
            in_flight: Mutex::new(None),
            error_hook: None,
            config: None,
            durable: None,
            self_ref: std::sync::OnceLock::new(),
        }
    }

    /// Wrap the built store in an `Arc`, enabling background
    /// stale-while-revalidate refetches. Without this, a stale cache hit
    /// still returns immediately, it just can't spawn its own refresh.
    pub fn into_shared(self) -> Arc<Self> {
        let store = Arc::new(self);
        let _ = store.self_ref.set(Arc::downgrade(&store));
        store
    }

    /// Enable caching under `key` with `ttl`, sharing `cache` with other stores.
    pub fn with_cache(mut self, cache: Arc<Cache>, key: impl Into<String>, ttl: Duration) -> Self {
        self.cache = Some(cache);
        self.cache_key = Some(key.into());
        self.ttl = ttl;
        self
    }

    /// Inject a deterministic clock for tests.
    pub fn with_clock(mut self, clock: fn() -> u64) -> Self {
        self.clock = clock;
        self
    }

    /// Attach a per-store error hook, invoked before any global hook.
    pub fn with_error_hook(mut self, hook: Arc<dyn ErrorHook>) -> Self {
        self.error_hook = Some(hook);
        self
    }

    /// Attach the engine-wide config, whose `on_error` hook runs after the
    /// per-store one on every failed operation.
    pub fn with_config(mut self, config: Arc<EngineConfig>) -> Self {
        self.config = Some(config);
        self
    }

    /// Attach a durable adapter. `load()` is consulted once here to
    /// warm-start the in-memory value; from then on `save()` runs after
    /// every successful `set`/`patch` reconciliation.
    pub fn with_durable(mut self, durable: Arc<DurableAdapter>) -> Self {
        if let Ok(Some(record)) = durable.load::<R>() {
            *self.state.get_mut() = Some(record);
        }
        self.durable = Some(durable);
        self
    }

    /// Current in-memory value, if loaded.
    pub fn value(&self) -> Option<R> {
        self.state.read().clone()
    }

    /// Current status snapshot.
    pub fn status(&self) -> StoreStatus {
        self.status.status()
    }

    /// Subscribe to changes at the store's root.
    pub fn subscribe(&self, listener: impl Fn(&Path) + Send + Sync + 'static) -> Unsubscribe {
        self.bus.subscribe(Path::root(), Arc::new(move |p| listener(p)))
    }

    /// Subscribe to status changes, separately from data changes.
    pub fn subscribe_to_status(&self, listener: impl Fn(&StoreStatus) + Send + Sync + 'static) {
        self.status.subscribe(listener);
    }

    fn notify_root(&self) {
        self.bus.notify(&[Path::root()]);
    }

    fn fail(&self, error: Error, operation: &'static str, rollback: Option<&R>) -> Error {
        let shared = Arc::new(error.clone_error());
        let meta = ErrorMeta {
            operation,
            endpoint: None,
            params: Value::Null,
            rollback_data: rollback.map(|r| serde_json::to_value(r).unwrap_or(Value::Null)),
        };
        if let Some(hook) = &self.error_hook {
            hook.on_error(&shared, &meta);
        }
        if let Some(config) = &self.config {
            config.on_error.on_error(&shared, &meta);
        }
        self.status.set_status(StatusPatch {
            error: Some(Some(shared)),
            is_loading: Some(false),
            is_revalidating: Some(false),
            ..Default::default()
        });
        error
    }

    fn persist(&self, record: &R) {
        if let Some(durable) = &self.durable {
            if let Err(e) = durable.save(record) {
                statesync_log::log_warn!("durable save failed: {e}");
            }
        }
    }

    /// Fetch the value, consulting the cache unless `force` is set.
    /// `force` strips any `_force` parameter the caller used to request
    /// this, per the boundary contract: the adapter itself never sees it.
    pub async fn get(&self, force: bool) -> Result<R, Error> {
        if !force {
            if let (Some(cache), Some(key)) = (&self.cache, &self.cache_key) {
                if let Some(hit) = cache.get(key, self.ttl) {
                    let record: R = serde_json::from_value(hit.data)?;
                    *self.state.write() = Some(record.clone());
                    if hit.stale {
                        self.revalidate();
                    }
                    return Ok(record);
                }
            }
        }

        let fetch = {
            let mut in_flight = self.in_flight.lock();
            if let Some(shared) = in_flight.as_ref() {
                shared.clone()
            } else {
                let adapters_get_one = self.adapters.get_one.clone();
                let fut: BoxFuture<'static, Result<R, Arc<Error>>> = Box::pin(async move {
                    match adapters_get_one {
                        Some(get_one) => get_one(Default::default()).await.map_err(Arc::new),
                        None => Err(Arc::new(Error::Config { op: "get" })),
                    }
                });
                let shared = fut.shared();
                *in_flight = Some(shared.clone());
                shared
            }
        };

        self.status.set_status(StatusPatch {
            is_loading: Some(self.state.read().is_none()),
            is_revalidating: Some(self.state.read().is_some()),
            ..Default::default()
        });

        let result = fetch.await;
        self.in_flight.lock().take();

        match result {
            Ok(record) => {
                *self.state.write() = Some(record.clone());
                if let (Some(cache), Some(key)) = (&self.cache, &self.cache_key) {
                    cache.set(key.clone(), serde_json::to_value(&record)?);
                }
                self.status.set_status(StatusPatch {
                    is_loading: Some(false),
                    is_revalidating: Some(false),
                    error: Some(None),
                    last_updated: Some((self.clock)()),
                    ..Default::default()
                });
                self.notify_root();
                Ok(record)
            }
            Err(shared_err) => Err(self.fail(shared_err.clone_error(), "get", None)),
        }
    }

    /// Refetch in the background, reusing `get`'s own in-flight dedup so
    /// a concurrent explicit `get(true)` collapses onto the same
    /// request. Requires the store to have been built via
    /// [`SingleStore::into_shared`]; otherwise there is no owning `Arc`
    /// to hand the spawned task, and the stale hit already returned
    /// synchronously, so this is a no-op beyond the log line.
    fn revalidate(&self) {
        match self.self_ref.get().and_then(std::sync::Weak::upgrade) {
            Some(store) => {
                tokio::spawn(async move {
                    if let Err(e) = store.get(true).await {
                        statesync_log::log_warn!("background revalidation failed: {e}");
                    }
                });
            }
            None => {
                statesync_log::log_debug!(
                    "stale cache hit with no shared handle, skipping background revalidation"
                );
            }
        }
    }

    /// Replace the whole value, optimistically.
    pub async fn set(&self, record: R) -> Result<R, Error> {
        let snapshot = self.state.read().clone();
        *self.state.write() = Some(record.clone());
        self.notify_root();

        let Some(set_fn) = self.adapters.set.clone() else {
            self.rollback(snapshot.clone());
            return Err(self.fail(Error::Config { op: "set" }, "set", snapshot.as_ref()));
        };

        match set_fn(record).await {
            Ok(reconciled) => {
                *self.state.write() = Some(reconciled.clone());
                if let (Some(cache), Some(key)) = (&self.cache, &self.cache_key) {
                    cache.set(key.clone(), serde_json::to_value(&reconciled)?);
                }
                self.persist(&reconciled);
                self.status.set_status(StatusPatch {
                    last_updated: Some((self.clock)()),
                    error: Some(None),
                    ..Default::default()
                });
                self.notify_root();
                Ok(reconciled)
            }
            Err(e) => {
                self.rollback(snapshot.clone());
                Err(self.fail(e, "set", snapshot.as_ref()))
            }
        }
    }

    /// Partially update the value by merging `patch` into its JSON form.
    pub async fn patch(&self, patch: Value) -> Result<R, Error> {
        let snapshot = self.state.read().clone();
        let Some(current) = snapshot.clone() else {
            return Err(Error::NotFound {
                id: "<single>".to_string(),
            });
        };

        let mut merged = serde_json::to_value(&current)?;
        super::merge_json(&mut merged, &patch);
        let optimistic: R = serde_json::from_value(merged)?;
        *self.state.write() = Some(optimistic.clone());
        self.notify_root();

        let Some(patch_fn) = self.adapters.patch.clone() else {
            self.rollback(snapshot.clone());
            return Err(self.fail(Error::Config { op: "patch" }, "patch", snapshot.as_ref()));
        };

        match patch_fn(current.id(), patch).await {
            Ok(reconciled) => {
                *self.state.write() = Some(reconciled.clone());
                if let (Some(cache), Some(key)) = (&self.cache, &self.cache_key) {
                    cache.set(key.clone(), serde_json::to_value(&reconciled)?);
                }
                self.persist(&reconciled);
                self.status.set_status(StatusPatch {
                    last_updated: Some((self.clock)()),
                    error: Some(None),
                    ..Default::default()
                });
                self.notify_root();
                Ok(reconciled)
            }
            Err(e) => {
                self.rollback(snapshot.clone());
                Err(self.fail(e, "patch", snapshot.as_ref()))
            }
        }
    }

    /// Clear the in-memory value and cache entry without touching the
    /// durable or remote side (§3.3: `dispose` does not clear storage;
    /// `clear` is the explicit, caller-invoked counterpart).
    pub fn clear(&self) {
        *self.state.write() = None;
        if let (Some(cache), Some(key)) = (&self.cache, &self.cache_key) {
            cache.clear(key);
        }
        self.notify_root();
    }

    fn rollback(&self, snapshot: Option<R>) {
        *self.state.write() = snapshot;
        self.notify_root();
    }

    /// Release the status monitor's listeners/timers. Does not clear the
    /// durable store.
    pub fn dispose(&self) {
        self.status.dispose();
    }
}

impl<R: Record> Snapshotted for SingleStore<R> {
    fn snapshot_value(&self) -> Value {
        serde_json::to_value(&*self.state.read()).unwrap_or(Value::Null)
    }

    fn subscribe_path(&self, path: Path, listener: crate::bus::Listener) -> Unsubscribe {
        self.bus.subscribe(path, listener)
    }
}

impl<R: Record> Subscribable for SingleStore<R> {
    type Snapshot = Option<R>;

    fn get_snapshot(&self) -> Self::Snapshot {
        self.value()
    }

    fn subscribe(&self, on_change: Arc<dyn Fn() + Send + Sync>) -> Unsubscribe {
        SingleStore::subscribe(self, move |_path| on_change())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::test_support::Todo;
    use std::sync::atomic::AtomicUsize;

    fn todo(id: &str, title: &str) -> Todo {
        Todo {
            id: id.to_string(),
            title: title.to_string(),
            done: false,
        }
    }

    #[tokio::test]
    async fn get_populates_state_and_notifies() {
        let adapters = AdapterSet {
            get_one: Some(Arc::new(|_params| {
                Box::pin(async { Ok(todo("1", "fetched")) })
            })),
            ..AdapterSet::default()
        };
        let store = SingleStore::new(adapters);
        let notified = Arc::new(AtomicUsize::new(0));
        let notified2 = notified.clone();
        let _sub = store.subscribe(move |_| {
            notified2.fetch_add(1, Ordering::SeqCst);
        });

        let record = store.get(false).await.unwrap();
        assert_eq!(record.title, "fetched");
        assert_eq!(notified.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn set_without_adapter_rolls_back() {
        let store: SingleStore<Todo> = SingleStore::new(AdapterSet::default());
        let err = store.set(todo("1", "x")).await.unwrap_err();
        assert!(matches!(err, Error::Config { op: "set" }));
        assert!(store.value().is_none());
    }

    #[tokio::test]
    async fn failed_set_runs_both_the_store_hook_and_the_global_hook() {
        let store_hook_ran = Arc::new(AtomicUsize::new(0));
        let store_hook_ran2 = store_hook_ran.clone();
        let global_hook_ran = Arc::new(AtomicUsize::new(0));
        let global_hook_ran2 = global_hook_ran.clone();

        let store: SingleStore<Todo> = SingleStore::new(AdapterSet::default())
            .with_error_hook(Arc::new(move |_: &Arc<Error>, _: &ErrorMeta| {
                store_hook_ran2.fetch_add(1, Ordering::SeqCst);
            }))
            .with_config(Arc::new(
                EngineConfig::new(url::Url::parse("https://api.example.com").unwrap())
                    .with_error_hook(Arc::new(move |_: &Arc<Error>, _: &ErrorMeta| {
                        global_hook_ran2.fetch_add(1, Ordering::SeqCst);
                    })),
            ));

        store.set(todo("1", "x")).await.unwrap_err();
        assert_eq!(store_hook_ran.load(Ordering::SeqCst), 1);
        assert_eq!(global_hook_ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn durable_warm_starts_then_persists_on_set() {
        use crate::adapters::durable::InMemoryKvStore;

        let kv: Arc<dyn crate::adapters::durable::KvStore> = Arc::new(InMemoryKvStore::default());
        let durable = Arc::new(DurableAdapter::new(kv, "profile"));
        durable.save(&todo("1", "orig")).unwrap();

        let store: SingleStore<Todo> =
            SingleStore::new(AdapterSet::default()).with_durable(durable.clone());
        assert_eq!(store.value().unwrap().title, "orig");

        store.persist(&todo("1", "updated"));
        assert_eq!(durable.load::<Todo>().unwrap().unwrap().title, "updated");
    }

    #[tokio::test]
    async fn patch_rolls_back_on_adapter_failure() {
        let adapters = AdapterSet {
            get_one: Some(Arc::new(|_| Box::pin(async { Ok(todo("1", "orig")) }))),
            patch: Some(Arc::new(|_id, _patch| {
                Box::pin(async { Err(Error::Quota("disk full".into())) })
            })),
            ..AdapterSet::default()
        };
        let store = SingleStore::new(adapters);
        store.get(false).await.unwrap();

        let result = store
            .patch(serde_json::json!({"title": "changed"}))
            .await;
        assert!(result.is_err());
        assert_eq!(store.value().unwrap().title, "orig");
    }

    #[tokio::test]
    async fn patch_merges_and_reconciles_on_success() {
        let adapters = AdapterSet {
            get_one: Some(Arc::new(|_| Box::pin(async { Ok(todo("1", "orig")) }))),
            patch: Some(Arc::new(|_id, patch| {
                Box::pin(async move {
                    let title = patch["title"].as_str().unwrap().to_string();
                    Ok(todo("1", &title))
                })
            })),
            ..AdapterSet::default()
        };
        let store = SingleStore::new(adapters);
        store.get(false).await.unwrap();

        let updated = store
            .patch(serde_json::json!({"title": "changed"}))
            .await
            .unwrap();
        assert_eq!(updated.title, "changed");
        assert_eq!(store.value().unwrap().title, "changed");
    }
}
