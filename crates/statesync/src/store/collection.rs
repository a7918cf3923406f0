//! Collection store (C7): a keyed, ordered collection mirrored between
//! memory, cache, and the adapters.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use crate::adapters::durable::DurableAdapter;
use crate::adapters::push::PushMode;
use crate::adapters::{AdapterSet, QueryParams};
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

fn default_clock() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// The collection's in-memory state: a lookup table plus the order its
/// ids were inserted in, kept in lockstep rather than reached for via the
/// `indexmap` crate.
#[derive(Default)]
struct CollectionState<R: Record> {
    ids: Vec<String>,
    items: HashMap<String, R>,
}

impl<R: Record> CollectionState<R> {
    fn assert_invariant(&self) {
        debug_assert_eq!(self.ids.len(), self.items.len());
        debug_assert!(self
            .ids
            .iter()
            .all(|id| self.items.get(id).map(|r| &r.id() == id).unwrap_or(false)));
    }

    fn insert(&mut self, record: R) {
        let id = record.id();
        if !self.items.contains_key(&id) {
            self.ids.push(id.clone());
        }
        self.items.insert(id, record);
        self.assert_invariant();
    }

    /// Removes `id`, returning its former index for ordered rollback.
    fn remove(&mut self, id: &str) -> Option<(usize, R)> {
        let index = self.ids.iter().position(|existing| existing == id)?;
        self.ids.remove(index);
        let record = self.items.remove(id)?;
        self.assert_invariant();
        Some((index, record))
    }

    fn reinsert_at(&mut self, index: usize, record: R) {
        let id = record.id();
        let index = index.min(self.ids.len());
        self.ids.insert(index, id.clone());
        self.items.insert(id, record);
        self.assert_invariant();
    }

    fn snapshot(&self) -> Vec<R> {
        self.ids.iter().filter_map(|id| self.items.get(id).cloned()).collect()
    }
}

/// Coordinates a keyed collection's in-memory state, cache, and
/// adapter-backed operations.
pub struct CollectionStore<R: Record> {
    state: RwLock<CollectionState<R>>,
    adapters: AdapterSet<R>,
    cache: Option<Arc<Cache>>,
    cache_key: Option<String>,
    ttl: Duration,
    bus: Bus,
    status: StatusMonitor,
    clock: fn() -> u64,
    error_hook: Option<Arc<dyn ErrorHook>>,
    config: Option<Arc<EngineConfig>>,
    durable: Option<Arc<DurableAdapter>>,
    self_ref: std::sync::OnceLock<std::sync::Weak<CollectionStore<R>>>,
}

impl<R: Record> std::fmt::Debug for CollectionStore<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionStore")
            .field("len", &self.state.read().ids.len())
            .finish()
    }
}

impl<R: Record> CollectionStore<R> {
    /// Build a store from its adapter set.
    pub fn new(adapters: AdapterSet<R>) -> Self {
        Self {
            state: RwLock::new(CollectionState::default()),
            adapters,
            cache: None,
            cache_key: None,
            ttl: Duration::from_secs(60),
            bus: Bus::new(),
            status: StatusMonitor::new(Arc::new(|| {})),
            clock: default_clock,
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

    /// Enable caching of the full list under `key`.
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

    /// Attach a per-store error hook.
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

    /// Attach a durable adapter. `load_all()` is consulted once here to
    /// warm-start the in-memory collection; from then on `save_all()` runs
    /// after every successful `create`/`patch`/`delete` reconciliation.
    pub fn with_durable(mut self, durable: Arc<DurableAdapter>) -> Self {
        if let Ok(records) = durable.load_all::<R>() {
            let state = self.state.get_mut();
            for record in records {
                state.insert(record);
            }
        }
        self.durable = Some(durable);
        self
    }

    /// A snapshot of every record, in insertion order.
    pub fn snapshot(&self) -> Vec<R> {
        self.state.read().snapshot()
    }

    /// A single record by id, from memory only (no fetch).
    pub fn peek(&self, id: &str) -> Option<R> {
        self.state.read().items.get(id).cloned()
    }

    /// Current status snapshot.
    pub fn status(&self) -> StoreStatus {
        self.status.status()
    }

    /// Subscribe to changes overlapping `path` (e.g. the collection
    /// root, or one record's path).
    pub fn subscribe(&self, path: Path, listener: impl Fn(&Path) + Send + Sync + 'static) -> Unsubscribe {
        self.bus.subscribe(path, Arc::new(listener))
    }

    /// Subscribe to status changes, separately from data changes.
    pub fn subscribe_to_status(&self, listener: impl Fn(&StoreStatus) + Send + Sync + 'static) {
        self.status.subscribe(listener);
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
            ..Default::default()
        });
        error
    }

    fn persist(&self) {
        if let Some(durable) = &self.durable {
            if let Err(e) = durable.save_all(&self.snapshot()) {
                statesync_log::log_warn!("durable save failed: {e}");
            }
        }
    }

    /// Query the list. Consults the cache unless `force` is set; a cache
    /// miss or `force` runs the adapter's `get` and replaces the whole
    /// in-memory list.
    pub async fn get(&self, params: QueryParams, force: bool) -> Result<Vec<R>, Error> {
        let cache_key = self
            .cache_key
            .as_ref()
            .map(|base| format!("{base}?{}", serialize_params(&params)));

        if !force {
            if let (Some(cache), Some(key)) = (&self.cache, &cache_key) {
                if let Some(hit) = cache.get(key, self.ttl) {
                    let records: Vec<R> = serde_json::from_value(hit.data)?;
                    self.replace_all(records.clone());
                    if hit.stale {
                        self.revalidate(params.clone());
                    }
                    return Ok(records);
                }
            }
        }

        let Some(get_fn) = self.adapters.get.clone() else {
            return Err(self.fail(Error::Config { op: "get" }, "get", None));
        };

        self.status.set_status(StatusPatch {
            is_loading: Some(self.state.read().ids.is_empty()),
            is_revalidating: Some(!self.state.read().ids.is_empty()),
            ..Default::default()
        });

        match get_fn(params).await {
            Ok(records) => {
                self.replace_all(records.clone());
                if let (Some(cache), Some(key)) = (&self.cache, &cache_key) {
                    cache.set(key.clone(), serde_json::to_value(&records)?);
                }
                self.status.set_status(StatusPatch {
                    is_loading: Some(false),
                    is_revalidating: Some(false),
                    error: Some(None),
                    last_updated: Some((self.clock)()),
                });
                Ok(records)
            }
            Err(e) => Err(self.fail(e, "get", None)),
        }
    }

    /// Fetch a single record by id. Returns the in-memory copy unless
    /// `force` is set or the id is unknown.
    pub async fn get_one(&self, id: &str, force: bool) -> Result<R, Error> {
        if !force {
            if let Some(record) = self.peek(id) {
                return Ok(record);
            }
        }

        let Some(get_one_fn) = self.adapters.get_one.clone() else {
            return Err(self.fail(Error::Config { op: "get_one" }, "get_one", None));
        };

        let mut params = QueryParams::new();
        params.insert("id".to_string(), Value::String(id.to_string()));

        match get_one_fn(params).await {
            Ok(record) => {
                self.state.write().insert(record.clone());
                self.bus.notify(&[Path::of(id.to_string()), Path::root()]);
                self.status.set_status(StatusPatch {
                    error: Some(None),
                    last_updated: Some((self.clock)()),
                    ..Default::default()
                });
                Ok(record)
            }
            Err(e) => Err(self.fail(e, "get_one", None)),
        }
    }

    /// Refetch `params` in the background. Requires the store to have
    /// been built via [`CollectionStore::into_shared`]; otherwise the
    /// stale hit already returned synchronously and this only logs.
    fn revalidate(&self, params: QueryParams) {
        match self.self_ref.get().and_then(std::sync::Weak::upgrade) {
            Some(store) => {
                tokio::spawn(async move {
                    if let Err(e) = store.get(params, true).await {
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

    fn replace_all(&self, records: Vec<R>) {
        let mut state = self.state.write();
        *state = CollectionState::default();
        for record in records {
            state.insert(record);
        }
        drop(state);
        self.bus.notify(&[Path::root()]);
    }

    /// Optimistically insert `record`, then persist it via `create`.
    pub async fn create(&self, record: R) -> Result<R, Error> {
        let id = record.id();
        self.state.write().insert(record.clone());
        self.bus.notify(&[Path::of(id.clone()), Path::root()]);

        let Some(create_fn) = self.adapters.create.clone() else {
            let removed = self.state.write().remove(&id);
            self.bus.notify(&[Path::of(id.clone()), Path::root()]);
            return Err(self.fail(
                Error::Config { op: "create" },
                "create",
                removed.map(|(_, r)| r).as_ref(),
            ));
        };

        match create_fn(record).await {
            Ok(reconciled) => {
                self.state.write().insert(reconciled.clone());
                self.bus.notify(&[Path::of(id), Path::root()]);
                if let (Some(cache), Some(key)) = (&self.cache, &self.cache_key) {
                    cache.clear_prefix(key);
                }
                self.persist();
                self.status.set_status(StatusPatch {
                    error: Some(None),
                    last_updated: Some((self.clock)()),
                    ..Default::default()
                });
                Ok(reconciled)
            }
            Err(e) => {
                let removed = self.state.write().remove(&id);
                self.bus.notify(&[Path::of(id), Path::root()]);
                Err(self.fail(e, "create", removed.map(|(_, r)| r).as_ref()))
            }
        }
    }

    /// Merge `patch` into the record at `id`, optimistically.
    pub async fn patch(&self, id: &str, patch: Value) -> Result<R, Error> {
        let Some(current) = self.peek(id) else {
            return Err(Error::NotFound { id: id.to_string() });
        };

        let touched = patch_notify_paths(id, &patch);

        let mut merged = serde_json::to_value(&current)?;
        super::merge_json(&mut merged, &patch);
        let optimistic: R = serde_json::from_value(merged)?;
        self.state.write().insert(optimistic);
        self.bus.notify(&touched);

        let Some(patch_fn) = self.adapters.patch.clone() else {
            self.state.write().insert(current.clone());
            self.bus.notify(&touched);
            return Err(self.fail(Error::Config { op: "patch" }, "patch", Some(&current)));
        };

        match patch_fn(id.to_string(), patch).await {
            Ok(reconciled) => {
                self.state.write().insert(reconciled.clone());
                self.bus.notify(&touched);
                if let (Some(cache), Some(key)) = (&self.cache, &self.cache_key) {
                    cache.clear_prefix(key);
                }
                self.persist();
                self.status.set_status(StatusPatch {
                    error: Some(None),
                    last_updated: Some((self.clock)()),
                    ..Default::default()
                });
                Ok(reconciled)
            }
            Err(e) => {
                self.state.write().insert(current.clone());
                self.bus.notify(&touched);
                Err(self.fail(e, "patch", Some(&current)))
            }
        }
    }

    /// Remove the record at `id`, optimistically. On failure it is
    /// reinserted at its original index, not appended to the end.
    pub async fn delete(&self, id: &str) -> Result<(), Error> {
        let Some((index, removed)) = self.state.write().remove(id) else {
            return Err(Error::NotFound { id: id.to_string() });
        };
        self.bus.notify(&[Path::of(id.to_string()), Path::root()]);

        let Some(delete_fn) = self.adapters.delete.clone() else {
            self.state.write().reinsert_at(index, removed.clone());
            self.bus.notify(&[Path::of(id.to_string()), Path::root()]);
            return Err(self.fail(Error::Config { op: "delete" }, "delete", Some(&removed)));
        };

        let mut params = QueryParams::new();
        params.insert("id".to_string(), Value::String(id.to_string()));

        match delete_fn(params).await {
            Ok(()) => {
                if let (Some(cache), Some(key)) = (&self.cache, &self.cache_key) {
                    cache.clear_prefix(key);
                }
                self.persist();
                self.status.set_status(StatusPatch {
                    error: Some(None),
                    last_updated: Some((self.clock)()),
                    ..Default::default()
                });
                Ok(())
            }
            Err(e) => {
                self.state.write().reinsert_at(index, removed.clone());
                self.bus.notify(&[Path::of(id.to_string()), Path::root()]);
                Err(self.fail(e, "delete", Some(&removed)))
            }
        }
    }

    /// Clear the in-memory collection and its cache entry.
    pub fn clear(&self) {
        *self.state.write() = CollectionState::default();
        if let (Some(cache), Some(key)) = (&self.cache, &self.cache_key) {
            cache.clear_prefix(key);
        }
        self.bus.notify(&[Path::root()]);
    }

    /// Apply a push-originated event directly to the collection state,
    /// bypassing the optimistic/rollback machinery and the cache (push
    /// updates are authoritative and unconditional).
    pub fn apply_push(&self, mode: &PushMode, record: R) {
        let id = record.id();
        match mode {
            PushMode::Replace => {
                self.replace_all(vec![record]);
                return;
            }
            PushMode::Upsert => {
                self.state.write().insert(record);
            }
            PushMode::Append { dedupe_key, max_items } => {
                let mut state = self.state.write();
                if let Some(key) = dedupe_key {
                    let duplicate = state.items.values().any(|existing| {
                        field_str(existing, key) == field_str(&record, key)
                    });
                    if duplicate {
                        return;
                    }
                }
                state.insert(record);
                if let Some(max) = max_items {
                    while state.ids.len() > *max {
                        let oldest = state.ids[0].clone();
                        state.remove(&oldest);
                    }
                }
            }
        }
        self.bus.notify(&[Path::of(id), Path::root()]);
    }

    /// Release the status monitor's listeners/timers.
    pub fn dispose(&self) {
        self.status.dispose();
    }
}

impl<R: Record> Subscribable for CollectionStore<R> {
    type Snapshot = Vec<R>;

    fn get_snapshot(&self) -> Self::Snapshot {
        self.snapshot()
    }

    fn subscribe(&self, on_change: Arc<dyn Fn() + Send + Sync>) -> Unsubscribe {
        CollectionStore::subscribe(self, Path::root(), move |_path| on_change())
    }
}

/// The paths a `patch` call should notify: one `[id, field]` per top-level
/// key the partial touches, or plain `[id]` if the partial is not an
/// object (or touches no fields at all).
fn patch_notify_paths(id: &str, patch: &Value) -> Vec<Path> {
    match patch.as_object() {
        Some(fields) if !fields.is_empty() => fields
            .keys()
            .map(|field| Path::of(id.to_string()).child(field.clone()))
            .collect(),
        _ => vec![Path::of(id.to_string())],
    }
}

fn field_str<R: Record>(record: &R, field: &str) -> Option<String> {
    serde_json::to_value(record)
        .ok()?
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn serialize_params(params: &QueryParams) -> String {
    let mut entries: Vec<(&String, &Value)> = params.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    serde_json::to_string(&entries).unwrap_or_default()
}

impl<R: Record> Snapshotted for CollectionStore<R> {
    fn snapshot_value(&self) -> Value {
        let state = self.state.read();
        let map: serde_json::Map<String, Value> = state
            .ids
            .iter()
            .filter_map(|id| {
                state
                    .items
                    .get(id)
                    .and_then(|r| serde_json::to_value(r).ok())
                    .map(|v| (id.clone(), v))
            })
            .collect();
        Value::Object(map)
    }

    fn subscribe_path(&self, path: Path, listener: crate::bus::Listener) -> Unsubscribe {
        self.bus.subscribe(path, listener)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::test_support::Todo;

    fn todo(id: &str, title: &str) -> Todo {
        Todo {
            id: id.to_string(),
            title: title.to_string(),
            done: false,
        }
    }

    #[tokio::test]
    async fn create_then_snapshot_preserves_order() {
        let adapters = AdapterSet {
            create: Some(Arc::new(|record: Todo| Box::pin(async move { Ok(record) }))),
            ..AdapterSet::default()
        };
        let store = CollectionStore::new(adapters);
        store.create(todo("1", "a")).await.unwrap();
        store.create(todo("2", "b")).await.unwrap();

        let ids: Vec<String> = store.snapshot().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["1".to_string(), "2".to_string()]);
    }

    #[tokio::test]
    async fn delete_failure_reinserts_at_original_index() {
        let adapters = AdapterSet {
            create: Some(Arc::new(|record: Todo| Box::pin(async move { Ok(record) }))),
            delete: Some(Arc::new(|_params| {
                Box::pin(async { Err(Error::Quota("locked".into())) })
            })),
            ..AdapterSet::default()
        };
        let store = CollectionStore::new(adapters);
        store.create(todo("1", "a")).await.unwrap();
        store.create(todo("2", "b")).await.unwrap();
        store.create(todo("3", "c")).await.unwrap();

        let result = store.delete("2").await;
        assert!(result.is_err());

        let ids: Vec<String> = store.snapshot().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["1".to_string(), "2".to_string(), "3".to_string()]);
    }

    #[tokio::test]
    async fn patch_notifies_only_the_touched_record_path() {
        let adapters = AdapterSet {
            create: Some(Arc::new(|record: Todo| Box::pin(async move { Ok(record) }))),
            patch: Some(Arc::new(|_id, patch: Value| {
                Box::pin(async move {
                    let title = patch["title"].as_str().unwrap().to_string();
                    Ok(todo("1", &title))
                })
            })),
            ..AdapterSet::default()
        };
        let store = CollectionStore::new(adapters);
        store.create(todo("1", "a")).await.unwrap();
        store.create(todo("2", "b")).await.unwrap();

        let touched = Arc::new(Mutex::new(Vec::new()));
        let touched2 = touched.clone();
        let _sub = store.subscribe(Path::of("2"), move |p| {
            touched2.lock().push(p.clone());
        });

        store.patch("1", serde_json::json!({"title": "updated"})).await.unwrap();
        assert!(touched.lock().is_empty());
    }

    #[tokio::test]
    async fn patch_wakes_the_touched_field_not_a_sibling_field() {
        let adapters = AdapterSet {
            create: Some(Arc::new(|record: Todo| Box::pin(async move { Ok(record) }))),
            patch: Some(Arc::new(|_id, patch: Value| {
                Box::pin(async move {
                    let title = patch["title"].as_str().unwrap().to_string();
                    Ok(todo("1", &title))
                })
            })),
            ..AdapterSet::default()
        };
        let store = CollectionStore::new(adapters);
        store.create(todo("1", "a")).await.unwrap();

        let title_hits = Arc::new(Mutex::new(0));
        let title_hits2 = title_hits.clone();
        let _title_sub = store.subscribe(Path::of("1").child("title"), move |_| {
            *title_hits2.lock() += 1;
        });
        let done_hits = Arc::new(Mutex::new(0));
        let done_hits2 = done_hits.clone();
        let _done_sub = store.subscribe(Path::of("1").child("done"), move |_| {
            *done_hits2.lock() += 1;
        });

        store.patch("1", serde_json::json!({"title": "updated"})).await.unwrap();

        // The optimistic apply and the success reconciliation both notify
        // the touched field once each.
        assert_eq!(*title_hits.lock(), 2);
        assert_eq!(*done_hits.lock(), 0);
    }

    #[tokio::test]
    async fn create_invalidates_the_list_cache() {
        let adapters = AdapterSet {
            get: Some(Arc::new(|_params| Box::pin(async { Ok(vec![todo("0", "seed")]) }))),
            create: Some(Arc::new(|record: Todo| Box::pin(async move { Ok(record) }))),
            ..AdapterSet::default()
        };
        let cache = Arc::new(Cache::new(10));
        let store =
            CollectionStore::new(adapters).with_cache(cache.clone(), "todos", Duration::from_secs(60));

        store.get(QueryParams::new(), false).await.unwrap();
        assert!(cache.get("todos?[]", Duration::from_secs(60)).is_some());

        store.create(todo("1", "a")).await.unwrap();
        assert!(cache.get("todos?[]", Duration::from_secs(60)).is_none());
    }

    #[test]
    fn durable_warm_starts_then_persists_on_mutation() {
        use crate::adapters::durable::InMemoryKvStore;

        let kv: Arc<dyn crate::adapters::durable::KvStore> = Arc::new(InMemoryKvStore::default());
        let durable = Arc::new(DurableAdapter::new(kv, "todos"));
        durable.save_all(&[todo("1", "a")]).unwrap();

        let store: CollectionStore<Todo> =
            CollectionStore::new(AdapterSet::default()).with_durable(durable.clone());
        assert_eq!(store.peek("1").unwrap().title, "a");

        store.state.write().insert(todo("2", "b"));
        store.persist();
        let reloaded: Vec<Todo> = durable.load_all().unwrap();
        assert_eq!(reloaded.len(), 2);
    }

    #[test]
    fn apply_push_upsert_updates_in_place() {
        let store: CollectionStore<Todo> = CollectionStore::new(AdapterSet::default());
        store.state.write().insert(todo("1", "a"));
        store.apply_push(&PushMode::Upsert, todo("1", "b"));
        assert_eq!(store.peek("1").unwrap().title, "b");
    }

    #[test]
    fn apply_push_append_respects_max_items() {
        let store: CollectionStore<Todo> = CollectionStore::new(AdapterSet::default());
        let mode = PushMode::Append {
            dedupe_key: None,
            max_items: Some(2),
        };
        store.apply_push(&mode, todo("1", "a"));
        store.apply_push(&mode, todo("2", "b"));
        store.apply_push(&mode, todo("3", "c"));
        let ids: Vec<String> = store.snapshot().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["2".to_string(), "3".to_string()]);
    }
}
