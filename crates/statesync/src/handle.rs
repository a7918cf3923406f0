//! Lazily-materialized, path-tracking observation handle (C2).
//!
//! Rust has no dynamic property-access proxy. A [`Handle`] is the
//! idiomatic stand-in: it remembers a [`Path`] into a store and
//! re-resolves from that store's current snapshot on every read, so it
//! never holds a reference into stale data and is cheap to pass around.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::binding::Subscribable;
use crate::bus::Unsubscribe;
use crate::path::{Path, Segment};

/// Anything a [`Handle`] can be built against: a current JSON snapshot of
/// the whole tree, plus the subscription bus backing it.
pub trait Snapshotted: Send + Sync {
    /// The store's entire state as JSON, rebuilt fresh (or cloned cheaply)
    /// on every call — never cached inside the handle.
    fn snapshot_value(&self) -> Value;

    /// Subscribe a listener at `path` on the store's bus.
    fn subscribe_path(&self, path: Path, listener: crate::bus::Listener) -> Unsubscribe;
}

/// A lazy, path-tracking reference into a store `S`.
#[derive(Clone)]
pub struct Handle<S: Snapshotted> {
    store: Arc<S>,
    path: Path,
}

impl<S: Snapshotted> std::fmt::Debug for Handle<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle").field("path", &self.path).finish()
    }
}

impl<S: Snapshotted> Handle<S> {
    /// A handle at the store's root.
    pub fn root(store: Arc<S>) -> Self {
        Self {
            store,
            path: Path::root(),
        }
    }

    /// The path this handle tracks.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A new handle one segment deeper. No data is read at this point.
    pub fn field(&self, segment: impl Into<Segment>) -> Self {
        Self {
            store: self.store.clone(),
            path: self.path.child(segment),
        }
    }

    /// Re-resolve this handle's path against the store's current snapshot
    /// and return the raw JSON value found there, if any.
    pub fn get(&self) -> Option<Value> {
        let root = self.store.snapshot_value();
        resolve(&root, self.path.segments())
    }

    /// Like [`Handle::get`], but deserialized into `T`. Returns `None`
    /// both when the path is absent and when the value fails to
    /// deserialize as `T`.
    pub fn read<T: DeserializeOwned>(&self) -> Option<T> {
        self.get().and_then(|v| serde_json::from_value(v).ok())
    }

    /// Subscribe `listener` to changes at this handle's path. Subscribing
    /// on a currently-absent path still fires once that location is
    /// written, because the bus indexes by path, not by present data.
    pub fn subscribe(&self, listener: impl Fn(&Path) + Send + Sync + 'static) -> Unsubscribe {
        self.store.subscribe_path(self.path.clone(), Arc::new(listener))
    }

    /// Iterate over this handle's direct children as `(key, Handle)`
    /// pairs, in the order they appear in the underlying JSON object or
    /// array. Returns an empty vector if the path resolves to a scalar or
    /// is absent.
    pub fn children(&self) -> Vec<(String, Handle<S>)> {
        match self.get() {
            Some(Value::Object(map)) => map
                .into_iter()
                .map(|(k, _)| (k.clone(), self.field(k)))
                .collect(),
            Some(Value::Array(items)) => (0..items.len())
                .map(|i| (i.to_string(), self.field(i as i64)))
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl<S: Snapshotted> Subscribable for Handle<S> {
    type Snapshot = Option<Value>;

    fn get_snapshot(&self) -> Self::Snapshot {
        self.get()
    }

    fn subscribe(&self, on_change: Arc<dyn Fn() + Send + Sync>) -> Unsubscribe {
        Handle::subscribe(self, move |_path| on_change())
    }
}

fn resolve(root: &Value, segments: &[Segment]) -> Option<Value> {
    let mut current = root;
    for segment in segments {
        current = match (segment, current) {
            (Segment::Key(key), Value::Object(map)) => map.get(key)?,
            (Segment::Index(idx), Value::Array(items)) => {
                let idx = usize::try_from(*idx).ok()?;
                items.get(idx)?
            }
            _ => return None,
        };
    }
    Some(current.clone())
}
