//! Durable (local persistence) adapter: a synchronous `KvStore` trait plus
//! the `persist.load()/save()` pair, grounded on the shape of
//! `cdk_common::database::kvstore::KVStoreDatabase` but made synchronous
//! per this engine's contract and stripped of the namespace-validation
//! machinery specific to the teacher's on-disk key layout.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::Error;

/// A synchronous local key-value store. Callers bring their own medium
/// (sled, redb, a file, an in-memory map); only this trait boundary is
/// specified.
pub trait KvStore: Send + Sync {
    /// Read a raw value, if present.
    fn get(&self, key: &str) -> Result<Option<Value>, Error>;

    /// Write a raw value.
    fn set(&self, key: &str, value: Value) -> Result<(), Error>;

    /// Remove a key.
    fn remove(&self, key: &str) -> Result<(), Error>;
}

/// An in-memory `KvStore` reference implementation, used in tests and
/// demos; not shipped as production storage.
#[derive(Default)]
pub struct InMemoryKvStore {
    inner: parking_lot::Mutex<std::collections::HashMap<String, Value>>,
}

impl KvStore for InMemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<Value>, Error> {
        Ok(self.inner.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), Error> {
        self.inner.lock().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), Error> {
        self.inner.lock().remove(key);
        Ok(())
    }
}

/// Wraps a [`KvStore`] at a fixed key, providing CRUD-on-array semantics
/// for a collection plus a `persist` sub-object for a single value.
pub struct DurableAdapter {
    store: Arc<dyn KvStore>,
    key: String,
}

impl std::fmt::Debug for DurableAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableAdapter").field("key", &self.key).finish()
    }
}

impl DurableAdapter {
    /// Persist records under `key`.
    pub fn new(store: Arc<dyn KvStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    fn read_array(&self) -> Result<Vec<Value>, Error> {
        match self.store.get(&self.key)? {
            Some(Value::Array(items)) => Ok(items),
            _ => Ok(Vec::new()),
        }
    }

    fn write_array(&self, items: Vec<Value>) -> Result<(), Error> {
        self.store.set(&self.key, Value::Array(items))
    }

    /// Load every stored record as `R`.
    pub fn load_all<R: DeserializeOwned>(&self) -> Result<Vec<R>, Error> {
        let items = self.read_array()?;
        items
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(Error::from))
            .collect()
    }

    /// Overwrite the full stored collection.
    pub fn save_all<R: Serialize>(&self, records: &[R]) -> Result<(), Error> {
        let items = records
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        self.write_array(items)
    }

    /// `persist.load()` — a single serialized value at `key`.
    pub fn load<R: DeserializeOwned>(&self) -> Result<Option<R>, Error> {
        match self.store.get(&self.key)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// `persist.save()` — overwrite the single value at `key`.
    pub fn save<R: Serialize>(&self, value: &R) -> Result<(), Error> {
        self.store.set(&self.key, serde_json::to_value(value)?)
    }

    /// Remove everything stored at `key`.
    pub fn clear(&self) -> Result<(), Error> {
        self.store.remove(&self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::test_support::Todo;

    #[test]
    fn save_then_load_all_round_trips() {
        let store: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::default());
        let adapter = DurableAdapter::new(store, "todos");

        let todos = vec![
            Todo {
                id: "1".into(),
                title: "a".into(),
                done: false,
            },
            Todo {
                id: "2".into(),
                title: "b".into(),
                done: true,
            },
        ];
        adapter.save_all(&todos).unwrap();

        let loaded: Vec<Todo> = adapter.load_all().unwrap();
        assert_eq!(loaded, todos);
    }

    #[test]
    fn missing_key_loads_as_empty() {
        let store: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::default());
        let adapter = DurableAdapter::new(store, "todos");
        let loaded: Vec<Todo> = adapter.load_all().unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn persist_single_value_round_trips() {
        let store: Arc<dyn KvStore> = Arc::new(InMemoryKvStore::default());
        let adapter = DurableAdapter::new(store, "profile");

        let todo = Todo {
            id: "1".into(),
            title: "solo".into(),
            done: false,
        };
        adapter.save(&todo).unwrap();
        assert_eq!(adapter.load::<Todo>().unwrap(), Some(todo));

        adapter.clear().unwrap();
        assert_eq!(adapter.load::<Todo>().unwrap(), None);
    }
}
