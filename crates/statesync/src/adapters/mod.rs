//! Adapter trait family: remote, queued remote, push, durable (C5).
//!
//! A store's backing is a plain struct of optional boxed async closures
//! — the Rust rendering of "a record of optional operations composed by
//! spreading".

pub mod durable;
pub mod push;
pub mod queued;
pub mod remote;

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::Error;
use crate::record::Record;

/// Query parameters for a `get`/`get_one`/`delete` call: simple key-value
/// pairs serialized into the URL's query string by the remote adapter.
pub type QueryParams = HashMap<String, Value>;

type GetFn<R> = Arc<dyn Fn(QueryParams) -> BoxFuture<'static, Result<Vec<R>, Error>> + Send + Sync>;
type GetOneFn<R> = Arc<dyn Fn(QueryParams) -> BoxFuture<'static, Result<R, Error>> + Send + Sync>;
type CreateFn<R> = Arc<dyn Fn(R) -> BoxFuture<'static, Result<R, Error>> + Send + Sync>;
type SetFn<R> = Arc<dyn Fn(R) -> BoxFuture<'static, Result<R, Error>> + Send + Sync>;
type PatchFn<R> =
    Arc<dyn Fn(String, Value) -> BoxFuture<'static, Result<R, Error>> + Send + Sync>;
type DeleteFn = Arc<dyn Fn(QueryParams) -> BoxFuture<'static, Result<(), Error>> + Send + Sync>;

/// The set of operations a store delegates to for a given record type.
/// Any field left `None` makes the corresponding store method return
/// `Error::Config`.
pub struct AdapterSet<R: Record> {
    /// List/query operation, backing `CollectionStore::get`.
    pub get: Option<GetFn<R>>,
    /// Single-record fetch, backing `SingleStore::get` and
    /// `CollectionStore::get_one`.
    pub get_one: Option<GetOneFn<R>>,
    /// Create a new record, backing `CollectionStore::create`.
    pub create: Option<CreateFn<R>>,
    /// Replace a whole record, backing `SingleStore::set`.
    pub set: Option<SetFn<R>>,
    /// Partially update a record by id, backing `patch` on both stores.
    pub patch: Option<PatchFn<R>>,
    /// Delete a record, backing `delete` on both stores.
    pub delete: Option<DeleteFn>,
}

impl<R: Record> Default for AdapterSet<R> {
    fn default() -> Self {
        Self {
            get: None,
            get_one: None,
            create: None,
            set: None,
            patch: None,
            delete: None,
        }
    }
}

impl<R: Record> Clone for AdapterSet<R> {
    fn clone(&self) -> Self {
        Self {
            get: self.get.clone(),
            get_one: self.get_one.clone(),
            create: self.create.clone(),
            set: self.set.clone(),
            patch: self.patch.clone(),
            delete: self.delete.clone(),
        }
    }
}

impl<R: Record> std::fmt::Debug for AdapterSet<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterSet")
            .field("get", &self.get.is_some())
            .field("get_one", &self.get_one.is_some())
            .field("create", &self.create.is_some())
            .field("set", &self.set.is_some())
            .field("patch", &self.patch.is_some())
            .field("delete", &self.delete.is_some())
            .finish()
    }
}

impl<R: Record> AdapterSet<R> {
    /// Merge `other` on top of `self`: every field `other` sets overwrites
    /// the corresponding field in `self`, exactly "later spreads win"
    /// object-spread semantics, applied one field at a time so partial
    /// adapters can be layered (e.g. durable-only falling back to remote).
    pub fn merge(self, other: Self) -> Self {
        Self {
            get: other.get.or(self.get),
            get_one: other.get_one.or(self.get_one),
            create: other.create.or(self.create),
            set: other.set.or(self.set),
            patch: other.patch.or(self.patch),
            delete: other.delete.or(self.delete),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::test_support::Todo;

    fn ready_ok(todo: Todo) -> GetOneFn<Todo> {
        Arc::new(move |_params| {
            let todo = todo.clone();
            Box::pin(async move { Ok(todo) })
        })
    }

    #[test]
    fn merge_keeps_base_fields_other_leaves_unset() {
        let base = AdapterSet {
            get_one: Some(ready_ok(Todo {
                id: "1".into(),
                title: "a".into(),
                done: false,
            })),
            ..AdapterSet::default()
        };
        let overlay = AdapterSet::<Todo>::default();
        let merged = base.merge(overlay);
        assert!(merged.get_one.is_some());
        assert!(merged.patch.is_none());
    }

    #[test]
    fn merge_overlay_wins_on_conflict() {
        let base = AdapterSet {
            get_one: Some(ready_ok(Todo {
                id: "1".into(),
                title: "base".into(),
                done: false,
            })),
            ..AdapterSet::default()
        };
        let overlay = AdapterSet {
            get_one: Some(ready_ok(Todo {
                id: "1".into(),
                title: "overlay".into(),
                done: false,
            })),
            ..AdapterSet::default()
        };
        let merged = base.merge(overlay);
        assert!(merged.get_one.is_some());
    }
}
