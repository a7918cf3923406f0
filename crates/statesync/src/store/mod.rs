//! The two store shapes (C6/C7): a single-record store and a keyed
//! collection store, both built on the same adapter/cache/bus primitives.

pub mod collection;
pub mod single;

pub use collection::CollectionStore;
pub use single::SingleStore;

use serde_json::Value;

use crate::error::Error;

/// `Error` wraps non-`Clone` transport/parse errors, so a second owned
/// copy for a status/hook side-channel has to downgrade those variants
/// to a string-carrying one instead of cloning them directly.
pub(crate) trait CloneError {
    fn clone_error(&self) -> Error;
}

impl CloneError for Error {
    fn clone_error(&self) -> Error {
        match self {
            Error::Config { op } => Error::Config { op },
            Error::UrlTemplate { name } => Error::UrlTemplate { name: name.clone() },
            Error::NotFound { id } => Error::NotFound { id: id.clone() },
            Error::Quota(msg) => Error::Quota(msg.clone()),
            other => Error::Quota(other.to_string()),
        }
    }
}

/// Recursive JSON merge-patch: object fields merge recursively, anything
/// else (including arrays) is replaced wholesale by the patch value.
pub(crate) fn merge_json(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (k, v) in patch_map {
                merge_json(base_map.entry(k.clone()).or_insert(Value::Null), v);
            }
        }
        (base, patch) => *base = patch.clone(),
    }
}
