//! The trait collection stores and single stores are generic over.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A value a [`crate::store::single::SingleStore`] or
/// [`crate::store::collection::CollectionStore`] can hold.
///
/// `id` normalizes whatever identifier shape the adapter returns (a JSON
/// string or number) to a `String` once, at the boundary, so the rest of
/// the store only ever compares strings.
pub trait Record: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// The record's stable identifier.
    fn id(&self) -> String;
}

/// Normalizes a `serde_json::Value` id field to a `String`, handling the
/// common case of a server returning a bare JSON number.
pub fn normalize_id(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Record;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Todo {
        pub id: String,
        pub title: String,
        pub done: bool,
    }

    impl Record for Todo {
        fn id(&self) -> String {
            self.id.clone()
        }
    }
}
