//! The engine's error taxonomy.

use std::sync::Arc;

use serde_json::Value;

/// Errors produced by stores and adapters.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An adapter operation was invoked but never configured on the
    /// `AdapterSet`.
    #[error("adapter operation `{op}` is not configured")]
    Config {
        /// Name of the missing operation, e.g. `"get"` or `"patch"`.
        op: &'static str,
    },

    /// A URL template referenced a parameter that was not supplied.
    #[error("missing URL template parameter `{name}`")]
    UrlTemplate {
        /// The unresolved `:name` placeholder.
        name: String,
    },

    /// The underlying HTTP/WebSocket transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] statesync_transport::Error),

    /// A record lookup by id found nothing.
    #[error("record `{id}` not found")]
    NotFound {
        /// The id that was looked up.
        id: String,
    },

    /// A push event or response body failed to parse.
    #[error("failed to parse push event: {0}")]
    Parse(#[from] serde_json::Error),

    /// The durable adapter's underlying store rejected a write.
    #[error("durable write failed: {0}")]
    Quota(String),
}

/// Context passed to error hooks so a caller can decide whether and how to
/// surface a failed mutation.
#[derive(Debug, Clone)]
pub struct ErrorMeta {
    /// The store operation that failed, e.g. `"patch"`.
    pub operation: &'static str,
    /// The adapter endpoint involved, if any (a rendered URL or template name).
    pub endpoint: Option<String>,
    /// The parameters the operation was called with.
    pub params: Value,
    /// The pre-mutation data restored on rollback, if the operation was optimistic.
    pub rollback_data: Option<Value>,
}

/// Invoked with [`ErrorMeta`] whenever a store operation fails, before and
/// in addition to the `Result::Err` returned to the caller.
pub trait ErrorHook: Send + Sync {
    /// Handle a failed operation.
    fn on_error(&self, error: &Arc<Error>, meta: &ErrorMeta);
}

impl<F> ErrorHook for F
where
    F: Fn(&Arc<Error>, &ErrorMeta) + Send + Sync,
{
    fn on_error(&self, error: &Arc<Error>, meta: &ErrorMeta) {
        (self)(error, meta)
    }
}
