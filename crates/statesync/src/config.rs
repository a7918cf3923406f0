//! Global engine configuration (§6).

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use url::Url;

use crate::error::{Error, ErrorHook};

/// Supplies request headers for every outgoing adapter call.
///
/// Always async at the trait boundary so a synchronous provider can just
/// return an already-ready future.
pub trait HeaderProvider: Send + Sync {
    /// Produce the headers to attach to the next request.
    fn headers(&self) -> BoxFuture<'static, HashMap<String, String>>;
}

/// A `HeaderProvider` that always returns the same fixed set of headers.
pub struct StaticHeaders(HashMap<String, String>);

impl StaticHeaders {
    /// Build a provider from a fixed header map.
    pub fn new(headers: HashMap<String, String>) -> Self {
        Self(headers)
    }
}

impl HeaderProvider for StaticHeaders {
    fn headers(&self) -> BoxFuture<'static, HashMap<String, String>> {
        let headers = self.0.clone();
        Box::pin(async move { headers })
    }
}

/// Engine-wide configuration, constructed once and handed to adapter
/// constructors as an `Arc`. Later `EngineConfig` values only affect
/// adapters built afterward — there is no mutable global to reconfigure
/// in place.
pub struct EngineConfig {
    /// Base URL every relative remote/push URL template is resolved against.
    pub base_url: Url,
    /// Provides headers attached to every outgoing remote/push request.
    pub get_headers: Arc<dyn HeaderProvider>,
    /// Invoked whenever a store operation fails, after any per-store hook.
    pub on_error: Arc<dyn ErrorHook>,
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl EngineConfig {
    /// Build a config with empty default headers and an error hook that
    /// only logs.
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            get_headers: Arc::new(StaticHeaders::new(HashMap::new())),
            on_error: Arc::new(|error: &Arc<Error>, meta: &crate::error::ErrorMeta| {
                statesync_log::log_error!(
                    "{} failed against {:?}: {error}",
                    meta.operation,
                    meta.endpoint
                );
            }),
        }
    }

    /// Override the header provider.
    pub fn with_headers(mut self, provider: Arc<dyn HeaderProvider>) -> Self {
        self.get_headers = provider;
        self
    }

    /// Override the error hook.
    pub fn with_error_hook(mut self, hook: Arc<dyn ErrorHook>) -> Self {
        self.on_error = hook;
        self
    }
}
