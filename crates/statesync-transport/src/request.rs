//! HTTP method and request-builder abstraction

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::response::RawResponse;
use crate::Result;

/// HTTP methods the remote adapter needs, per the §6 HTTP mapping table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Reads (`get`, `getOne`).
    Get,
    /// Full-replace (`set`).
    Put,
    /// Partial update (`patch`).
    Patch,
    /// Creation (`create`).
    Post,
    /// Removal (`delete`).
    Delete,
}

impl Method {
    /// The ASCII method name, for backends that want a string.
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

/// Backend-agnostic request builder.
///
/// Implementations wrap a concrete HTTP library so the rest of the
/// workspace never depends on `reqwest` (or `web_sys::fetch`) directly.
pub trait RequestBuilderExt: Sized + Send {
    /// Add a header to the request.
    fn header(self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self;

    /// Set the request body as JSON.
    fn json<T: Serialize>(self, body: &T) -> Self;

    /// Send the request and return the raw response.
    async fn send(self) -> Result<RawResponse>;

    /// Send the request and deserialize the response body as JSON.
    async fn send_json<R: DeserializeOwned>(self) -> Result<R>;
}
