//! Browser `fetch`-based backend, for WASM targets.

use serde::de::DeserializeOwned;
use serde::Serialize;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;

use crate::error::Error;
use crate::request::{Method, RequestBuilderExt};
use crate::response::RawResponse;
use crate::Result;

/// HTTP client wrapper around the browser's `fetch`.
#[derive(Clone, Debug, Default)]
pub struct HttpClient;

impl HttpClient {
    /// Create a new client. `fetch` has no connection pool to configure.
    pub fn new() -> Self {
        Self
    }

    /// Start a no-op builder (kept for API parity with the native backend).
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder
    }

    /// Build a request for `method url`.
    pub fn request(&self, method: Method, url: &str) -> WasmRequestBuilder {
        WasmRequestBuilder::new(method, url)
    }
}

/// `fetch`-based [`RequestBuilderExt`] implementation.
#[derive(Debug)]
pub struct WasmRequestBuilder {
    method: Method,
    url: String,
    headers: Vec<(String, String)>,
    body: Option<Vec<u8>>,
}

impl WasmRequestBuilder {
    pub(crate) fn new(method: Method, url: &str) -> Self {
        Self {
            method,
            url: url.to_string(),
            headers: Vec::new(),
            body: None,
        }
    }

    async fn execute(self) -> Result<RawResponse> {
        let opts = web_sys::RequestInit::new();
        opts.set_method(self.method.as_str());

        if let Some(body) = &self.body {
            let array = js_sys::Uint8Array::from(body.as_slice());
            opts.set_body(&array.into());
        }

        let request = web_sys::Request::new_with_str_and_init(&self.url, &opts)
            .map_err(|e| Error::Build(format!("{e:?}")))?;

        let headers = request.headers();
        for (key, value) in &self.headers {
            headers
                .set(key, value)
                .map_err(|e| Error::Build(format!("{e:?}")))?;
        }

        let window = web_sys::window().ok_or_else(|| Error::Other("no window".into()))?;
        let resp_value = JsFuture::from(window.fetch_with_request(&request))
            .await
            .map_err(|e| Error::Connection(format!("{e:?}")))?;
        let resp: web_sys::Response = resp_value
            .dyn_into()
            .map_err(|_| Error::Other("fetch did not return a Response".into()))?;

        let status = resp.status();
        let body_promise = resp
            .array_buffer()
            .map_err(|e| Error::Other(format!("{e:?}")))?;
        let body_value = JsFuture::from(body_promise)
            .await
            .map_err(|e| Error::Other(format!("{e:?}")))?;
        let body = js_sys::Uint8Array::new(&body_value).to_vec();

        Ok(RawResponse::new(status, body))
    }
}

impl RequestBuilderExt for WasmRequestBuilder {
    fn header(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.headers
            .push((key.as_ref().to_string(), value.as_ref().to_string()));
        self
    }

    fn json<T: Serialize>(mut self, body: &T) -> Self {
        if let Ok(bytes) = serde_json::to_vec(body) {
            self.body = Some(bytes);
            self.headers
                .push(("Content-Type".to_string(), "application/json".to_string()));
        }
        self
    }

    async fn send(self) -> Result<RawResponse> {
        self.execute().await
    }

    async fn send_json<R: DeserializeOwned>(self) -> Result<R> {
        let raw = self.execute().await?;
        if raw.is_no_content() {
            return serde_json::from_value(serde_json::Value::Null).map_err(Error::from);
        }
        if !raw.is_success() {
            return Err(Error::Status {
                status: raw.status(),
                message: raw.text(),
            });
        }
        raw.json()
    }
}

/// No-op builder kept for API parity with the native backend — the browser
/// controls proxy/TLS settings, not this crate.
#[derive(Debug, Default)]
pub struct HttpClientBuilder;

impl HttpClientBuilder {
    /// `fetch` has no build step; always succeeds.
    pub fn build(self) -> Result<HttpClient> {
        Ok(HttpClient)
    }
}
