//! reqwest-based backend (the default, non-WASM transport)

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Error;
use crate::request::{Method, RequestBuilderExt};
use crate::response::RawResponse;
use crate::Result;

/// HTTP client wrapper around `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Create a new client with default settings.
    pub fn new() -> Self {
        Self {
            inner: reqwest::Client::new(),
        }
    }

    /// Start a builder for custom proxy/TLS settings.
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    /// Build a request for `method url`.
    pub fn request(&self, method: Method, url: &str) -> ReqwestRequestBuilder {
        let inner = match method {
            Method::Get => self.inner.get(url),
            Method::Put => self.inner.put(url),
            Method::Patch => self.inner.patch(url),
            Method::Post => self.inner.post(url),
            Method::Delete => self.inner.delete(url),
        };
        ReqwestRequestBuilder { inner }
    }
}

/// Builder for a [`HttpClient`] with proxy/TLS overrides.
#[derive(Debug, Default)]
pub struct HttpClientBuilder {
    proxy: Option<url::Url>,
    accept_invalid_certs: bool,
    timeout: Option<Duration>,
}

impl HttpClientBuilder {
    /// Route all requests through `proxy`.
    pub fn proxy(mut self, proxy: url::Url) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Accept self-signed / invalid TLS certificates. Use only against trusted test hosts.
    pub fn danger_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// Per-request timeout applied by the underlying client.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<HttpClient> {
        let mut builder = reqwest::Client::builder();

        if let Some(proxy_url) = self.proxy {
            let proxy = reqwest::Proxy::all(proxy_url).map_err(|e| Error::Build(e.to_string()))?;
            builder = builder.proxy(proxy);
        }

        builder = builder.danger_accept_invalid_certs(self.accept_invalid_certs);

        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        let inner = builder.build().map_err(|e| Error::Build(e.to_string()))?;
        Ok(HttpClient { inner })
    }
}

/// reqwest-based [`RequestBuilderExt`] implementation.
#[derive(Debug)]
pub struct ReqwestRequestBuilder {
    inner: reqwest::RequestBuilder,
}

impl RequestBuilderExt for ReqwestRequestBuilder {
    fn header(self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        Self {
            inner: self.inner.header(key.as_ref(), value.as_ref()),
        }
    }

    fn json<T: Serialize>(self, body: &T) -> Self {
        Self {
            inner: self.inner.json(body),
        }
    }

    async fn send(self) -> Result<RawResponse> {
        let response = self.inner.send().await.map_err(Error::from)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(Error::from)?.to_vec();
        Ok(RawResponse::new(status, body))
    }

    async fn send_json<R: DeserializeOwned>(self) -> Result<R> {
        let raw = self.send().await?;
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_new_and_default() {
        let _ = HttpClient::new();
        let _ = HttpClient::default();
    }

    #[test]
    fn builder_build_ok() {
        assert!(HttpClientBuilder::default().build().is_ok());
    }

    #[test]
    fn builder_with_proxy_ok() {
        let proxy = url::Url::parse("http://localhost:8080").unwrap();
        assert!(HttpClientBuilder::default().proxy(proxy).build().is_ok());
    }
}
