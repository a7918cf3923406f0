//! Request-builder backends

#[cfg(feature = "reqwest-backend")]
pub mod reqwest_backend;

#[cfg(feature = "wasm-backend")]
pub mod wasm_backend;

#[cfg(all(feature = "reqwest-backend", not(target_arch = "wasm32")))]
pub use reqwest_backend::{HttpClient, HttpClientBuilder, ReqwestRequestBuilder};
#[cfg(all(feature = "wasm-backend", target_arch = "wasm32"))]
pub use wasm_backend::{HttpClient, HttpClientBuilder, WasmRequestBuilder};
