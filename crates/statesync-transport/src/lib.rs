//! Pluggable HTTP/WebSocket transport for the statesync remote and push
//! adapters.
//!
//! This crate exists so `statesync` never depends on a specific HTTP
//! library directly: swap the `reqwest-backend` feature for `wasm-backend`
//! and the adapters above keep working unchanged.
//!
//! ```no_run
//! use statesync_transport::{HttpClient, Method, RequestBuilderExt};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct Todo { id: String }
//!
//! async fn example() -> statesync_transport::Result<Vec<Todo>> {
//!     let client = HttpClient::new();
//!     client.request(Method::Get, "https://api.example.com/todos").send_json().await
//! }
//! ```

mod backends;
mod error;
mod request;
mod response;
pub mod ws;

pub use backends::{HttpClient, HttpClientBuilder};
#[cfg(all(feature = "reqwest-backend", not(target_arch = "wasm32")))]
pub use backends::ReqwestRequestBuilder;
#[cfg(all(feature = "wasm-backend", target_arch = "wasm32"))]
pub use backends::WasmRequestBuilder;
pub use error::Error;
pub use request::{Method, RequestBuilderExt};
pub use response::RawResponse;

/// Result type used throughout the transport crate.
pub type Result<T> = std::result::Result<T, Error>;
