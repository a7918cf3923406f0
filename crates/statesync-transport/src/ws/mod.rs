//! Platform-agnostic WebSocket client used by the push adapter.
//!
//! On native targets this wraps `tokio-tungstenite`; on `wasm32` it would
//! wrap the browser's `WebSocket` (gated behind the `wasm-backend` feature,
//! mirroring the HTTP backend split).

#[cfg(not(target_arch = "wasm32"))]
mod native;
#[cfg(target_arch = "wasm32")]
mod wasm;

#[cfg(not(target_arch = "wasm32"))]
pub use native::{connect, WsReceiver, WsSender};
#[cfg(target_arch = "wasm32")]
pub use wasm::{connect, WsReceiver, WsSender};
