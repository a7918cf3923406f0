//! HTTP response types

use serde::de::DeserializeOwned;

use crate::error::Error;
use crate::Result;

/// Raw HTTP response: status code plus a body buffer.
///
/// Kept backend-agnostic (a `u16` and a `Vec<u8>`) so both the reqwest and
/// WASM-fetch backends can produce the same type.
#[derive(Debug)]
pub struct RawResponse {
    status: u16,
    body: Vec<u8>,
}

impl RawResponse {
    /// Construct from a status code and a body buffer.
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        Self { status, body }
    }

    /// HTTP status code.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// `true` for 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// `true` for 204 specifically — the §6 "data = undefined" case.
    pub fn is_no_content(&self) -> bool {
        self.status == 204
    }

    /// Body as UTF-8 text, lossily.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body as raw bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.body
    }

    /// Parse the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_range() {
        assert!(RawResponse::new(200, vec![]).is_success());
        assert!(RawResponse::new(204, vec![]).is_no_content());
        assert!(!RawResponse::new(404, vec![]).is_success());
    }
}
