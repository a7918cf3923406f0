//! Transport error types

use thiserror::Error;

/// Errors that can occur at the HTTP/WebSocket transport layer.
///
/// This is a lower-level error than `statesync::error::Error::Transport` —
/// the engine wraps it rather than matching on its variants, so adding a
/// variant here never breaks the core.
#[derive(Debug, Error)]
pub enum Error {
    /// Non-2xx HTTP response.
    #[error("HTTP error ({status}): {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Message drawn from the body per the response envelope rules.
        message: String,
    },
    /// Could not reach the host at all.
    #[error("connection error: {0}")]
    Connection(String),
    /// The transport's own timeout elapsed.
    #[error("request timeout")]
    Timeout,
    /// Body failed to (de)serialize.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Client construction failed (bad proxy, bad TLS config, ...).
    #[error("client build error: {0}")]
    Build(String),
    /// WebSocket-specific failure.
    #[error("websocket error: {0}")]
    WebSocket(String),
    /// Anything else the backend reported.
    #[error("{0}")]
    Other(String),
}

#[cfg(feature = "reqwest-backend")]
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout
        } else if err.is_builder() {
            Error::Build(err.to_string())
        } else if let Some(status) = err.status() {
            Error::Status {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            Error::Connection(err.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display() {
        let error = Error::Status {
            status: 404,
            message: "not found".into(),
        };
        assert_eq!(format!("{error}"), "HTTP error (404): not found");
    }

    #[test]
    fn from_serde_json_error() {
        let result: Result<String, _> = serde_json::from_str("not json");
        let err: Error = result.unwrap_err().into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
