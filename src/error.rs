//! Error types for the `quantflow` crate.
//!
//! All fallible operations in this crate return [`Result<T>`], which is an
//! alias for `std::result::Result<T, QuantError>`.
//!
//! [`QuantError`] covers:
//! - **HTTP status errors** — Unexpected status codes with response body
//! - **HTTP transport errors** — Network, TLS, timeout failures
//! - **WebSocket errors** — Connection and protocol errors
//! - **Broker errors** — AMQP connection / channel failures
//! - **JSON errors** — Serialization and deserialization failures
//! - **Exchange errors** — Error payloads returned by an exchange API
//! - **Invalid arguments** — Client-side validation errors

/// All possible errors produced by the `quantflow` runtime.
#[derive(Debug, thiserror::Error)]
pub enum QuantError {
    /// The server returned an unexpected HTTP status code (outside 200-206).
    #[error("HTTP {status}: {body}")]
    HttpStatus {
        /// The HTTP status code.
        status: reqwest::StatusCode,
        /// The response body text.
        body: String,
    },

    /// A network or transport-level error from `reqwest`.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// A WebSocket-level error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The WebSocket is not in the open state.
    #[error("WebSocket not connected")]
    WsNotConnected,

    /// An AMQP broker error.
    #[error("broker error: {0}")]
    Broker(#[from] lapin::Error),

    /// Failed to serialize or deserialize JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An error building or parsing a URL.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// An I/O error (config file, payload compression).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An error payload returned by an exchange API.
    #[error("exchange error: {0}")]
    Exchange(String),

    /// The caller provided an invalid argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl QuantError {
    /// Shorthand for an [`QuantError::Exchange`] from anything displayable.
    pub fn exchange(msg: impl std::fmt::Display) -> Self {
        Self::Exchange(msg.to_string())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, QuantError>;
