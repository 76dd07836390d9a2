//! Stream adapter errors.
//!
//! These never cross the adapter boundary: every variant is handled by
//! the adapter's own reconnect loop.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl StreamError {
    /// Rate-limit errors get linear backoff instead of client rotation.
    #[must_use]
    pub fn is_rate_limit(&self) -> bool {
        match self {
            Self::Rpc { code, message } => {
                *code == -32090 || message.to_lowercase().contains("rate limit")
            }
            Self::Http(e) => e
                .status()
                .is_some_and(|s| s == reqwest::StatusCode::TOO_MANY_REQUESTS),
            _ => false,
        }
    }
}

pub type StreamResult<T> = std::result::Result<T, StreamError>;
