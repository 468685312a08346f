//! Session error types.

use thiserror::Error;

/// Errors raised while running a session's connection.
///
/// None of these escape the session driver: they end the current
/// connection and feed the reconnect policy.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] livedm_protocol::ProtocolError),

    #[error("connect timeout")]
    Timeout,

    #[error("connection closed")]
    ConnectionClosed,
}

impl SessionError {
    /// Returns whether reconnecting may fix this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            SessionError::WebSocket(_) => true,
            SessionError::Timeout => true,
            SessionError::ConnectionClosed => true,
            SessionError::Protocol(e) => e.is_integrity_fault(),
        }
    }
}
