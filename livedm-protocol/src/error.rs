//! Protocol error types.

use thiserror::Error;

/// Errors raised while framing or decoding packets.
///
/// Two families live here. Integrity faults (the declared lengths disagree
/// with the bytes actually received) are returned from
/// [`decode`](crate::codec::decode) and must be handled by the transport.
/// Everything else describes a frame that was well delimited but could not
/// be interpreted; `decode` logs those and degrades to an empty packet.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("buffer too short for frame header: {len} bytes (need {needed})")]
    HeaderTooShort { len: usize, needed: usize },

    #[error("truncated frame: declared {declared} bytes, got {actual}")]
    Truncated { declared: usize, actual: usize },

    #[error("invalid header length {header_len} for frame of {total_len} bytes")]
    InvalidHeaderLength { header_len: usize, total_len: usize },

    #[error("invalid sub-frame at offset {offset}: declared {declared} bytes, {remaining} remaining")]
    InvalidSubFrame {
        offset: usize,
        declared: usize,
        remaining: usize,
    },

    #[error("unknown operation: {0}")]
    UnknownOperation(u32),

    #[error("unknown body version: {0}")]
    UnknownBodyVersion(u16),

    #[error("heartbeat reply body too short: {0} bytes")]
    ShortHeartbeatBody(usize),

    #[error("compression error: {0}")]
    Compression(#[source] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid UTF-8 in payload")]
    InvalidUtf8,
}

impl ProtocolError {
    /// Returns whether this error means the received bytes are inconsistent
    /// with their own declared lengths.
    pub fn is_integrity_fault(&self) -> bool {
        matches!(
            self,
            ProtocolError::HeaderTooShort { .. }
                | ProtocolError::Truncated { .. }
                | ProtocolError::InvalidHeaderLength { .. }
                | ProtocolError::InvalidSubFrame { .. }
        )
    }
}
