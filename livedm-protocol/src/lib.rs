//! # livedm-protocol
//!
//! Wire protocol of the live-room push service.
//!
//! This crate provides:
//! - 16-byte big-endian frame headers and the outbound frame encoder
//! - Packet decoding, including DEFLATE and Brotli bodies that pack
//!   several sub-frames
//! - Operation codes, body encodings and the auth handshake body
//!
//! Everything here is synchronous and performs no I/O.

pub mod codec;
pub mod error;
pub mod frame;
pub mod message;

pub use codec::{auth_reply_code, decode, Encoder};
pub use error::ProtocolError;
pub use frame::{encode, FrameHeader, HEADER_LENGTH};
pub use message::{AuthParams, BodyEncoding, DecodedPacket, Operation};

/// Period between client heartbeats in this protocol generation (seconds).
pub const HEARTBEAT_INTERVAL_SECS: u64 = 10;
