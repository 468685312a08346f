//! Binary frame header and encoder.
//!
//! Frame layout (16 bytes header + body), all integers big-endian:
//!
//! ```text
//! +--------------+------------+----------+-----------+----------+
//! | total_length | header_len | protover | operation | sequence |
//! |   4 bytes    |  2 bytes   | 2 bytes  |  4 bytes  | 4 bytes  |
//! +--------------+------------+----------+-----------+----------+
//! | body                                                        |
//! | total_length - header_len bytes                             |
//! +-------------------------------------------------------------+
//! ```

use crate::error::ProtocolError;
use crate::message::{BodyEncoding, Operation};
use bytes::{BufMut, BytesMut};

/// Size of the frame header in bytes (4+2+2+4+4 = 16).
pub const HEADER_LENGTH: usize = 16;

/// Sequence number written on every outbound frame.
pub const SEND_SEQUENCE: u32 = 1;

/// Reads a big-endian unsigned integer of `bytes.len()` bytes (at most 8).
pub fn read_be(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(0u64, |acc, &byte| acc * 256 + u64::from(byte))
}

/// Writes the low `len` bytes of `value`, most significant byte first.
pub fn put_be(buf: &mut impl BufMut, value: u64, len: usize) {
    for i in (0..len).rev() {
        buf.put_u8((value / 256u64.pow(i as u32) % 256) as u8);
    }
}

/// A parsed frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub total_length: u32,
    pub header_length: u16,
    pub protocol_version: u16,
    pub operation: u32,
    pub sequence: u32,
}

impl FrameHeader {
    /// Builds the header for an outbound frame with a body of `body_len` bytes.
    pub fn outbound(operation: Operation, body_len: usize) -> Self {
        Self {
            total_length: (HEADER_LENGTH + body_len) as u32,
            header_length: HEADER_LENGTH as u16,
            protocol_version: BodyEncoding::Plain.version(),
            operation: operation.code(),
            sequence: SEND_SEQUENCE,
        }
    }

    /// Reads the fixed header fields from the start of `buf`.
    ///
    /// Only the buffer length is checked here; the declared lengths are
    /// validated by [`FrameHeader::body_range`].
    pub fn parse(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < HEADER_LENGTH {
            return Err(ProtocolError::HeaderTooShort {
                len: buf.len(),
                needed: HEADER_LENGTH,
            });
        }

        Ok(Self {
            total_length: read_be(&buf[0..4]) as u32,
            header_length: read_be(&buf[4..6]) as u16,
            protocol_version: read_be(&buf[6..8]) as u16,
            operation: read_be(&buf[8..12]) as u32,
            sequence: read_be(&buf[12..16]) as u32,
        })
    }

    /// Returns the body's byte range within a buffer of `available` bytes.
    pub fn body_range(&self, available: usize) -> Result<std::ops::Range<usize>, ProtocolError> {
        let total_len = self.total_length as usize;
        let header_len = self.header_length as usize;

        if total_len > available {
            return Err(ProtocolError::Truncated {
                declared: total_len,
                actual: available,
            });
        }
        if header_len < HEADER_LENGTH || header_len > total_len {
            return Err(ProtocolError::InvalidHeaderLength {
                header_len,
                total_len,
            });
        }

        Ok(header_len..total_len)
    }

    /// Writes the header into `buf`.
    pub fn write(&self, buf: &mut impl BufMut) {
        put_be(buf, u64::from(self.total_length), 4);
        put_be(buf, u64::from(self.header_length), 2);
        put_be(buf, u64::from(self.protocol_version), 2);
        put_be(buf, u64::from(self.operation), 4);
        put_be(buf, u64::from(self.sequence), 4);
    }
}

/// Encodes one outbound frame.
pub fn encode(operation: Operation, body: &str) -> BytesMut {
    let header = FrameHeader::outbound(operation, body.len());
    let mut buf = BytesMut::with_capacity(header.total_length as usize);
    header.write(&mut buf);
    buf.put_slice(body.as_bytes());
    buf
}
