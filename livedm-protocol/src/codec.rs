//! Packet decoder and frame encoders.

use crate::error::ProtocolError;
use crate::frame::{self, read_be, FrameHeader, HEADER_LENGTH};
use crate::message::{AuthParams, BodyEncoding, DecodedPacket, Operation};
use bytes::{BufMut, BytesMut};
use serde_json::{json, Value};
use std::io::{Read, Write};

/// Brotli window size used when compressing bodies.
const BROTLI_LG_WINDOW: u32 = 22;

/// Brotli quality used when compressing bodies.
const BROTLI_QUALITY: u32 = 5;

/// Internal buffer size for the Brotli reader and writer.
const BROTLI_BUFFER_SIZE: usize = 4096;

/// Decodes one received frame.
///
/// Frames that are well delimited but cannot be interpreted (unknown
/// operation, unknown body version, bad JSON, failed decompression) are
/// logged and yield a packet with no messages. An error is returned only
/// when the declared lengths are inconsistent with `buf`.
pub fn decode(buf: &[u8]) -> Result<DecodedPacket, ProtocolError> {
    let header = FrameHeader::parse(buf)?;
    let body_range = header.body_range(buf.len())?;

    if buf.len() > body_range.end {
        tracing::debug!(
            "Ignoring {} trailing bytes after frame",
            buf.len() - body_range.end
        );
    }

    let messages = match decode_body(&header, &buf[body_range]) {
        Ok(messages) => messages,
        Err(e) if e.is_integrity_fault() => return Err(e),
        Err(e) => {
            tracing::warn!(
                "Dropping frame (op={}, ver={}): {}",
                header.operation,
                header.protocol_version,
                e
            );
            Vec::new()
        }
    };

    Ok(DecodedPacket {
        operation: header.operation,
        protocol_version: header.protocol_version,
        sequence: header.sequence,
        messages,
    })
}

fn decode_body(header: &FrameHeader, body: &[u8]) -> Result<Vec<Value>, ProtocolError> {
    let op = Operation::try_from(header.operation).map_err(ProtocolError::UnknownOperation)?;

    match op {
        Operation::AuthReply => Ok(Vec::new()),
        Operation::HeartbeatReply => {
            if body.len() < 4 {
                return Err(ProtocolError::ShortHeartbeatBody(body.len()));
            }
            Ok(vec![json!({ "count": read_be(&body[..4]) })])
        }
        Operation::MessageReply => match BodyEncoding::try_from(header.protocol_version) {
            Ok(BodyEncoding::Json) => Ok(vec![parse_json(body)?]),
            Ok(BodyEncoding::Deflate) => split_sub_frames(&inflate(body)?),
            Ok(BodyEncoding::Brotli) => split_sub_frames(&brotli_decompress(body)?),
            Ok(BodyEncoding::Plain) | Err(_) => {
                Err(ProtocolError::UnknownBodyVersion(header.protocol_version))
            }
        },
        // Client frames carry a plain body; decoding them keeps the codec
        // symmetric for test servers and tooling.
        Operation::Heartbeat | Operation::SendMessage | Operation::Auth => {
            if body.is_empty() {
                Ok(Vec::new())
            } else {
                Ok(vec![parse_json(body)?])
            }
        }
    }
}

/// Walks a decompressed body made of concatenated sub-frames.
///
/// Each sub-frame starts with its own 16-byte header, of which only the
/// leading length is read. A sub-frame whose JSON is malformed is dropped
/// on its own; a length that overruns the buffer fails the whole walk.
fn split_sub_frames(buf: &[u8]) -> Result<Vec<Value>, ProtocolError> {
    let mut messages = Vec::new();
    let mut offset = 0;

    while offset < buf.len() {
        let remaining = buf.len() - offset;
        let declared = if remaining >= 4 {
            read_be(&buf[offset..offset + 4]) as usize
        } else {
            0
        };

        if declared < HEADER_LENGTH || declared > remaining {
            return Err(ProtocolError::InvalidSubFrame {
                offset,
                declared,
                remaining,
            });
        }

        match parse_json(&buf[offset + HEADER_LENGTH..offset + declared]) {
            Ok(value) => messages.push(value),
            Err(e) => tracing::warn!("Dropping sub-frame at offset {}: {}", offset, e),
        }

        offset += declared;
    }

    Ok(messages)
}

fn parse_json(body: &[u8]) -> Result<Value, ProtocolError> {
    let text = std::str::from_utf8(body).map_err(|_| ProtocolError::InvalidUtf8)?;
    Ok(serde_json::from_str(text)?)
}

fn inflate(body: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let mut out = Vec::with_capacity(body.len() * 4);
    flate2::read::ZlibDecoder::new(body)
        .read_to_end(&mut out)
        .map_err(ProtocolError::Compression)?;
    Ok(out)
}

fn brotli_decompress(body: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let mut out = Vec::with_capacity(body.len() * 4);
    brotli::Decompressor::new(body, BROTLI_BUFFER_SIZE)
        .read_to_end(&mut out)
        .map_err(ProtocolError::Compression)?;
    Ok(out)
}

/// Returns the `code` carried by an `AuthReply` frame's body, if any.
///
/// [`decode`] never surfaces this body as a message; the session only uses
/// it for logging.
pub fn auth_reply_code(buf: &[u8]) -> Option<i64> {
    let header = FrameHeader::parse(buf).ok()?;
    if header.operation != Operation::AuthReply.code() {
        return None;
    }
    let range = header.body_range(buf.len()).ok()?;
    parse_json(&buf[range]).ok()?.get("code")?.as_i64()
}

/// Builds outbound and server-side frames.
pub struct Encoder;

impl Encoder {
    /// Encodes a client frame with a plain text body.
    pub fn frame(op: Operation, body: &str) -> BytesMut {
        frame::encode(op, body)
    }

    /// Encodes the empty-bodied keepalive frame.
    pub fn heartbeat() -> BytesMut {
        frame::encode(Operation::Heartbeat, "")
    }

    /// Encodes the authentication frame.
    pub fn auth(params: &AuthParams) -> Result<BytesMut, ProtocolError> {
        let body = serde_json::to_string(params)?;
        Ok(frame::encode(Operation::Auth, &body))
    }

    /// Encodes a frame with an explicit protocol version and raw body.
    ///
    /// This is the server's side of the wire; the client never sends
    /// anything but version 1.
    pub fn raw(operation: u32, protocol_version: u16, sequence: u32, body: &[u8]) -> BytesMut {
        let header = FrameHeader {
            total_length: (HEADER_LENGTH + body.len()) as u32,
            header_length: HEADER_LENGTH as u16,
            protocol_version,
            operation,
            sequence,
        };
        let mut buf = BytesMut::with_capacity(header.total_length as usize);
        header.write(&mut buf);
        buf.put_slice(body);
        buf
    }

    /// Encodes an `AuthReply` with the given status code.
    pub fn auth_reply(code: i64) -> Result<BytesMut, ProtocolError> {
        let body = serde_json::to_vec(&json!({ "code": code }))?;
        Ok(Self::raw(
            Operation::AuthReply.code(),
            BodyEncoding::Plain.version(),
            1,
            &body,
        ))
    }

    /// Encodes a `HeartbeatReply` carrying a viewer count.
    pub fn heartbeat_reply(count: u32) -> BytesMut {
        Self::raw(
            Operation::HeartbeatReply.code(),
            BodyEncoding::Plain.version(),
            1,
            &count.to_be_bytes(),
        )
    }

    /// Encodes an uncompressed `MessageReply` holding one JSON command.
    pub fn message_reply(value: &Value) -> Result<BytesMut, ProtocolError> {
        let body = serde_json::to_vec(value)?;
        Ok(Self::raw(
            Operation::MessageReply.code(),
            BodyEncoding::Json.version(),
            0,
            &body,
        ))
    }

    /// Encodes a compressed `MessageReply` packing `values` as sub-frames.
    pub fn compressed_message_reply(
        encoding: BodyEncoding,
        values: &[Value],
    ) -> Result<BytesMut, ProtocolError> {
        let packed = Self::sub_frames(values)?;
        let body = match encoding {
            BodyEncoding::Deflate => {
                let mut encoder =
                    flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
                encoder
                    .write_all(&packed)
                    .map_err(ProtocolError::Compression)?;
                encoder.finish().map_err(ProtocolError::Compression)?
            }
            BodyEncoding::Brotli => {
                let mut writer = brotli::CompressorWriter::new(
                    Vec::new(),
                    BROTLI_BUFFER_SIZE,
                    BROTLI_QUALITY,
                    BROTLI_LG_WINDOW,
                );
                writer
                    .write_all(&packed)
                    .map_err(ProtocolError::Compression)?;
                writer.into_inner()
            }
            other => return Err(ProtocolError::UnknownBodyVersion(other.version())),
        };

        Ok(Self::raw(
            Operation::MessageReply.code(),
            encoding.version(),
            0,
            &body,
        ))
    }

    /// Concatenates `values` as uncompressed sub-frames.
    pub fn sub_frames(values: &[Value]) -> Result<Vec<u8>, ProtocolError> {
        let mut packed = BytesMut::new();
        for value in values {
            let body = serde_json::to_vec(value)?;
            packed.extend_from_slice(&Self::raw(
                Operation::MessageReply.code(),
                BodyEncoding::Json.version(),
                0,
                &body,
            ));
        }
        Ok(packed.to_vec())
    }
}
