//! Operation codes, body encodings and packet types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Frame operation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Operation {
    /// Client keepalive.
    Heartbeat = 2,
    /// Server keepalive acknowledgement carrying the viewer count.
    HeartbeatReply = 3,
    /// Client-to-server message (unused by the session).
    SendMessage = 4,
    /// Server push carrying one or more JSON commands.
    MessageReply = 5,
    /// Client authentication.
    Auth = 7,
    /// Server authentication acknowledgement.
    AuthReply = 8,
}

impl Operation {
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Returns whether frames with this operation originate from the client.
    pub fn is_client_originated(self) -> bool {
        matches!(
            self,
            Operation::Heartbeat | Operation::SendMessage | Operation::Auth
        )
    }
}

impl TryFrom<u32> for Operation {
    type Error = u32;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        match code {
            2 => Ok(Operation::Heartbeat),
            3 => Ok(Operation::HeartbeatReply),
            4 => Ok(Operation::SendMessage),
            5 => Ok(Operation::MessageReply),
            7 => Ok(Operation::Auth),
            8 => Ok(Operation::AuthReply),
            other => Err(other),
        }
    }
}

/// Body encoding selected by the header's protocol version field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum BodyEncoding {
    /// Plain JSON text.
    Json = 0,
    /// Uncompressed body; used for every client frame and heartbeat replies.
    Plain = 1,
    /// zlib-wrapped DEFLATE over a sequence of sub-frames.
    Deflate = 2,
    /// Brotli over a sequence of sub-frames.
    Brotli = 3,
}

impl BodyEncoding {
    pub fn version(self) -> u16 {
        self as u16
    }
}

impl TryFrom<u16> for BodyEncoding {
    type Error = u16;

    fn try_from(version: u16) -> Result<Self, Self::Error> {
        match version {
            0 => Ok(BodyEncoding::Json),
            1 => Ok(BodyEncoding::Plain),
            2 => Ok(BodyEncoding::Deflate),
            3 => Ok(BodyEncoding::Brotli),
            other => Err(other),
        }
    }
}

/// Body of the `Auth` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthParams {
    pub uid: u64,
    pub roomid: u64,
    /// Body encoding the client asks the server to push with.
    pub protover: u16,
    pub platform: String,
    #[serde(rename = "type")]
    pub auth_type: u32,
    pub key: String,
}

impl AuthParams {
    pub fn new(uid: u64, roomid: u64, key: impl Into<String>) -> Self {
        Self {
            uid,
            roomid,
            protover: BodyEncoding::Brotli.version(),
            platform: "web".to_string(),
            auth_type: 2,
            key: key.into(),
        }
    }
}

/// The in-memory result of decoding one received frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPacket {
    /// Raw operation code as found on the wire.
    pub operation: u32,
    pub protocol_version: u16,
    pub sequence: u32,
    /// Parsed JSON payloads in wire order.
    pub messages: Vec<Value>,
}

impl DecodedPacket {
    /// Returns the typed operation, if the code is known.
    pub fn op(&self) -> Option<Operation> {
        Operation::try_from(self.operation).ok()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Returns the viewer count of a heartbeat reply.
    pub fn heartbeat_count(&self) -> Option<u64> {
        if self.op() != Some(Operation::HeartbeatReply) {
            return None;
        }
        self.messages.first()?.get("count")?.as_u64()
    }
}
