//! Replies written by the companion server.
//!
//! Replies carry no opcode or length: the client knows from the command it
//! sent whether to expect nothing, one boolean byte, or a fixed number of raw
//! bytes.

use crate::error::ProtocolError;

/// Shape of the reply a command produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    /// Fire-and-forget, no reply bytes.
    None,
    /// A single byte, 0 or 1.
    Bool,
    /// Exactly this many raw bytes.
    Bytes(usize),
}

impl ReplyKind {
    /// Number of bytes on the wire for this reply.
    pub fn wire_len(&self) -> usize {
        match self {
            ReplyKind::None => 0,
            ReplyKind::Bool => 1,
            ReplyKind::Bytes(n) => *n,
        }
    }
}

/// A reply to a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Boolean result.
    Bool(bool),
    /// Raw data.
    Bytes(Vec<u8>),
}

impl Reply {
    /// Encode the reply for transmission.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Reply::Bool(value) => vec![encode_bool(*value)],
            Reply::Bytes(data) => data.clone(),
        }
    }

    /// The reply written when a handler fails, so the client still reads the
    /// number of bytes it expects.
    pub fn filler(kind: ReplyKind) -> Option<Reply> {
        match kind {
            ReplyKind::None => None,
            ReplyKind::Bool => Some(Reply::Bool(false)),
            ReplyKind::Bytes(n) => Some(Reply::Bytes(vec![0u8; n])),
        }
    }

    /// Decode a reply of the expected kind from received bytes.
    pub fn decode(kind: ReplyKind, data: &[u8]) -> Result<Option<Reply>, ProtocolError> {
        let expected = kind.wire_len();
        if data.len() < expected {
            return Err(ProtocolError::FrameTooShort {
                expected,
                actual: data.len(),
            });
        }
        Ok(match kind {
            ReplyKind::None => None,
            ReplyKind::Bool => Some(Reply::Bool(decode_bool(data[0]))),
            ReplyKind::Bytes(n) => Some(Reply::Bytes(data[..n].to_vec())),
        })
    }

    /// The boolean value, if this is a boolean reply.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Reply::Bool(value) => Some(*value),
            Reply::Bytes(_) => None,
        }
    }

    /// Take the data, if this is a data reply.
    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self {
            Reply::Bytes(data) => Some(data),
            Reply::Bool(_) => None,
        }
    }
}

/// Encode a boolean as a single 0/1 byte.
pub fn encode_bool(value: bool) -> u8 {
    u8::from(value)
}

/// Decode a boolean byte; any non-zero value is true.
pub fn decode_bool(byte: u8) -> bool {
    byte != 0
}
