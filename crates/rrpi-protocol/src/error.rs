//! Protocol error types.

use thiserror::Error;

use crate::responses::ReplyKind;

/// Errors that can occur when encoding or decoding protocol frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame is too short to be valid.
    #[error("frame too short: expected at least {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Expected minimum length.
        expected: usize,
        /// Actual length received.
        actual: usize,
    },

    /// Opcode byte matches no registered command.
    ///
    /// No payload length is known for such a byte, so the stream cannot be
    /// resynchronized after it.
    #[error("unknown command code: 0x{0:02X}")]
    UnknownCommand(u8),

    /// Opcode belongs to a capability family that has no handlers.
    #[error("reserved command code: 0x{0:02X}")]
    ReservedCommand(u8),

    /// Address field was not exactly five bytes.
    #[error("malformed address: expected 5 bytes, got {len}")]
    MalformedAddress {
        /// Length of the rejected address.
        len: usize,
    },

    /// An SPI transfer announced more data than one transfer may carry.
    ///
    /// Only a legacy size field can announce this much. The whole frame is
    /// consumed, and the peer is still owed `size` reply bytes.
    #[error("transfer of {size} bytes exceeds the {max} byte limit")]
    TransferTooLong {
        /// Announced transfer size.
        size: usize,
        /// Largest transfer accepted.
        max: usize,
    },

    /// Payload does not fit the command's size field.
    #[error("payload too long: maximum {max} bytes, got {actual}")]
    PayloadTooLong {
        /// Maximum allowed length.
        max: usize,
        /// Actual length.
        actual: usize,
    },
}

impl ProtocolError {
    /// Whether the stream position is unknown after this error.
    ///
    /// Only opcode-level errors desynchronize; payload errors are reported
    /// after the whole frame has been consumed.
    pub fn is_desynchronizing(&self) -> bool {
        matches!(
            self,
            ProtocolError::UnknownCommand(_) | ProtocolError::ReservedCommand(_)
        )
    }

    /// Reply the peer still waits for after this error dropped a frame.
    pub fn owed_reply(&self) -> ReplyKind {
        match self {
            ProtocolError::TransferTooLong { size, .. } => ReplyKind::Bytes(*size),
            _ => ReplyKind::None,
        }
    }
}
