//! Incremental command decoding.
//!
//! Commands have no generic length prefix: the opcode byte implies the
//! payload layout, and only a few commands carry their own size field.
//!
//! ```text
//! +--------+------------------------------+
//! | opcode | payload (layout from opcode) |
//! +--------+------------------------------+
//! ```

use bytes::{Buf, BytesMut};

use crate::commands::{Command, DecodeError};
use crate::error::ProtocolError;
use crate::types::SizeMode;

/// Initial buffer capacity; grows for large SPI transfers.
pub const INITIAL_BUFFER_SIZE: usize = 1024;

/// A codec that accumulates received bytes and yields whole commands.
#[derive(Debug, Default)]
pub struct CommandCodec {
    /// Buffer for accumulating incoming data.
    buffer: BytesMut,
    /// How SPI transfer sizes are combined.
    size_mode: SizeMode,
}

impl CommandCodec {
    /// Create a new codec using little-endian transfer sizes.
    pub fn new() -> Self {
        Self::with_size_mode(SizeMode::LittleEndian)
    }

    /// Create a new codec with an explicit transfer size mode.
    pub fn with_size_mode(size_mode: SizeMode) -> Self {
        CommandCodec {
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            size_mode,
        }
    }

    /// The transfer size mode in use.
    pub fn size_mode(&self) -> SizeMode {
        self.size_mode
    }

    /// Add received data to the buffer.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode the next complete command from the buffer.
    ///
    /// Returns `Ok(Some(command))` if a complete command is available, or
    /// `Ok(None)` if more data is needed. A payload error removes the
    /// offending frame from the buffer so decoding can continue; an opcode
    /// error leaves the buffer untouched because the frame length is unknown.
    pub fn decode(&mut self) -> Result<Option<Command>, ProtocolError> {
        match Command::decode(&self.buffer, self.size_mode) {
            Ok(Some((command, consumed))) => {
                self.buffer.advance(consumed);
                log::trace!("decoded {:?} ({} bytes)", command.opcode(), consumed);
                Ok(Some(command))
            }
            Ok(None) => Ok(None),
            Err(DecodeError::Payload { error, consumed }) => {
                self.buffer.advance(consumed);
                log::debug!("dropped malformed frame of {} bytes: {}", consumed, error);
                Err(error)
            }
            Err(DecodeError::Opcode(error)) => Err(error),
        }
    }

    /// Get the number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
