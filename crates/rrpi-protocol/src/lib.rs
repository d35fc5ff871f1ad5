//! Remote Raspberry Pi hardware protocol
//!
//! This crate provides the wire format used to forward SPI bus and nRF24
//! radio operations from a host machine to a companion server running on the
//! board that has the hardware attached.
//!
//! # Protocol Overview
//!
//! Every request starts with a one-byte opcode. The opcode alone determines
//! the payload layout and the reply shape:
//!
//! - **Commands** (host → server): `opcode` followed by a fixed payload
//! - **Replies** (server → host): nothing, one boolean byte, or an implied
//!   number of raw bytes
//!
//! Requests and replies strictly alternate; there is no multiplexing.
//!
//! # Example
//!
//! ```rust
//! use rrpi_protocol::{Command, CommandCodec, RadioPayload, ReplyKind};
//!
//! let cmd = Command::RadioSend { data: RadioPayload::new(vec![0xAA, 0xBB]).unwrap() };
//! let frame = cmd.encode();
//! assert_eq!(cmd.reply_kind(), ReplyKind::Bool);
//!
//! let mut codec = CommandCodec::new();
//! codec.push(&frame);
//! assert_eq!(codec.decode().unwrap(), Some(cmd));
//! ```

mod commands;
mod constants;
mod error;
mod frame;
mod responses;
mod types;

pub use commands::*;
pub use constants::*;
pub use error::*;
pub use frame::*;
pub use responses::*;
pub use types::*;
