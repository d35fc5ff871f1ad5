//! Client error types.

use rrpi_protocol::ProtocolError;
use thiserror::Error;

/// Errors returned by the client stubs.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Socket failure, including the server closing the connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A command could not be encoded or a reply could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// `RASPBERRY_IP` is not set.
    #[error("server host not configured (set RASPBERRY_IP)")]
    MissingHost,

    /// `RASPBERRY_PORT` is not a valid port number.
    #[error("invalid port: {0}")]
    InvalidPort(String),

    /// Argument rejected before anything was sent.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
