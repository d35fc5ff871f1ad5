//! Error types for the companion server.

use rrpi_protocol::ProtocolError;
use thiserror::Error;

/// Failures of the underlying hardware or its transport.
#[derive(Debug, Error)]
pub enum HardwareError {
    /// I/O error talking to the device node.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Pipe index the transceiver does not have.
    #[error("invalid pipe {0} (transceiver has pipes 0-5)")]
    InvalidPipe(u8),

    /// Argument outside what the hardware accepts.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Device reported or entered an unexpected state.
    #[error("device error: {0}")]
    Device(String),
}

/// Failures of a single command handler. The session logs these and goes on.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// SPI transfer or close before any open.
    #[error("SPI bus is not open")]
    BusNotOpen,

    /// Radio command before init (or after close).
    #[error("radio is not initialized")]
    RadioNotInitialized,

    /// Radio init while already initialized.
    #[error("radio is already initialized")]
    RadioAlreadyInitialized,

    /// Radio init with values the transceiver cannot accept.
    #[error("invalid radio configuration: {0}")]
    InvalidRadioConfig(String),

    /// Hardware failure.
    #[error(transparent)]
    Hardware(#[from] HardwareError),
}

/// Why a session ended.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Peer closed its side or reset the connection. Normal termination.
    #[error("peer disconnected")]
    PeerDisconnected,

    /// An opcode could not be decoded, so the stream position is lost.
    #[error("stream desynchronized: {0}")]
    Desynchronized(ProtocolError),

    /// Other socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that stop the server itself.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding or accepting failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed.
    #[error("config error: {0}")]
    Config(#[from] serde_yaml::Error),

    /// Configuration is inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Interrupt handler could not be installed.
    #[error("signal handler: {0}")]
    Signal(#[from] ctrlc::Error),
}

/// Result type for command handlers.
pub type HandlerResult<T> = std::result::Result<T, HandlerError>;
