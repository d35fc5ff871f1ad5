//! Companion server for the remote Raspberry Pi hardware protocol.
//!
//! The server listens on TCP (port 8789 by default), decodes commands framed
//! by [`rrpi_protocol`], and executes them against an SPI bus and an nRF24
//! radio. Each connection is served by its own thread with its own handler
//! state.
//!
//! # Layers
//!
//! - [`listener`]: accept loop and session threads
//! - [`session`]: read, decode, dispatch, reply
//! - [`dispatch`]: routes a command to the bus bridge or radio controller
//! - [`bus`] / [`radio`]: handler state over pluggable hardware traits
//!
//! # Example
//!
//! ```rust,no_run
//! use rrpi_server::{Listener, ServerConfig};
//!
//! let listener = Listener::bind(&ServerConfig::default())?;
//! listener.serve()?;
//! # Ok::<(), rrpi_server::ServerError>(())
//! ```

pub mod bus;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod listener;
pub mod metrics;
pub mod radio;
pub mod session;
#[cfg(all(feature = "spidev", target_os = "linux"))]
pub mod spidev;

pub use bus::{BusBridge, LoopbackSpi, SpiSettings, SpiTransport};
pub use config::{Backend, Hardware, ServerConfig, SimulatedHardware};
pub use dispatch::Dispatcher;
pub use error::{HandlerError, HardwareError, ServerError, SessionError};
pub use listener::{Listener, ListenerHandle, SessionGuard, SessionTracker, ShutdownHandle};
pub use radio::{RadioController, RadioDevice, RadioMode, RadioState, SimRadio};
pub use session::{Session, SessionSummary};
