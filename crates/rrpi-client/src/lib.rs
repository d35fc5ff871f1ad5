//! Host-side stubs for the remote Raspberry Pi hardware protocol.
//!
//! Code written against a local SPI device or nRF24 radio can run on another
//! machine by swapping in these types; every call is forwarded over TCP to
//! the companion server on the board.
//!
//! ```rust,no_run
//! use rrpi_client::{ClientConfig, SpiDev};
//!
//! let mut spi = SpiDev::connect(&ClientConfig::new("192.168.1.20"))?;
//! spi.open(0, 0)?;
//! let rx = spi.xfer(&[0x9F, 0, 0, 0])?;
//! spi.close()?;
//! # Ok::<(), rrpi_client::ClientError>(())
//! ```

mod config;
mod connection;
mod error;
mod nrf24;
mod spi;

pub use config::{ClientConfig, HOST_VAR, PORT_VAR};
pub use connection::Connection;
pub use error::{ClientError, Result};
pub use nrf24::{pad_to_size, Nrf24};
pub use spi::{SpiDev, MAX_BITS_PER_WORD, MIN_BITS_PER_WORD};

pub use rrpi_protocol::{Address, RadioConfig};
