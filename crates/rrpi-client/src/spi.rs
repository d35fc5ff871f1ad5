//! Remote SPI device.
//!
//! Mirrors the usual spidev handle: `open`, `xfer`, `close` plus mode
//! properties. The mode properties are kept on the client; the server only
//! sees open, transfer and close.

use std::io::{Read, Write};
use std::net::TcpStream;

use rrpi_protocol::{
    Command, TransferData, SPI_3WIRE, SPI_CPHA, SPI_CPOL, SPI_CS_HIGH, SPI_LOOP, SPI_LSB_FIRST,
};

use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::error::{ClientError, Result};

/// Smallest accepted word size.
pub const MIN_BITS_PER_WORD: u8 = 8;
/// Largest accepted word size.
pub const MAX_BITS_PER_WORD: u8 = 16;

/// An SPI device on the remote board.
pub struct SpiDev<S = TcpStream> {
    conn: Connection<S>,
    mode: u8,
    bits_per_word: u8,
    max_speed_hz: u32,
}

impl SpiDev<TcpStream> {
    /// Connect to the server described by `config`.
    pub fn connect(config: &ClientConfig) -> Result<Self> {
        Ok(Self::new(Connection::connect(config)?))
    }

    /// Connect using `RASPBERRY_IP` / `RASPBERRY_PORT`.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(Connection::from_env()?))
    }
}

impl<S: Read + Write> SpiDev<S> {
    /// Use an existing connection.
    pub fn new(conn: Connection<S>) -> Self {
        SpiDev {
            conn,
            mode: 0,
            bits_per_word: 0,
            max_speed_hz: 0,
        }
    }

    /// Select `bus`/`device` on the server.
    pub fn open(&mut self, bus: u8, device: u8) -> Result<()> {
        log::debug!("SPI open {}.{}", bus, device);
        self.conn.execute(&Command::SpiOpen { bus, device })?;
        Ok(())
    }

    /// Full-duplex transfer; returns as many bytes as were sent.
    pub fn xfer(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        let data = TransferData::from_slice(data)?;
        self.conn.execute_bytes(&Command::SpiTransfer { data })
    }

    /// Write bytes, discarding what is clocked in.
    pub fn writebytes(&mut self, data: &[u8]) -> Result<()> {
        self.xfer(data)?;
        Ok(())
    }

    /// Read `n` bytes by clocking out zeros.
    pub fn readbytes(&mut self, n: usize) -> Result<Vec<u8>> {
        self.xfer(&vec![0u8; n])
    }

    /// Release the device on the server and reset the mode properties.
    pub fn close(&mut self) -> Result<()> {
        self.mode = 0;
        self.bits_per_word = 0;
        self.max_speed_hz = 0;
        self.conn.execute(&Command::SpiClose)?;
        Ok(())
    }

    /// Clock polarity/phase, 0..=3.
    pub fn mode(&self) -> u8 {
        self.mode & (SPI_CPHA | SPI_CPOL)
    }

    /// Set clock polarity/phase.
    pub fn set_mode(&mut self, mode: u8) -> Result<()> {
        if mode > (SPI_CPHA | SPI_CPOL) {
            return Err(ClientError::InvalidArgument(format!(
                "invalid mode {} (0 to 3)",
                mode
            )));
        }
        self.mode = (self.mode & !(SPI_CPHA | SPI_CPOL)) | mode;
        Ok(())
    }

    /// Chip select active high.
    pub fn cshigh(&self) -> bool {
        self.mode & SPI_CS_HIGH != 0
    }

    /// Set chip select polarity.
    pub fn set_cshigh(&mut self, on: bool) {
        self.set_flag(SPI_CS_HIGH, on);
    }

    /// Least significant bit first.
    pub fn lsbfirst(&self) -> bool {
        self.mode & SPI_LSB_FIRST != 0
    }

    /// Set bit order.
    pub fn set_lsbfirst(&mut self, on: bool) {
        self.set_flag(SPI_LSB_FIRST, on);
    }

    /// Shared SI/SO line.
    pub fn threewire(&self) -> bool {
        self.mode & SPI_3WIRE != 0
    }

    /// Set three-wire mode.
    pub fn set_threewire(&mut self, on: bool) {
        self.set_flag(SPI_3WIRE, on);
    }

    /// Loopback mode.
    pub fn loopback(&self) -> bool {
        self.mode & SPI_LOOP != 0
    }

    /// Set loopback mode.
    pub fn set_loopback(&mut self, on: bool) {
        self.set_flag(SPI_LOOP, on);
    }

    /// Word size; 0 until set.
    pub fn bits_per_word(&self) -> u8 {
        self.bits_per_word
    }

    /// Set the word size (8 to 16).
    pub fn set_bits_per_word(&mut self, bits: u8) -> Result<()> {
        if !(MIN_BITS_PER_WORD..=MAX_BITS_PER_WORD).contains(&bits) {
            return Err(ClientError::InvalidArgument(format!(
                "invalid bits_per_word {} (8 to 16)",
                bits
            )));
        }
        self.bits_per_word = bits;
        Ok(())
    }

    /// Clock speed in Hz; 0 until set.
    pub fn max_speed_hz(&self) -> u32 {
        self.max_speed_hz
    }

    /// Set the clock speed.
    pub fn set_max_speed_hz(&mut self, hz: u32) {
        self.max_speed_hz = hz;
    }

    /// Borrow the connection.
    pub fn connection(&self) -> &Connection<S> {
        &self.conn
    }

    fn set_flag(&mut self, flag: u8, on: bool) {
        if on {
            self.mode |= flag;
        } else {
            self.mode &= !flag;
        }
    }
}
