//! Remote nRF24 radio.
//!
//! One method per radio command. Methods with a reply block until the server
//! has answered; the others return as soon as the command is written.

use std::io::{Read, Write};
use std::net::TcpStream;

use rrpi_protocol::{Address, Command, RadioConfig, RadioPayload, Timeout};

use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::error::{ClientError, Result};

/// nRF24 transceiver attached to the remote board.
pub struct Nrf24<S = TcpStream> {
    conn: Connection<S>,
}

impl Nrf24<TcpStream> {
    /// Connect to the server described by `config`.
    pub fn connect(config: &ClientConfig) -> Result<Self> {
        Ok(Self::new(Connection::connect(config)?))
    }

    /// Connect using `RASPBERRY_IP` / `RASPBERRY_PORT`.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(Connection::from_env()?))
    }
}

impl<S: Read + Write> Nrf24<S> {
    /// Use an existing connection.
    pub fn new(conn: Connection<S>) -> Self {
        Nrf24 { conn }
    }

    /// Borrow the connection.
    pub fn connection(&self) -> &Connection<S> {
        &self.conn
    }

    fn fire(&mut self, command: Command) -> Result<()> {
        log::debug!(">> {}", command.opcode().name());
        self.conn.execute(&command)?;
        Ok(())
    }

    /// Configure the transceiver.
    pub fn init(&mut self, config: RadioConfig) -> Result<()> {
        config.validate().map_err(ClientError::InvalidArgument)?;
        self.fire(Command::RadioInit(config))
    }

    /// Release the transceiver.
    pub fn close(&mut self) -> Result<()> {
        self.fire(Command::RadioClose)
    }

    /// Set the address a read pipe listens on.
    pub fn set_read_pipe_address(&mut self, pipe: u8, address: Address) -> Result<()> {
        self.fire(Command::RadioSetReadPipeAddress { pipe, address })
    }

    /// Set the destination address.
    pub fn set_write_pipe_address(&mut self, address: Address) -> Result<()> {
        self.fire(Command::RadioSetWritePipeAddress { address })
    }

    /// Flush the transmit FIFO.
    pub fn flush_tx(&mut self) -> Result<()> {
        self.fire(Command::RadioFlushTx)
    }

    /// Flush the receive FIFO.
    pub fn flush_rx(&mut self) -> Result<()> {
        self.fire(Command::RadioFlushRx)
    }

    /// Power up.
    pub fn power_up(&mut self) -> Result<()> {
        self.fire(Command::RadioPowerUp)
    }

    /// Power down.
    pub fn power_down(&mut self) -> Result<()> {
        self.fire(Command::RadioPowerDown)
    }

    /// Switch to transmit mode.
    pub fn switch_to_tx(&mut self) -> Result<()> {
        self.fire(Command::RadioSwitchToTx)
    }

    /// Switch to receive mode.
    pub fn switch_to_rx(&mut self) -> Result<()> {
        self.fire(Command::RadioSwitchToRx)
    }

    /// Restore transceiver defaults.
    pub fn reset(&mut self) -> Result<()> {
        self.fire(Command::RadioReset)
    }

    /// Transmit up to 255 bytes; returns whether the receiver acknowledged.
    pub fn send(&mut self, data: &[u8]) -> Result<bool> {
        let data = RadioPayload::from_slice(data)?;
        let acked = self.conn.execute_bool(&Command::RadioSend { data })?;
        log::debug!(">> radio_send, ack {}", acked);
        Ok(acked)
    }

    /// Transmit the bytes of a string.
    pub fn send_str(&mut self, text: &str) -> Result<bool> {
        self.send(text.as_bytes())
    }

    /// Read exactly `count` bytes.
    pub fn receive(&mut self, count: u8) -> Result<Vec<u8>> {
        self.conn.execute_bytes(&Command::RadioReceive { count })
    }

    /// Start listening.
    pub fn start_listening(&mut self) -> Result<()> {
        self.fire(Command::RadioStartListening)
    }

    /// Stop listening.
    pub fn stop_listening(&mut self) -> Result<()> {
        self.fire(Command::RadioStopListening)
    }

    /// Wait up to `timeout` seconds for data; returns whether any arrived.
    pub fn poll(&mut self, timeout: f32) -> Result<bool> {
        self.conn.execute_bool(&Command::RadioPoll {
            timeout: Timeout::from_secs(timeout),
        })
    }

    /// Transmit `data`, then return an answer of the same length received
    /// within `timeout` seconds (zeros if nothing arrived).
    pub fn send_and_receive(&mut self, data: &[u8], timeout: f32) -> Result<Vec<u8>> {
        let data = RadioPayload::from_slice(data)?;
        self.conn.execute_bytes(&Command::RadioSendAndReceive {
            data,
            timeout: Timeout::from_secs(timeout),
        })
    }
}

/// Zero-pad `data` to `size` bytes.
pub fn pad_to_size(mut data: Vec<u8>, size: usize) -> Vec<u8> {
    if data.len() < size {
        data.resize(size, 0);
    }
    data
}
