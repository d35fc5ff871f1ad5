//! Commands sent from a host client to the companion server.

use crate::constants::*;
use crate::error::ProtocolError;
use crate::responses::ReplyKind;
use crate::types::*;

/// Registered opcodes, one per command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    SpiClose = SPI_CLOSE,
    SpiOpen = SPI_OPEN,
    SpiTransfer = SPI_XFER,
    RadioInit = NRF_INIT,
    RadioClose = NRF_CLOSE,
    RadioSetReadPipeAddress = NRF_SET_READ_PIPE_ADR,
    RadioSetWritePipeAddress = NRF_SET_WRITE_PIPE_ADR,
    RadioGetReadPipeAddress = NRF_GET_READ_PIPE_ADR,
    RadioGetWritePipeAddress = NRF_GET_WRITE_PIPE_ADR,
    RadioFlushTx = NRF_FLUSH_TX,
    RadioFlushRx = NRF_FLUSH_RX,
    RadioPowerUp = NRF_POWER_UP,
    RadioPowerDown = NRF_POWER_DOWN,
    RadioSwitchToTx = NRF_SWITCH_TX,
    RadioSwitchToRx = NRF_SWITCH_RX,
    RadioReset = NRF_RESET,
    RadioSend = NRF_SEND,
    RadioReceive = NRF_RECEIVE,
    RadioStartListening = NRF_START_LISTENING,
    RadioStopListening = NRF_STOP_LISTENING,
    RadioPoll = NRF_POLL_DATA,
    RadioSendAndReceive = NRF_SEND_AND_RECEIVE,
}

impl Opcode {
    /// The opcode byte.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Short lowercase name, used for logs and metric labels.
    pub fn name(self) -> &'static str {
        match self {
            Opcode::SpiClose => "spi_close",
            Opcode::SpiOpen => "spi_open",
            Opcode::SpiTransfer => "spi_transfer",
            Opcode::RadioInit => "radio_init",
            Opcode::RadioClose => "radio_close",
            Opcode::RadioSetReadPipeAddress => "radio_set_read_pipe_address",
            Opcode::RadioSetWritePipeAddress => "radio_set_write_pipe_address",
            Opcode::RadioGetReadPipeAddress => "radio_get_read_pipe_address",
            Opcode::RadioGetWritePipeAddress => "radio_get_write_pipe_address",
            Opcode::RadioFlushTx => "radio_flush_tx",
            Opcode::RadioFlushRx => "radio_flush_rx",
            Opcode::RadioPowerUp => "radio_power_up",
            Opcode::RadioPowerDown => "radio_power_down",
            Opcode::RadioSwitchToTx => "radio_switch_to_tx",
            Opcode::RadioSwitchToRx => "radio_switch_to_rx",
            Opcode::RadioReset => "radio_reset",
            Opcode::RadioSend => "radio_send",
            Opcode::RadioReceive => "radio_receive",
            Opcode::RadioStartListening => "radio_start_listening",
            Opcode::RadioStopListening => "radio_stop_listening",
            Opcode::RadioPoll => "radio_poll",
            Opcode::RadioSendAndReceive => "radio_send_and_receive",
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = ProtocolError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        let opcode = match code {
            SPI_CLOSE => Opcode::SpiClose,
            SPI_OPEN => Opcode::SpiOpen,
            SPI_XFER => Opcode::SpiTransfer,
            NRF_INIT => Opcode::RadioInit,
            NRF_CLOSE => Opcode::RadioClose,
            NRF_SET_READ_PIPE_ADR => Opcode::RadioSetReadPipeAddress,
            NRF_SET_WRITE_PIPE_ADR => Opcode::RadioSetWritePipeAddress,
            NRF_GET_READ_PIPE_ADR => Opcode::RadioGetReadPipeAddress,
            NRF_GET_WRITE_PIPE_ADR => Opcode::RadioGetWritePipeAddress,
            NRF_FLUSH_TX => Opcode::RadioFlushTx,
            NRF_FLUSH_RX => Opcode::RadioFlushRx,
            NRF_POWER_UP => Opcode::RadioPowerUp,
            NRF_POWER_DOWN => Opcode::RadioPowerDown,
            NRF_SWITCH_TX => Opcode::RadioSwitchToTx,
            NRF_SWITCH_RX => Opcode::RadioSwitchToRx,
            NRF_RESET => Opcode::RadioReset,
            NRF_SEND => Opcode::RadioSend,
            NRF_RECEIVE => Opcode::RadioReceive,
            NRF_START_LISTENING => Opcode::RadioStartListening,
            NRF_STOP_LISTENING => Opcode::RadioStopListening,
            NRF_POLL_DATA => Opcode::RadioPoll,
            NRF_SEND_AND_RECEIVE => Opcode::RadioSendAndReceive,
            _ => {
                return Err(match code & FAMILY_MASK {
                    I2C_COMMAND | SERIAL_COMMAND | GPIO_COMMAND => {
                        ProtocolError::ReservedCommand(code)
                    }
                    _ => ProtocolError::UnknownCommand(code),
                })
            }
        };
        Ok(opcode)
    }
}

/// Commands that can be sent to the companion server.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Select an SPI bus/device pair.
    SpiOpen {
        /// Bus number.
        bus: u8,
        /// Chip select on the bus.
        device: u8,
    },

    /// Full-duplex SPI transfer.
    SpiTransfer {
        /// Bytes to clock out; the reply has the same length.
        data: TransferData,
    },

    /// Release the SPI bus.
    SpiClose,

    /// Initialise the radio.
    RadioInit(RadioConfig),

    /// Release the radio.
    RadioClose,

    /// Set the address of a read pipe.
    RadioSetReadPipeAddress {
        /// Pipe index (0..=5 on the nRF24L01).
        pipe: u8,
        /// Address to listen on.
        address: Address,
    },

    /// Set the address packets are transmitted to.
    RadioSetWritePipeAddress {
        /// Destination address.
        address: Address,
    },

    /// Reserved, has no handler behaviour.
    RadioGetReadPipeAddress,

    /// Reserved, has no handler behaviour.
    RadioGetWritePipeAddress,

    /// Flush the transmit FIFO.
    RadioFlushTx,

    /// Flush the receive FIFO.
    RadioFlushRx,

    /// Power up.
    RadioPowerUp,

    /// Power down.
    RadioPowerDown,

    /// Switch to transmit mode.
    RadioSwitchToTx,

    /// Switch to receive mode.
    RadioSwitchToRx,

    /// Restore power-on defaults.
    RadioReset,

    /// Transmit a packet. Replies with the acknowledgement flag.
    RadioSend {
        /// Packet bytes.
        data: RadioPayload,
    },

    /// Read bytes from the current read pipe. Replies with exactly `count` bytes.
    RadioReceive {
        /// Number of bytes requested.
        count: u8,
    },

    /// Enter listening mode.
    RadioStartListening,

    /// Leave listening mode.
    RadioStopListening,

    /// Wait for incoming data. Replies with whether data became available.
    RadioPoll {
        /// How long to wait.
        timeout: Timeout,
    },

    /// Transmit, wait, then read back a reply as long as the request.
    RadioSendAndReceive {
        /// Packet bytes.
        data: RadioPayload,
        /// How long to wait for the answer.
        timeout: Timeout,
    },
}

impl Command {
    /// The command's opcode.
    pub fn opcode(&self) -> Opcode {
        match self {
            Command::SpiOpen { .. } => Opcode::SpiOpen,
            Command::SpiTransfer { .. } => Opcode::SpiTransfer,
            Command::SpiClose => Opcode::SpiClose,
            Command::RadioInit(_) => Opcode::RadioInit,
            Command::RadioClose => Opcode::RadioClose,
            Command::RadioSetReadPipeAddress { .. } => Opcode::RadioSetReadPipeAddress,
            Command::RadioSetWritePipeAddress { .. } => Opcode::RadioSetWritePipeAddress,
            Command::RadioGetReadPipeAddress => Opcode::RadioGetReadPipeAddress,
            Command::RadioGetWritePipeAddress => Opcode::RadioGetWritePipeAddress,
            Command::RadioFlushTx => Opcode::RadioFlushTx,
            Command::RadioFlushRx => Opcode::RadioFlushRx,
            Command::RadioPowerUp => Opcode::RadioPowerUp,
            Command::RadioPowerDown => Opcode::RadioPowerDown,
            Command::RadioSwitchToTx => Opcode::RadioSwitchToTx,
            Command::RadioSwitchToRx => Opcode::RadioSwitchToRx,
            Command::RadioReset => Opcode::RadioReset,
            Command::RadioSend { .. } => Opcode::RadioSend,
            Command::RadioReceive { .. } => Opcode::RadioReceive,
            Command::RadioStartListening => Opcode::RadioStartListening,
            Command::RadioStopListening => Opcode::RadioStopListening,
            Command::RadioPoll { .. } => Opcode::RadioPoll,
            Command::RadioSendAndReceive { .. } => Opcode::RadioSendAndReceive,
        }
    }

    /// The reply the server writes for this command.
    pub fn reply_kind(&self) -> ReplyKind {
        match self {
            Command::SpiTransfer { data } => ReplyKind::Bytes(data.len()),
            Command::RadioSend { .. } | Command::RadioPoll { .. } => ReplyKind::Bool,
            Command::RadioReceive { count } => ReplyKind::Bytes(*count as usize),
            Command::RadioSendAndReceive { data, .. } => ReplyKind::Bytes(data.len()),
            _ => ReplyKind::None,
        }
    }

    /// Encode the command to bytes for transmission.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8);
        buf.push(self.opcode().code());

        match self {
            Command::SpiOpen { bus, device } => {
                buf.push(*bus);
                buf.push(*device);
            }

            Command::SpiTransfer { data } => {
                buf.extend_from_slice(&(data.len() as u16).to_le_bytes());
                buf.extend_from_slice(data);
            }

            Command::RadioInit(config) => {
                buf.push(config.spi_bus);
                buf.push(config.spi_device);
                buf.push(config.packet_size);
                buf.extend_from_slice(config.address.as_bytes());
                buf.push(config.channel);
            }

            Command::RadioSetReadPipeAddress { pipe, address } => {
                buf.push(*pipe);
                buf.extend_from_slice(address.as_bytes());
            }

            Command::RadioSetWritePipeAddress { address } => {
                buf.extend_from_slice(address.as_bytes());
            }

            Command::RadioSend { data } => {
                buf.push(data.len() as u8);
                buf.extend_from_slice(data);
            }

            Command::RadioReceive { count } => {
                buf.push(*count);
            }

            Command::RadioPoll { timeout } => {
                buf.extend_from_slice(&timeout.to_bytes());
            }

            // Timeout precedes the size byte for this command
            Command::RadioSendAndReceive { data, timeout } => {
                buf.extend_from_slice(&timeout.to_bytes());
                buf.push(data.len() as u8);
                buf.extend_from_slice(data);
            }

            Command::SpiClose
            | Command::RadioClose
            | Command::RadioGetReadPipeAddress
            | Command::RadioGetWritePipeAddress
            | Command::RadioFlushTx
            | Command::RadioFlushRx
            | Command::RadioPowerUp
            | Command::RadioPowerDown
            | Command::RadioSwitchToTx
            | Command::RadioSwitchToRx
            | Command::RadioReset
            | Command::RadioStartListening
            | Command::RadioStopListening => {}
        }

        buf
    }

    /// Decode one command from the front of `data`.
    ///
    /// Returns `Ok(None)` while the frame is incomplete and
    /// `Ok(Some((command, consumed)))` once it is complete. Opcode errors are
    /// returned before any payload is looked at; payload errors are returned
    /// only for complete frames, so the caller may skip the frame and go on.
    pub fn decode(data: &[u8], size_mode: SizeMode) -> Result<Option<(Command, usize)>, DecodeError> {
        let Some(&code) = data.first() else {
            return Ok(None);
        };
        let opcode = Opcode::try_from(code).map_err(DecodeError::Opcode)?;
        let mut reader = PayloadReader::new(&data[1..]);

        let command = match opcode {
            Opcode::SpiClose => Command::SpiClose,

            Opcode::SpiOpen => {
                let Some(&[bus, device]) = reader.take_array::<2>() else {
                    return Ok(None);
                };
                Command::SpiOpen { bus, device }
            }

            Opcode::SpiTransfer => {
                let Some(&[low, high]) = reader.take_array::<2>() else {
                    return Ok(None);
                };
                let size = size_mode.combine(low, high);
                let Some(bytes) = reader.take(size) else {
                    return Ok(None);
                };
                // Only a legacy size field can exceed the transfer bound
                let data = TransferData::from_slice(bytes).map_err(|_| DecodeError::Payload {
                    error: ProtocolError::TransferTooLong {
                        size,
                        max: MAX_TRANSFER_SIZE,
                    },
                    consumed: reader.consumed() + 1,
                })?;
                Command::SpiTransfer { data }
            }

            Opcode::RadioInit => {
                let Some(&[spi_bus, spi_device, packet_size]) = reader.take_array::<3>() else {
                    return Ok(None);
                };
                let Some(address) = reader.take_address() else {
                    return Ok(None);
                };
                let Some(&[channel]) = reader.take_array::<1>() else {
                    return Ok(None);
                };
                let config = RadioConfig {
                    spi_bus,
                    spi_device,
                    packet_size,
                    address,
                    channel,
                };
                Command::RadioInit(config)
            }

            Opcode::RadioClose => Command::RadioClose,

            Opcode::RadioSetReadPipeAddress => {
                let Some(&[pipe]) = reader.take_array::<1>() else {
                    return Ok(None);
                };
                let Some(address) = reader.take_address() else {
                    return Ok(None);
                };
                Command::RadioSetReadPipeAddress { pipe, address }
            }

            Opcode::RadioSetWritePipeAddress => {
                let Some(address) = reader.take_address() else {
                    return Ok(None);
                };
                Command::RadioSetWritePipeAddress { address }
            }

            Opcode::RadioGetReadPipeAddress => Command::RadioGetReadPipeAddress,
            Opcode::RadioGetWritePipeAddress => Command::RadioGetWritePipeAddress,
            Opcode::RadioFlushTx => Command::RadioFlushTx,
            Opcode::RadioFlushRx => Command::RadioFlushRx,
            Opcode::RadioPowerUp => Command::RadioPowerUp,
            Opcode::RadioPowerDown => Command::RadioPowerDown,
            Opcode::RadioSwitchToTx => Command::RadioSwitchToTx,
            Opcode::RadioSwitchToRx => Command::RadioSwitchToRx,
            Opcode::RadioReset => Command::RadioReset,

            Opcode::RadioSend => {
                let Some(data) = reader.take_radio_payload() else {
                    return Ok(None);
                };
                Command::RadioSend { data }
            }

            Opcode::RadioReceive => {
                let Some(&[count]) = reader.take_array::<1>() else {
                    return Ok(None);
                };
                Command::RadioReceive { count }
            }

            Opcode::RadioStartListening => Command::RadioStartListening,
            Opcode::RadioStopListening => Command::RadioStopListening,

            Opcode::RadioPoll => {
                let Some(timeout) = reader.take_timeout() else {
                    return Ok(None);
                };
                Command::RadioPoll { timeout }
            }

            Opcode::RadioSendAndReceive => {
                let Some(timeout) = reader.take_timeout() else {
                    return Ok(None);
                };
                let Some(data) = reader.take_radio_payload() else {
                    return Ok(None);
                };
                Command::RadioSendAndReceive { data, timeout }
            }
        };

        Ok(Some((command, reader.consumed() + 1)))
    }
}

/// Error from [`Command::decode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The opcode byte could not be decoded; nothing was consumed.
    Opcode(ProtocolError),
    /// The frame was complete but its payload was rejected.
    Payload {
        /// The underlying error.
        error: ProtocolError,
        /// Bytes the rejected frame occupied, including the opcode.
        consumed: usize,
    },
}

impl DecodeError {
    /// The protocol error behind this failure.
    pub fn into_error(self) -> ProtocolError {
        match self {
            DecodeError::Opcode(e) => e,
            DecodeError::Payload { error, .. } => error,
        }
    }
}

/// Cursor over a payload that reports "not enough bytes yet" as `None`.
struct PayloadReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        PayloadReader { data, pos: 0 }
    }

    fn consumed(&self) -> usize {
        self.pos
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        let bytes = self.data.get(self.pos..end)?;
        self.pos = end;
        Some(bytes)
    }

    fn take_array<const N: usize>(&mut self) -> Option<&'a [u8; N]> {
        self.take(N).and_then(|b| b.try_into().ok())
    }

    fn take_address(&mut self) -> Option<Address> {
        self.take_array::<ADDRESS_SIZE>().map(|b| Address(*b))
    }

    fn take_timeout(&mut self) -> Option<Timeout> {
        self.take_array::<TIMEOUT_SIZE>().map(|b| Timeout::from_bytes(*b))
    }

    fn take_radio_payload(&mut self) -> Option<RadioPayload> {
        let &[size] = self.take_array::<1>()?;
        let bytes = self.take(size as usize)?;
        // A one-byte size can never exceed the payload bound
        RadioPayload::from_slice(bytes).ok()
    }
}
