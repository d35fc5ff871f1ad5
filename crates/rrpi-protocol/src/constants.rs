//! Protocol constants
//!
//! Opcode bytes and fixed sizes used by the remote hardware protocol. The top
//! three bits of an opcode select the capability family, the low five bits
//! select the operation within that family.

// ============================================================================
// Capability Families
// ============================================================================

/// Mask selecting the family bits of an opcode.
pub const FAMILY_MASK: u8 = 0b1110_0000;

/// Serial peripheral bus (SPI) family.
pub const SPI_COMMAND: u8 = 0b0010_0000;
/// Two-wire bus (I2C) family. Reserved, no handlers.
pub const I2C_COMMAND: u8 = 0b0100_0000;
/// Serial port family. Reserved, no handlers.
pub const SERIAL_COMMAND: u8 = 0b0110_0000;
/// Digital pin I/O family. Reserved, no handlers.
pub const GPIO_COMMAND: u8 = 0b1000_0000;
/// nRF24 packet radio family.
pub const NRF_COMMAND: u8 = 0b1010_0000;

// ============================================================================
// SPI Opcodes
// ============================================================================

/// Release the SPI bus and reset transfer settings.
pub const SPI_CLOSE: u8 = SPI_COMMAND | 1;
/// Select a bus/device pair.
pub const SPI_OPEN: u8 = SPI_COMMAND | 2;
/// Full-duplex transfer with a 16-bit size prefix.
pub const SPI_XFER: u8 = SPI_COMMAND | 3;

// ============================================================================
// SPI Mode Bits
// ============================================================================

/// Clock phase.
pub const SPI_CPHA: u8 = 0x01;
/// Clock polarity.
pub const SPI_CPOL: u8 = 0x02;
/// Chip select active high.
pub const SPI_CS_HIGH: u8 = 0x04;
/// Least significant bit first.
pub const SPI_LSB_FIRST: u8 = 0x08;
/// Shared SI/SO line.
pub const SPI_3WIRE: u8 = 0x10;
/// Loopback mode.
pub const SPI_LOOP: u8 = 0x20;

// ============================================================================
// Radio Opcodes
// ============================================================================

/// Initialise the transceiver with bus, device, packet size, address and channel.
pub const NRF_INIT: u8 = NRF_COMMAND | 1;
/// Release the transceiver.
pub const NRF_CLOSE: u8 = NRF_COMMAND | 2;
/// Set the address of a read pipe.
pub const NRF_SET_READ_PIPE_ADR: u8 = NRF_COMMAND | 3;
/// Set the write pipe address.
pub const NRF_SET_WRITE_PIPE_ADR: u8 = NRF_COMMAND | 4;
/// Reserved: read back a read pipe address.
pub const NRF_GET_READ_PIPE_ADR: u8 = NRF_COMMAND | 5;
/// Reserved: read back the write pipe address.
pub const NRF_GET_WRITE_PIPE_ADR: u8 = NRF_COMMAND | 6;
/// Flush the transmit FIFO.
pub const NRF_FLUSH_TX: u8 = NRF_COMMAND | 7;
/// Flush the receive FIFO.
pub const NRF_FLUSH_RX: u8 = NRF_COMMAND | 8;
/// Power the transceiver up.
pub const NRF_POWER_UP: u8 = NRF_COMMAND | 9;
/// Power the transceiver down.
pub const NRF_POWER_DOWN: u8 = NRF_COMMAND | 10;
/// Switch to transmit mode.
pub const NRF_SWITCH_TX: u8 = NRF_COMMAND | 11;
/// Switch to receive mode.
pub const NRF_SWITCH_RX: u8 = NRF_COMMAND | 12;
/// Restore power-on register defaults.
pub const NRF_RESET: u8 = NRF_COMMAND | 13;
/// Transmit a packet, reply is the acknowledgement flag.
pub const NRF_SEND: u8 = NRF_COMMAND | 14;
/// Read a number of bytes from the receive FIFO.
pub const NRF_RECEIVE: u8 = NRF_COMMAND | 15;
/// Enter listening mode.
pub const NRF_START_LISTENING: u8 = NRF_COMMAND | 16;
/// Leave listening mode.
pub const NRF_STOP_LISTENING: u8 = NRF_COMMAND | 17;
/// Wait up to a timeout for received data.
pub const NRF_POLL_DATA: u8 = NRF_COMMAND | 18;
/// Transmit, then read back a reply of the same length.
pub const NRF_SEND_AND_RECEIVE: u8 = NRF_COMMAND | 19;

// ============================================================================
// Sizes
// ============================================================================

/// Size of a radio pipe address in bytes.
pub const ADDRESS_SIZE: usize = 5;
/// Size of an encoded timeout (IEEE-754 single precision).
pub const TIMEOUT_SIZE: usize = 4;
/// Largest payload carried by a radio send command (one-byte size field).
pub const MAX_RADIO_PAYLOAD: usize = u8::MAX as usize;
/// Largest payload carried by an SPI transfer command (two-byte size field).
pub const MAX_TRANSFER_SIZE: usize = u16::MAX as usize;
/// Largest packet the transceiver FIFO holds.
pub const MAX_PACKET_SIZE: u8 = 32;
/// Highest RF channel the transceiver accepts.
pub const MAX_CHANNEL: u8 = 125;

// ============================================================================
// Network
// ============================================================================

/// Default TCP port of the companion server.
pub const DEFAULT_PORT: u16 = 8789;
