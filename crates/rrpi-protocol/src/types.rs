//! Common types used in the protocol.

use std::fmt;
use std::ops::Deref;
use std::time::Duration;

use crate::constants::*;
use crate::error::ProtocolError;

/// A 5-byte radio pipe address, transmitted in order with no byte swapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Address(pub [u8; ADDRESS_SIZE]);

impl Address {
    /// Create a new address from bytes.
    pub fn new(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Address(bytes)
    }

    /// Create from a slice. Fails unless the slice is exactly five bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self, ProtocolError> {
        let bytes: [u8; ADDRESS_SIZE] = slice
            .try_into()
            .map_err(|_| ProtocolError::MalformedAddress { len: slice.len() })?;
        Ok(Address(bytes))
    }

    /// Get the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_SIZE] {
        &self.0
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}

/// A timeout in seconds, carried as a 4-byte native-endian `f32`.
///
/// The sending side writes its native representation, so both ends must
/// agree on byte order or the value is silently corrupted.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Timeout(pub f32);

impl Timeout {
    /// Create a timeout of the given number of seconds.
    pub fn from_secs(secs: f32) -> Self {
        Timeout(secs)
    }

    /// Seconds as transmitted.
    pub fn secs(&self) -> f32 {
        self.0
    }

    /// Encode to wire bytes.
    pub fn to_bytes(self) -> [u8; TIMEOUT_SIZE] {
        self.0.to_ne_bytes()
    }

    /// Decode from wire bytes.
    pub fn from_bytes(bytes: [u8; TIMEOUT_SIZE]) -> Self {
        Timeout(f32::from_ne_bytes(bytes))
    }

    /// Convert to a `Duration`.
    ///
    /// NaN, zero and negative values map to `Duration::ZERO`; values too large
    /// for a `Duration` saturate.
    pub fn as_duration(&self) -> Duration {
        if self.0.is_nan() || self.0 <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f32(self.0).unwrap_or(Duration::MAX)
    }
}

/// A byte payload whose length fits a size field of at most `MAX`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BoundedBytes<const MAX: usize>(Vec<u8>);

/// Payload of the radio send commands (one-byte size field).
pub type RadioPayload = BoundedBytes<MAX_RADIO_PAYLOAD>;

/// Payload of an SPI transfer (two-byte size field).
pub type TransferData = BoundedBytes<MAX_TRANSFER_SIZE>;

impl<const MAX: usize> BoundedBytes<MAX> {
    /// Wrap a payload, rejecting it if it is longer than `MAX`.
    pub fn new(data: Vec<u8>) -> Result<Self, ProtocolError> {
        if data.len() > MAX {
            return Err(ProtocolError::PayloadTooLong {
                max: MAX,
                actual: data.len(),
            });
        }
        Ok(BoundedBytes(data))
    }

    /// Copy a slice into a payload.
    pub fn from_slice(data: &[u8]) -> Result<Self, ProtocolError> {
        Self::new(data.to_vec())
    }

    /// Unwrap into the inner bytes.
    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

impl<const MAX: usize> Deref for BoundedBytes<MAX> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl<const MAX: usize> TryFrom<Vec<u8>> for BoundedBytes<MAX> {
    type Error = ProtocolError;

    fn try_from(data: Vec<u8>) -> Result<Self, Self::Error> {
        Self::new(data)
    }
}

/// Transceiver configuration captured by the radio init command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadioConfig {
    /// SPI bus the transceiver is wired to.
    pub spi_bus: u8,
    /// Chip select on that bus.
    pub spi_device: u8,
    /// Fixed packet size in bytes (1..=32).
    pub packet_size: u8,
    /// Network address, used for read pipe 0 and the write pipe.
    pub address: Address,
    /// RF channel (0..=125).
    pub channel: u8,
}

impl RadioConfig {
    /// Check the values the transceiver cannot accept.
    pub fn validate(&self) -> Result<(), String> {
        if self.packet_size == 0 || self.packet_size > MAX_PACKET_SIZE {
            return Err(format!(
                "packet size {} outside 1..={}",
                self.packet_size, MAX_PACKET_SIZE
            ));
        }
        if self.channel > MAX_CHANNEL {
            return Err(format!("channel {} above {}", self.channel, MAX_CHANNEL));
        }
        Ok(())
    }
}

/// How the two bytes of an SPI transfer size are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SizeMode {
    /// `low | (high << 8)`, the value clients actually transmit.
    #[default]
    LittleEndian,
    /// `(low + high) << 8`, for peers built against older servers.
    Legacy,
}

impl SizeMode {
    /// Combine the two size bytes.
    pub fn combine(self, low: u8, high: u8) -> usize {
        match self {
            SizeMode::LittleEndian => u16::from_le_bytes([low, high]) as usize,
            SizeMode::Legacy => (low as usize + high as usize) << 8,
        }
    }
}

impl fmt::Display for SizeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeMode::LittleEndian => f.write_str("little-endian"),
            SizeMode::Legacy => f.write_str("legacy"),
        }
    }
}

impl std::str::FromStr for SizeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "little-endian" | "le" => Ok(SizeMode::LittleEndian),
            "legacy" => Ok(SizeMode::Legacy),
            other => Err(format!("unknown size mode '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_from_slice_rejects_wrong_length() {
        assert_eq!(
            Address::from_slice(&[1, 2, 3, 4]),
            Err(ProtocolError::MalformedAddress { len: 4 })
        );
        assert_eq!(
            Address::from_slice(&[1, 2, 3, 4, 5, 6]),
            Err(ProtocolError::MalformedAddress { len: 6 })
        );
        let addr = Address::from_slice(&[0xE7, 0xE7, 0xE7, 0xE7, 0xE7]).unwrap();
        assert_eq!(addr.to_string(), "E7:E7:E7:E7:E7");
    }

    #[test]
    fn test_timeout_native_bytes() {
        let t = Timeout::from_secs(0.25);
        assert_eq!(t.to_bytes(), 0.25f32.to_ne_bytes());
        assert_eq!(Timeout::from_bytes(t.to_bytes()), t);
    }

    #[test]
    fn test_timeout_duration_clamps() {
        assert_eq!(Timeout(0.0).as_duration(), Duration::ZERO);
        assert_eq!(Timeout(-1.5).as_duration(), Duration::ZERO);
        assert_eq!(Timeout(f32::NAN).as_duration(), Duration::ZERO);
        assert_eq!(Timeout(f32::INFINITY).as_duration(), Duration::MAX);
        assert_eq!(Timeout(0.5).as_duration(), Duration::from_millis(500));
    }

    #[test]
    fn test_radio_payload_boundary() {
        assert!(RadioPayload::new(vec![0u8; 255]).is_ok());
        assert_eq!(
            RadioPayload::new(vec![0u8; 256]),
            Err(ProtocolError::PayloadTooLong { max: 255, actual: 256 })
        );
        assert!(TransferData::new(vec![0u8; 65535]).is_ok());
        assert!(TransferData::new(vec![0u8; 65536]).is_err());
    }

    #[test]
    fn test_size_mode_combine() {
        assert_eq!(SizeMode::LittleEndian.combine(0x05, 0x00), 5);
        assert_eq!(SizeMode::LittleEndian.combine(0xFF, 0xFF), 65535);
        assert_eq!(SizeMode::LittleEndian.combine(0x00, 0x01), 256);
        // (5 + 0) << 8
        assert_eq!(SizeMode::Legacy.combine(0x05, 0x00), 1280);
        assert_eq!("legacy".parse::<SizeMode>(), Ok(SizeMode::Legacy));
    }

    #[test]
    fn test_radio_config_validate() {
        let mut config = RadioConfig {
            spi_bus: 0,
            spi_device: 0,
            packet_size: 32,
            address: Address::default(),
            channel: 125,
        };
        assert!(config.validate().is_ok());
        config.packet_size = 33;
        assert!(config.validate().is_err());
        config.packet_size = 0;
        assert!(config.validate().is_err());
        config.packet_size = 8;
        config.channel = 126;
        assert!(config.validate().is_err());
    }
}
