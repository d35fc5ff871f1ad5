//! SPI bus bridge.
//!
//! The bridge forwards open/transfer/close to a [`SpiTransport`], keeping
//! track of which bus/device pair is selected and the transfer settings
//! that `close` resets.

use tracing::{debug, trace};

use crate::error::{HandlerError, HandlerResult, HardwareError};

pub use rrpi_protocol::{SPI_3WIRE, SPI_CPHA, SPI_CPOL, SPI_CS_HIGH, SPI_LOOP, SPI_LSB_FIRST};

// ============================================================================
// Transport
// ============================================================================

/// Low-level access to an SPI bus.
///
/// Implementations talk to real hardware or simulate it. The radio driver
/// uses the same trait to reach the transceiver's registers.
pub trait SpiTransport {
    /// Select `bus`/`device` for subsequent transfers.
    fn open(&mut self, bus: u8, device: u8) -> Result<(), HardwareError>;

    /// Apply transfer settings to the open device.
    fn configure(&mut self, settings: &SpiSettings) -> Result<(), HardwareError>;

    /// Clock out `tx` and return the bytes clocked in, same length.
    fn transfer(&mut self, tx: &[u8]) -> Result<Vec<u8>, HardwareError>;

    /// Release the device.
    fn close(&mut self) -> Result<(), HardwareError>;
}

impl<T: SpiTransport + ?Sized> SpiTransport for Box<T> {
    fn open(&mut self, bus: u8, device: u8) -> Result<(), HardwareError> {
        (**self).open(bus, device)
    }

    fn configure(&mut self, settings: &SpiSettings) -> Result<(), HardwareError> {
        (**self).configure(settings)
    }

    fn transfer(&mut self, tx: &[u8]) -> Result<Vec<u8>, HardwareError> {
        (**self).transfer(tx)
    }

    fn close(&mut self) -> Result<(), HardwareError> {
        (**self).close()
    }
}

/// Transfer settings of an open SPI device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpiSettings {
    /// Mode bits (`SPI_CPHA`, `SPI_CPOL`, `SPI_CS_HIGH`, ...).
    pub mode: u8,
    /// Word size; 8 unless the device needs otherwise.
    pub bits_per_word: u8,
    /// Clock speed in Hz, 0 for the driver default.
    pub max_speed_hz: u32,
}

impl Default for SpiSettings {
    fn default() -> Self {
        SpiSettings {
            mode: 0,
            bits_per_word: 8,
            max_speed_hz: 0,
        }
    }
}

// ============================================================================
// Bridge
// ============================================================================

/// Executes the SPI command family for one session.
pub struct BusBridge<T> {
    transport: T,
    selected: Option<(u8, u8)>,
    settings: SpiSettings,
}

impl<T: SpiTransport> BusBridge<T> {
    /// Create a bridge over `transport`; nothing is opened yet.
    pub fn new(transport: T) -> Self {
        BusBridge {
            transport,
            selected: None,
            settings: SpiSettings::default(),
        }
    }

    /// The bus/device pair currently selected.
    pub fn selected(&self) -> Option<(u8, u8)> {
        self.selected
    }

    /// Current transfer settings.
    pub fn settings(&self) -> &SpiSettings {
        &self.settings
    }

    /// Change the transfer settings of the open device. No wire command
    /// reaches this; tests use it to check that `close` resets settings.
    #[cfg(test)]
    pub(crate) fn set_settings(&mut self, settings: SpiSettings) -> HandlerResult<()> {
        if self.selected.is_none() {
            return Err(HandlerError::BusNotOpen);
        }
        self.transport.configure(&settings)?;
        self.settings = settings;
        Ok(())
    }

    /// Select a bus/device pair.
    ///
    /// Opening the pair that is already open does nothing; opening a
    /// different pair releases the previous one first.
    pub fn open(&mut self, bus: u8, device: u8) -> HandlerResult<()> {
        match self.selected {
            Some(current) if current == (bus, device) => {
                trace!(bus, device, "SPI already open");
                return Ok(());
            }
            Some((old_bus, old_device)) => {
                debug!(old_bus, old_device, "SPI: switching device");
                self.transport.close()?;
                self.selected = None;
            }
            None => {}
        }

        self.transport.open(bus, device)?;
        self.transport.configure(&self.settings)?;
        self.selected = Some((bus, device));
        debug!(bus, device, "SPI: open");
        Ok(())
    }

    /// Full-duplex transfer. The result always has the same length as `data`.
    pub fn transfer(&mut self, data: &[u8]) -> HandlerResult<Vec<u8>> {
        if self.selected.is_none() {
            return Err(HandlerError::BusNotOpen);
        }
        let mut rx = self.transport.transfer(data)?;
        if rx.len() != data.len() {
            debug!(
                expected = data.len(),
                actual = rx.len(),
                "SPI: transport returned short transfer, padding"
            );
            rx.resize(data.len(), 0);
        }
        trace!(size = data.len(), "SPI: xfer");
        Ok(rx)
    }

    /// Reset transfer settings to defaults and release the bus.
    pub fn close(&mut self) -> HandlerResult<()> {
        self.settings = SpiSettings::default();
        if self.selected.take().is_none() {
            return Err(HandlerError::BusNotOpen);
        }
        self.transport.close()?;
        debug!("SPI: close");
        Ok(())
    }

    /// Borrow the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }
}

// ============================================================================
// Loopback transport
// ============================================================================

/// Transport that echoes every transfer back, as if MISO were wired to MOSI.
#[derive(Debug, Default)]
pub struct LoopbackSpi {
    open: Option<(u8, u8)>,
    settings: SpiSettings,
    transfers: u64,
}

impl LoopbackSpi {
    /// Create a closed loopback transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// The pair selected on the transport.
    pub fn open_device(&self) -> Option<(u8, u8)> {
        self.open
    }

    /// Settings last applied.
    pub fn settings(&self) -> &SpiSettings {
        &self.settings
    }

    /// Number of transfers performed.
    pub fn transfers(&self) -> u64 {
        self.transfers
    }
}

impl SpiTransport for LoopbackSpi {
    fn open(&mut self, bus: u8, device: u8) -> Result<(), HardwareError> {
        self.open = Some((bus, device));
        Ok(())
    }

    fn configure(&mut self, settings: &SpiSettings) -> Result<(), HardwareError> {
        self.settings = *settings;
        Ok(())
    }

    fn transfer(&mut self, tx: &[u8]) -> Result<Vec<u8>, HardwareError> {
        if self.open.is_none() {
            return Err(HardwareError::Device("loopback device not open".to_string()));
        }
        self.transfers += 1;
        Ok(tx.to_vec())
    }

    fn close(&mut self) -> Result<(), HardwareError> {
        self.open = None;
        self.settings = SpiSettings::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Transport that returns fewer bytes than requested.
    struct ShortSpi;

    impl SpiTransport for ShortSpi {
        fn open(&mut self, _bus: u8, _device: u8) -> Result<(), HardwareError> {
            Ok(())
        }
        fn configure(&mut self, _settings: &SpiSettings) -> Result<(), HardwareError> {
            Ok(())
        }
        fn transfer(&mut self, tx: &[u8]) -> Result<Vec<u8>, HardwareError> {
            Ok(vec![0xFF; tx.len() / 2])
        }
        fn close(&mut self) -> Result<(), HardwareError> {
            Ok(())
        }
    }

    #[test]
    fn test_transfer_requires_open() {
        let mut bridge = BusBridge::new(LoopbackSpi::new());
        assert!(matches!(bridge.transfer(&[1, 2, 3]), Err(HandlerError::BusNotOpen)));
    }

    #[test]
    fn test_transfer_returns_same_length() {
        let mut bridge = BusBridge::new(LoopbackSpi::new());
        bridge.open(0, 0).unwrap();

        assert_eq!(bridge.transfer(&[]).unwrap(), Vec::<u8>::new());
        let big: Vec<u8> = (0..65535).map(|i| (i % 251) as u8).collect();
        let rx = bridge.transfer(&big).unwrap();
        assert_eq!(rx.len(), 65535);
        assert_eq!(rx, big);
    }

    #[test]
    fn test_short_transport_reply_is_padded() {
        let mut bridge = BusBridge::new(ShortSpi);
        bridge.open(0, 1).unwrap();
        let rx = bridge.transfer(&[0u8; 10]).unwrap();
        assert_eq!(rx.len(), 10);
        assert_eq!(&rx[5..], &[0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_open_is_idempotent() {
        let mut bridge = BusBridge::new(LoopbackSpi::new());
        bridge.open(1, 2).unwrap();
        bridge.open(1, 2).unwrap();
        assert_eq!(bridge.selected(), Some((1, 2)));
        assert_eq!(bridge.transport().open_device(), Some((1, 2)));

        bridge.open(0, 0).unwrap();
        assert_eq!(bridge.selected(), Some((0, 0)));
        assert_eq!(bridge.transport().open_device(), Some((0, 0)));
    }

    #[test]
    fn test_close_resets_settings() {
        let mut bridge = BusBridge::new(LoopbackSpi::new());
        bridge.open(0, 0).unwrap();
        bridge
            .set_settings(SpiSettings {
                mode: SPI_CPOL | SPI_CPHA | SPI_CS_HIGH,
                bits_per_word: 16,
                max_speed_hz: 8_000_000,
            })
            .unwrap();
        assert_eq!(bridge.transport().settings().bits_per_word, 16);

        bridge.close().unwrap();
        assert_eq!(*bridge.settings(), SpiSettings::default());
        assert_eq!(bridge.selected(), None);
        assert_eq!(bridge.transport().open_device(), None);
        assert!(matches!(bridge.close(), Err(HandlerError::BusNotOpen)));
    }
}
