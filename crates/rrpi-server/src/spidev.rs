//! Linux spidev transport (`/dev/spidev<bus>.<device>`).

use ::spidev::{SpiModeFlags, Spidev, SpidevOptions, SpidevTransfer};
use tracing::debug;

use crate::bus::{SpiSettings, SpiTransport};
use crate::error::HardwareError;

/// The kernel driver's default transfer buffer size.
const SPIDEV_BUFSIZ: usize = 4096;

/// SPI transport backed by the kernel's spidev driver.
#[derive(Default)]
pub struct SpidevTransport {
    device: Option<Spidev>,
}

impl SpidevTransport {
    /// Create a closed transport.
    pub fn new() -> Self {
        Self::default()
    }

    fn device(&mut self) -> Result<&mut Spidev, HardwareError> {
        self.device
            .as_mut()
            .ok_or_else(|| HardwareError::Device("spidev not open".to_string()))
    }
}

impl SpiTransport for SpidevTransport {
    fn open(&mut self, bus: u8, device: u8) -> Result<(), HardwareError> {
        let path = format!("/dev/spidev{}.{}", bus, device);
        debug!(%path, "opening spidev");
        self.device = Some(Spidev::open(&path)?);
        Ok(())
    }

    fn configure(&mut self, settings: &SpiSettings) -> Result<(), HardwareError> {
        let mut options = SpidevOptions::new();
        options
            .bits_per_word(settings.bits_per_word)
            .mode(SpiModeFlags::from_bits_truncate(settings.mode as u32));
        if settings.max_speed_hz > 0 {
            options.max_speed_hz(settings.max_speed_hz);
        }
        self.device()?.configure(&options.build())?;
        Ok(())
    }

    fn transfer(&mut self, tx: &[u8]) -> Result<Vec<u8>, HardwareError> {
        let spi = self.device()?;
        let mut rx = vec![0u8; tx.len()];
        // Chip select is released between chunks
        for (tx_chunk, rx_chunk) in tx.chunks(SPIDEV_BUFSIZ).zip(rx.chunks_mut(SPIDEV_BUFSIZ)) {
            let mut transfer = SpidevTransfer::read_write(tx_chunk, rx_chunk);
            spi.transfer(&mut transfer)?;
        }
        Ok(rx)
    }

    fn close(&mut self) -> Result<(), HardwareError> {
        self.device = None;
        Ok(())
    }
}
