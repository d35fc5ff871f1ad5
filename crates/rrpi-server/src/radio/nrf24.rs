//! Register-level nRF24L01+ driver over an [`SpiTransport`].

use std::thread;
use std::time::{Duration, Instant};

use rrpi_protocol::{Address, RadioConfig};
use tracing::{debug, trace, warn};

use super::{RadioDevice, RadioMode};
use crate::bus::{SpiSettings, SpiTransport};
use crate::error::HardwareError;

// ============================================================================
// Registers and commands
// ============================================================================

const R_REGISTER: u8 = 0x00;
const W_REGISTER: u8 = 0x20;
const REGISTER_MASK: u8 = 0x1F;
const R_RX_PAYLOAD: u8 = 0x61;
const W_TX_PAYLOAD: u8 = 0xA0;
const FLUSH_TX: u8 = 0xE1;
const FLUSH_RX: u8 = 0xE2;
const NOP: u8 = 0xFF;

const CONFIG: u8 = 0x00;
const EN_AA: u8 = 0x01;
const EN_RXADDR: u8 = 0x02;
const SETUP_AW: u8 = 0x03;
const SETUP_RETR: u8 = 0x04;
const RF_CH: u8 = 0x05;
const RF_SETUP: u8 = 0x06;
const STATUS: u8 = 0x07;
const RX_ADDR_P0: u8 = 0x0A;
const TX_ADDR: u8 = 0x10;
const RX_PW_P0: u8 = 0x11;
const FIFO_STATUS: u8 = 0x17;

// CONFIG bits
const PRIM_RX: u8 = 0x01;
const PWR_UP: u8 = 0x02;
const CRCO: u8 = 0x04;
const EN_CRC: u8 = 0x08;

// STATUS bits
const RX_DR: u8 = 0x40;
const TX_DS: u8 = 0x20;
const MAX_RT: u8 = 0x10;

// FIFO_STATUS bits
const RX_EMPTY: u8 = 0x01;

const PIPE_COUNT: u8 = 6;

/// 5-byte addresses.
const SETUP_AW_5_BYTES: u8 = 0x03;
/// 750us retransmit delay, 15 retries.
const SETUP_RETR_DEFAULT: u8 = 0x2F;
/// 1 Mbps, 0 dBm.
const RF_SETUP_DEFAULT: u8 = 0x06;

/// Power-on register values restored by `reset`.
const RESET_VALUES: [(u8, u8); 7] = [
    (CONFIG, EN_CRC),
    (EN_AA, 0x3F),
    (EN_RXADDR, 0x03),
    (SETUP_AW, SETUP_AW_5_BYTES),
    (SETUP_RETR, 0x03),
    (RF_CH, 0x02),
    (RF_SETUP, 0x0E),
];

const SPI_SPEED_HZ: u32 = 8_000_000;
const POWER_UP_DELAY: Duration = Duration::from_millis(5);
const CE_PULSE: Duration = Duration::from_micros(15);
const TX_TIMEOUT: Duration = Duration::from_millis(100);
const STATUS_POLL_INTERVAL: Duration = Duration::from_micros(100);
const RX_POLL_INTERVAL: Duration = Duration::from_millis(1);

// ============================================================================
// Chip enable
// ============================================================================

/// Output pin driving the transceiver's CE line.
pub trait ChipEnable {
    /// Drive CE high or low.
    fn set(&mut self, high: bool) -> Result<(), HardwareError>;
}

/// For modules whose CE line is not under software control.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoChipEnable;

impl ChipEnable for NoChipEnable {
    fn set(&mut self, _high: bool) -> Result<(), HardwareError> {
        Ok(())
    }
}

// ============================================================================
// Driver
// ============================================================================

/// nRF24L01+ driver.
///
/// Payloads longer than the configured packet size are sent as several
/// packets; each packet is zero-padded to the packet size.
pub struct Nrf24<S, C = NoChipEnable> {
    spi: S,
    ce: C,
    packet_size: u8,
}

impl<S: SpiTransport> Nrf24<S, NoChipEnable> {
    /// Driver without CE control.
    pub fn new(spi: S) -> Self {
        Self::with_chip_enable(spi, NoChipEnable)
    }
}

impl<S: SpiTransport, C: ChipEnable> Nrf24<S, C> {
    /// Driver with a CE pin.
    pub fn with_chip_enable(spi: S, ce: C) -> Self {
        Nrf24 {
            spi,
            ce,
            packet_size: rrpi_protocol::MAX_PACKET_SIZE,
        }
    }

    /// Borrow the SPI transport.
    pub fn spi(&self) -> &S {
        &self.spi
    }

    fn command(&mut self, tx: &[u8]) -> Result<Vec<u8>, HardwareError> {
        let rx = self.spi.transfer(tx)?;
        if rx.len() != tx.len() {
            return Err(HardwareError::Device(format!(
                "short SPI transfer: {} of {} bytes",
                rx.len(),
                tx.len()
            )));
        }
        Ok(rx)
    }

    fn read_register(&mut self, reg: u8) -> Result<u8, HardwareError> {
        let rx = self.command(&[R_REGISTER | (reg & REGISTER_MASK), NOP])?;
        Ok(rx[1])
    }

    fn write_register(&mut self, reg: u8, value: u8) -> Result<(), HardwareError> {
        self.command(&[W_REGISTER | (reg & REGISTER_MASK), value])?;
        Ok(())
    }

    fn write_register_bytes(&mut self, reg: u8, value: &[u8]) -> Result<(), HardwareError> {
        let mut tx = Vec::with_capacity(value.len() + 1);
        tx.push(W_REGISTER | (reg & REGISTER_MASK));
        tx.extend_from_slice(value);
        self.command(&tx)?;
        Ok(())
    }

    fn update_register(&mut self, reg: u8, set: u8, clear: u8) -> Result<(), HardwareError> {
        let value = self.read_register(reg)?;
        self.write_register(reg, (value & !clear) | set)
    }

    fn status(&mut self) -> Result<u8, HardwareError> {
        Ok(self.command(&[NOP])?[0])
    }

    fn clear_status(&mut self) -> Result<(), HardwareError> {
        self.write_register(STATUS, RX_DR | TX_DS | MAX_RT)
    }

    fn rx_fifo_empty(&mut self) -> Result<bool, HardwareError> {
        Ok(self.read_register(FIFO_STATUS)? & RX_EMPTY != 0)
    }

    fn transmit_packet(&mut self, packet: &[u8]) -> Result<bool, HardwareError> {
        self.clear_status()?;
        let mut tx = Vec::with_capacity(self.packet_size as usize + 1);
        tx.push(W_TX_PAYLOAD);
        tx.extend_from_slice(packet);
        tx.resize(self.packet_size as usize + 1, 0);
        self.command(&tx)?;

        self.ce.set(true)?;
        thread::sleep(CE_PULSE);
        self.ce.set(false)?;

        let deadline = Instant::now() + TX_TIMEOUT;
        loop {
            let status = self.status()?;
            if status & TX_DS != 0 {
                self.clear_status()?;
                return Ok(true);
            }
            if status & MAX_RT != 0 {
                trace!("nrf24: max retransmits reached");
                break;
            }
            if Instant::now() >= deadline {
                warn!("nrf24: no transmit status within {:?}", TX_TIMEOUT);
                break;
            }
            thread::sleep(STATUS_POLL_INTERVAL);
        }
        self.command(&[FLUSH_TX])?;
        self.clear_status()?;
        Ok(false)
    }
}

impl<S: SpiTransport, C: ChipEnable> RadioDevice for Nrf24<S, C> {
    fn configure(&mut self, config: &RadioConfig) -> Result<(), HardwareError> {
        config.validate().map_err(HardwareError::InvalidArgument)?;
        self.spi.open(config.spi_bus, config.spi_device)?;
        self.spi.configure(&SpiSettings {
            mode: 0,
            bits_per_word: 8,
            max_speed_hz: SPI_SPEED_HZ,
        })?;
        self.ce.set(false)?;
        self.packet_size = config.packet_size;

        self.write_register(CONFIG, EN_CRC | CRCO)?;
        self.write_register(SETUP_AW, SETUP_AW_5_BYTES)?;
        self.write_register(SETUP_RETR, SETUP_RETR_DEFAULT)?;
        self.write_register(RF_SETUP, RF_SETUP_DEFAULT)?;
        self.write_register(RF_CH, config.channel)?;
        self.write_register(EN_AA, 0x3F)?;
        self.write_register(EN_RXADDR, 0x01)?;
        for pipe in 0..PIPE_COUNT {
            self.write_register(RX_PW_P0 + pipe, config.packet_size)?;
        }
        self.write_register_bytes(RX_ADDR_P0, config.address.as_bytes())?;
        self.write_register_bytes(TX_ADDR, config.address.as_bytes())?;
        self.clear_status()?;
        self.command(&[FLUSH_TX])?;
        self.command(&[FLUSH_RX])?;

        debug!(
            bus = config.spi_bus,
            device = config.spi_device,
            channel = config.channel,
            "nrf24: configured"
        );
        Ok(())
    }

    fn set_read_pipe_address(&mut self, pipe: u8, address: &Address) -> Result<(), HardwareError> {
        if pipe >= PIPE_COUNT {
            return Err(HardwareError::InvalidPipe(pipe));
        }
        let reg = RX_ADDR_P0 + pipe;
        if pipe < 2 {
            self.write_register_bytes(reg, address.as_bytes())?;
        } else {
            // Pipes 2-5 share the upper bytes with pipe 1
            self.write_register(reg, address.as_bytes()[0])?;
        }
        self.update_register(EN_RXADDR, 1 << pipe, 0)
    }

    fn set_write_pipe_address(&mut self, address: &Address) -> Result<(), HardwareError> {
        self.write_register_bytes(TX_ADDR, address.as_bytes())?;
        // Pipe 0 receives the auto-acknowledgements
        self.write_register_bytes(RX_ADDR_P0, address.as_bytes())
    }

    fn flush_tx(&mut self) -> Result<(), HardwareError> {
        self.command(&[FLUSH_TX])?;
        Ok(())
    }

    fn flush_rx(&mut self) -> Result<(), HardwareError> {
        self.command(&[FLUSH_RX])?;
        Ok(())
    }

    fn set_power(&mut self, on: bool) -> Result<(), HardwareError> {
        if on {
            self.update_register(CONFIG, PWR_UP, 0)?;
            thread::sleep(POWER_UP_DELAY);
        } else {
            self.ce.set(false)?;
            self.update_register(CONFIG, 0, PWR_UP)?;
        }
        Ok(())
    }

    fn set_mode(&mut self, mode: RadioMode) -> Result<(), HardwareError> {
        match mode {
            RadioMode::Rx => self.update_register(CONFIG, PRIM_RX, 0),
            RadioMode::Tx => {
                self.ce.set(false)?;
                self.update_register(CONFIG, 0, PRIM_RX)
            }
        }
    }

    fn reset(&mut self) -> Result<(), HardwareError> {
        self.ce.set(false)?;
        for (reg, value) in RESET_VALUES {
            self.write_register(reg, value)?;
        }
        self.clear_status()?;
        self.command(&[FLUSH_TX])?;
        self.command(&[FLUSH_RX])?;
        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> Result<bool, HardwareError> {
        if data.is_empty() {
            return self.transmit_packet(&[]);
        }
        let mut acked = true;
        for packet in data.chunks(self.packet_size as usize) {
            acked &= self.transmit_packet(packet)?;
        }
        Ok(acked)
    }

    fn receive(&mut self, count: usize) -> Result<Vec<u8>, HardwareError> {
        let mut data = Vec::with_capacity(count);
        while data.len() < count && !self.rx_fifo_empty()? {
            let mut tx = vec![NOP; self.packet_size as usize + 1];
            tx[0] = R_RX_PAYLOAD;
            let rx = self.command(&tx)?;
            data.extend_from_slice(&rx[1..]);
            self.write_register(STATUS, RX_DR)?;
        }
        data.truncate(count);
        Ok(data)
    }

    fn set_listening(&mut self, on: bool) -> Result<(), HardwareError> {
        self.ce.set(on)
    }

    fn poll(&mut self, timeout: Duration) -> Result<bool, HardwareError> {
        // No representable deadline means wait until data arrives
        let deadline = Instant::now().checked_add(timeout);
        loop {
            if !self.rx_fifo_empty()? {
                return Ok(true);
            }
            let wait = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(false);
                    }
                    RX_POLL_INTERVAL.min(deadline - now)
                }
                None => RX_POLL_INTERVAL,
            };
            thread::sleep(wait);
        }
    }

    fn close(&mut self) -> Result<(), HardwareError> {
        self.ce.set(false)?;
        self.update_register(CONFIG, 0, PWR_UP)?;
        self.spi.close()
    }
}
