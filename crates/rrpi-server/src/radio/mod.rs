//! nRF24 radio controller.
//!
//! The controller holds the per-session radio state (configuration, pipe
//! addresses, power, mode) and forwards each operation to a [`RadioDevice`].
//!
//! ## State machine
//!
//! ```text
//! Uninitialized --init--> Ready --close--> Closed --init--> Ready
//! ```
//!
//! Inside `Ready` the power, TX/RX mode and listening flags change freely.
//! Power is not checked before `send`/`receive`; issuing them while powered
//! down is the caller's mistake and simply yields no acknowledgement or data.

mod nrf24;
mod sim;

pub use nrf24::{ChipEnable, NoChipEnable, Nrf24};
pub use sim::SimRadio;

use std::collections::BTreeMap;
use std::time::Duration;

use rrpi_protocol::{Address, RadioConfig};
use tracing::{debug, trace};

use crate::error::{HandlerError, HandlerResult, HardwareError};

// ============================================================================
// Device
// ============================================================================

/// Transmit or receive mode of the transceiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioMode {
    /// Primary transmitter.
    Tx,
    /// Primary receiver.
    Rx,
}

/// Primitive operations of a packet radio transceiver.
pub trait RadioDevice {
    /// Bring the transceiver up with `config`, powered down in TX mode.
    fn configure(&mut self, config: &RadioConfig) -> Result<(), HardwareError>;

    /// Set the address a read pipe listens on.
    fn set_read_pipe_address(&mut self, pipe: u8, address: &Address) -> Result<(), HardwareError>;

    /// Set the destination address for transmissions.
    fn set_write_pipe_address(&mut self, address: &Address) -> Result<(), HardwareError>;

    /// Drop pending transmit packets.
    fn flush_tx(&mut self) -> Result<(), HardwareError>;

    /// Drop pending received packets.
    fn flush_rx(&mut self) -> Result<(), HardwareError>;

    /// Power the transceiver up or down.
    fn set_power(&mut self, on: bool) -> Result<(), HardwareError>;

    /// Select TX or RX mode.
    fn set_mode(&mut self, mode: RadioMode) -> Result<(), HardwareError>;

    /// Restore power-on register defaults.
    fn reset(&mut self) -> Result<(), HardwareError>;

    /// Transmit `data`; returns whether the receiver acknowledged it.
    fn send(&mut self, data: &[u8]) -> Result<bool, HardwareError>;

    /// Read up to `count` received bytes.
    fn receive(&mut self, count: usize) -> Result<Vec<u8>, HardwareError>;

    /// Start or stop listening (chip enable in RX mode).
    fn set_listening(&mut self, on: bool) -> Result<(), HardwareError>;

    /// Wait up to `timeout` for received data.
    fn poll(&mut self, timeout: Duration) -> Result<bool, HardwareError>;

    /// Power down and release the bus.
    fn close(&mut self) -> Result<(), HardwareError>;
}

impl<D: RadioDevice + ?Sized> RadioDevice for Box<D> {
    fn configure(&mut self, config: &RadioConfig) -> Result<(), HardwareError> {
        (**self).configure(config)
    }
    fn set_read_pipe_address(&mut self, pipe: u8, address: &Address) -> Result<(), HardwareError> {
        (**self).set_read_pipe_address(pipe, address)
    }
    fn set_write_pipe_address(&mut self, address: &Address) -> Result<(), HardwareError> {
        (**self).set_write_pipe_address(address)
    }
    fn flush_tx(&mut self) -> Result<(), HardwareError> {
        (**self).flush_tx()
    }
    fn flush_rx(&mut self) -> Result<(), HardwareError> {
        (**self).flush_rx()
    }
    fn set_power(&mut self, on: bool) -> Result<(), HardwareError> {
        (**self).set_power(on)
    }
    fn set_mode(&mut self, mode: RadioMode) -> Result<(), HardwareError> {
        (**self).set_mode(mode)
    }
    fn reset(&mut self) -> Result<(), HardwareError> {
        (**self).reset()
    }
    fn send(&mut self, data: &[u8]) -> Result<bool, HardwareError> {
        (**self).send(data)
    }
    fn receive(&mut self, count: usize) -> Result<Vec<u8>, HardwareError> {
        (**self).receive(count)
    }
    fn set_listening(&mut self, on: bool) -> Result<(), HardwareError> {
        (**self).set_listening(on)
    }
    fn poll(&mut self, timeout: Duration) -> Result<bool, HardwareError> {
        (**self).poll(timeout)
    }
    fn close(&mut self) -> Result<(), HardwareError> {
        (**self).close()
    }
}

// ============================================================================
// Controller
// ============================================================================

/// Lifecycle state of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioState {
    /// No init received yet.
    Uninitialized,
    /// Initialized; power/mode/listening flags are meaningful.
    Ready,
    /// Closed; a new init is required.
    Closed,
}

/// Stateful handler for the radio command family of one session.
pub struct RadioController<D> {
    device: D,
    state: RadioState,
    config: Option<RadioConfig>,
    read_pipes: BTreeMap<u8, Address>,
    write_address: Option<Address>,
    powered: bool,
    mode: RadioMode,
    listening: bool,
}

impl<D: RadioDevice> RadioController<D> {
    /// Create an uninitialized controller over `device`.
    pub fn new(device: D) -> Self {
        RadioController {
            device,
            state: RadioState::Uninitialized,
            config: None,
            read_pipes: BTreeMap::new(),
            write_address: None,
            powered: false,
            mode: RadioMode::Tx,
            listening: false,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RadioState {
        self.state
    }

    /// Configuration captured by init.
    pub fn config(&self) -> Option<&RadioConfig> {
        self.config.as_ref()
    }

    /// Whether the transceiver is powered up.
    pub fn is_powered(&self) -> bool {
        self.powered
    }

    /// Current TX/RX mode.
    pub fn mode(&self) -> RadioMode {
        self.mode
    }

    /// Whether the transceiver is listening.
    pub fn is_listening(&self) -> bool {
        self.listening
    }

    /// Address last set for a read pipe.
    pub fn read_pipe_address(&self, pipe: u8) -> Option<Address> {
        self.read_pipes.get(&pipe).copied()
    }

    /// Address last set for the write pipe.
    pub fn write_pipe_address(&self) -> Option<Address> {
        self.write_address
    }

    /// Borrow the device.
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Mutably borrow the device.
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    fn require_ready(&self) -> HandlerResult<()> {
        match self.state {
            RadioState::Ready => Ok(()),
            _ => Err(HandlerError::RadioNotInitialized),
        }
    }

    fn clear_transceiver_state(&mut self) {
        self.read_pipes.clear();
        self.write_address = None;
        self.powered = false;
        self.mode = RadioMode::Tx;
        self.listening = false;
    }

    /// Configure the transceiver. Valid before the first init or after close.
    pub fn init(&mut self, config: RadioConfig) -> HandlerResult<()> {
        if self.state == RadioState::Ready {
            return Err(HandlerError::RadioAlreadyInitialized);
        }
        config.validate().map_err(HandlerError::InvalidRadioConfig)?;
        self.device.configure(&config)?;

        self.clear_transceiver_state();
        self.read_pipes.insert(0, config.address);
        self.write_address = Some(config.address);
        self.config = Some(config);
        self.state = RadioState::Ready;
        debug!(
            bus = config.spi_bus,
            device = config.spi_device,
            packet_size = config.packet_size,
            address = %config.address,
            channel = config.channel,
            "NRF: init"
        );
        Ok(())
    }

    /// Power down, release the device and forget the configuration.
    pub fn close(&mut self) -> HandlerResult<()> {
        self.require_ready()?;
        self.state = RadioState::Closed;
        self.config = None;
        self.clear_transceiver_state();
        self.device.close()?;
        debug!("NRF: close");
        Ok(())
    }

    /// Set the address of a read pipe.
    pub fn set_read_pipe_address(&mut self, pipe: u8, address: Address) -> HandlerResult<()> {
        self.require_ready()?;
        self.device.set_read_pipe_address(pipe, &address)?;
        self.read_pipes.insert(pipe, address);
        debug!(pipe, address = %address, "NRF: set read pipe address");
        Ok(())
    }

    /// Set the write pipe address.
    pub fn set_write_pipe_address(&mut self, address: Address) -> HandlerResult<()> {
        self.require_ready()?;
        self.device.set_write_pipe_address(&address)?;
        self.write_address = Some(address);
        debug!(address = %address, "NRF: set write pipe address");
        Ok(())
    }

    /// Flush the transmit FIFO.
    pub fn flush_tx(&mut self) -> HandlerResult<()> {
        self.require_ready()?;
        self.device.flush_tx()?;
        Ok(())
    }

    /// Flush the receive FIFO.
    pub fn flush_rx(&mut self) -> HandlerResult<()> {
        self.require_ready()?;
        self.device.flush_rx()?;
        Ok(())
    }

    /// Power up.
    pub fn power_up(&mut self) -> HandlerResult<()> {
        self.require_ready()?;
        self.device.set_power(true)?;
        self.powered = true;
        Ok(())
    }

    /// Power down. Listening stops with it.
    pub fn power_down(&mut self) -> HandlerResult<()> {
        self.require_ready()?;
        self.device.set_power(false)?;
        self.powered = false;
        self.listening = false;
        Ok(())
    }

    /// Switch to transmit mode.
    pub fn switch_to_tx(&mut self) -> HandlerResult<()> {
        self.require_ready()?;
        self.device.set_mode(RadioMode::Tx)?;
        self.mode = RadioMode::Tx;
        Ok(())
    }

    /// Switch to receive mode.
    pub fn switch_to_rx(&mut self) -> HandlerResult<()> {
        self.require_ready()?;
        self.device.set_mode(RadioMode::Rx)?;
        self.mode = RadioMode::Rx;
        Ok(())
    }

    /// Restore transceiver defaults. The init configuration is kept.
    pub fn reset(&mut self) -> HandlerResult<()> {
        self.require_ready()?;
        self.device.reset()?;
        self.clear_transceiver_state();
        Ok(())
    }

    /// Transmit a packet; returns the acknowledgement flag.
    pub fn send(&mut self, data: &[u8]) -> HandlerResult<bool> {
        self.require_ready()?;
        let acked = self.device.send(data)?;
        trace!(size = data.len(), acked, "NRF: send");
        Ok(acked)
    }

    /// Read exactly `count` bytes; missing bytes are zero.
    pub fn receive(&mut self, count: u8) -> HandlerResult<Vec<u8>> {
        self.require_ready()?;
        let mut data = self.device.receive(count as usize)?;
        data.resize(count as usize, 0);
        trace!(count, "NRF: receive");
        Ok(data)
    }

    /// Start listening.
    pub fn start_listening(&mut self) -> HandlerResult<()> {
        self.require_ready()?;
        self.device.set_listening(true)?;
        self.listening = true;
        Ok(())
    }

    /// Stop listening.
    pub fn stop_listening(&mut self) -> HandlerResult<()> {
        self.require_ready()?;
        self.device.set_listening(false)?;
        self.listening = false;
        Ok(())
    }

    /// Wait up to `timeout` for incoming data.
    pub fn poll(&mut self, timeout: Duration) -> HandlerResult<bool> {
        self.require_ready()?;
        let available = self.device.poll(timeout)?;
        trace!(?timeout, available, "NRF: poll");
        Ok(available)
    }

    /// Transmit `data`, listen for up to `timeout`, and return an answer of
    /// exactly `data.len()` bytes (zero-filled when nothing arrived).
    ///
    /// Leaves the transceiver in RX mode, not listening, whether or not a
    /// step failed.
    pub fn send_and_receive(&mut self, data: &[u8], timeout: Duration) -> HandlerResult<Vec<u8>> {
        self.require_ready()?;

        let exchanged = self.exchange(data, timeout);
        let stopped = if self.listening {
            self.listening = false;
            self.device.set_listening(false).map_err(HandlerError::from)
        } else {
            Ok(())
        };
        let (acked, available, mut reply) = exchanged?;
        stopped?;

        trace!(size = data.len(), acked, available, "NRF: send and receive");
        reply.resize(data.len(), 0);
        Ok(reply)
    }

    /// Transmit, then listen once; listening is left on for the caller.
    fn exchange(&mut self, data: &[u8], timeout: Duration) -> HandlerResult<(bool, bool, Vec<u8>)> {
        self.device.set_mode(RadioMode::Tx)?;
        self.mode = RadioMode::Tx;
        let acked = self.device.send(data)?;

        self.device.set_mode(RadioMode::Rx)?;
        self.mode = RadioMode::Rx;
        self.device.set_listening(true)?;
        self.listening = true;

        let available = self.device.poll(timeout)?;
        let reply = if available {
            self.device.receive(data.len())?
        } else {
            Vec::new()
        };
        Ok((acked, available, reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RadioConfig {
        RadioConfig {
            spi_bus: 1,
            spi_device: 0,
            packet_size: 32,
            address: Address([0x01, 0x02, 0x03, 0x04, 0x05]),
            channel: 76,
        }
    }

    fn ready_controller() -> RadioController<SimRadio> {
        let mut radio = RadioController::new(SimRadio::new());
        radio.init(config()).unwrap();
        radio
    }

    #[test]
    fn test_commands_before_init_fail() {
        let mut radio = RadioController::new(SimRadio::new());
        assert_eq!(radio.state(), RadioState::Uninitialized);
        assert!(matches!(radio.power_up(), Err(HandlerError::RadioNotInitialized)));
        assert!(matches!(radio.send(&[1]), Err(HandlerError::RadioNotInitialized)));
        assert!(matches!(radio.close(), Err(HandlerError::RadioNotInitialized)));
    }

    #[test]
    fn test_init_power_up_send_with_scripted_ack() {
        let mut radio = RadioController::new(SimRadio::new());
        radio.device_mut().script_acks([true, false]);

        radio.init(config()).unwrap();
        assert_eq!(radio.state(), RadioState::Ready);
        assert_eq!(radio.config(), Some(&config()));

        radio.power_up().unwrap();
        assert!(radio.is_powered());

        assert!(radio.send(&[0xAA, 0xBB]).unwrap());
        assert!(!radio.send(&[0xAA, 0xBB]).unwrap());
        assert_eq!(radio.device().sent_packets()[0], vec![0xAA, 0xBB]);
    }

    #[test]
    fn test_double_init_rejected() {
        let mut radio = ready_controller();
        assert!(matches!(
            radio.init(config()),
            Err(HandlerError::RadioAlreadyInitialized)
        ));
    }

    #[test]
    fn test_close_then_reinit() {
        let mut radio = ready_controller();
        radio.close().unwrap();
        assert_eq!(radio.state(), RadioState::Closed);
        assert_eq!(radio.config(), None);
        assert!(matches!(radio.flush_rx(), Err(HandlerError::RadioNotInitialized)));

        radio.init(config()).unwrap();
        assert_eq!(radio.state(), RadioState::Ready);
    }

    #[test]
    fn test_read_pipe_address_read_back() {
        let mut radio = ready_controller();
        let addr = Address([0xC2, 0xC2, 0xC2, 0xC2, 0xC1]);
        radio.set_read_pipe_address(0, addr).unwrap();
        assert_eq!(radio.read_pipe_address(0), Some(addr));

        let tx = Address([0xE7; 5]);
        radio.set_write_pipe_address(tx).unwrap();
        assert_eq!(radio.write_pipe_address(), Some(tx));
    }

    #[test]
    fn test_invalid_pipe_is_reported_by_device() {
        let mut radio = ready_controller();
        let result = radio.set_read_pipe_address(6, Address([1; 5]));
        assert!(matches!(
            result,
            Err(HandlerError::Hardware(HardwareError::InvalidPipe(6)))
        ));
        assert_eq!(radio.read_pipe_address(6), None);
    }

    #[test]
    fn test_reset_keeps_config() {
        let mut radio = ready_controller();
        radio.power_up().unwrap();
        radio.switch_to_rx().unwrap();
        radio.start_listening().unwrap();

        radio.reset().unwrap();
        assert_eq!(radio.state(), RadioState::Ready);
        assert_eq!(radio.config(), Some(&config()));
        assert!(!radio.is_powered());
        assert!(!radio.is_listening());
        assert_eq!(radio.mode(), RadioMode::Tx);
        assert_eq!(radio.read_pipe_address(0), None);
    }

    #[test]
    fn test_receive_returns_exact_count() {
        let mut radio = ready_controller();
        radio.device_mut().inject(vec![9, 8, 7]);
        assert_eq!(radio.receive(5).unwrap(), vec![9, 8, 7, 0, 0]);
        assert_eq!(radio.receive(2).unwrap(), vec![0, 0]);
    }

    #[test]
    fn test_send_and_receive_length_matches_request() {
        let mut radio = ready_controller();
        radio.power_up().unwrap();

        // Nothing answers: zero timeout still yields a full-length reply
        let reply = radio.send_and_receive(&[1, 2, 3, 4], Duration::ZERO).unwrap();
        assert_eq!(reply, vec![0, 0, 0, 0]);
        assert_eq!(radio.mode(), RadioMode::Rx);
        assert!(!radio.is_listening());

        radio.device_mut().set_echo_peer(true);
        let reply = radio.send_and_receive(&[5, 6], Duration::ZERO).unwrap();
        assert_eq!(reply, vec![5, 6]);
    }

    #[test]
    fn test_send_and_receive_failure_stops_listening() {
        let mut radio = ready_controller();
        radio.power_up().unwrap();
        radio.device_mut().set_echo_peer(true);
        radio.device_mut().fail_next_receive("rx fifo read failed");

        let result = radio.send_and_receive(&[1, 2], Duration::ZERO);
        assert!(matches!(
            result,
            Err(HandlerError::Hardware(HardwareError::Device(_)))
        ));
        assert!(!radio.is_listening());
        assert!(!radio.device().is_listening());

        // The next exchange starts clean
        radio.flush_rx().unwrap();
        assert_eq!(radio.send_and_receive(&[3], Duration::ZERO).unwrap(), vec![3]);
    }

    #[test]
    fn test_init_rejects_out_of_range_config() {
        let mut radio = RadioController::new(SimRadio::new());
        let mut bad = config();
        bad.packet_size = 0;
        assert!(matches!(
            radio.init(bad),
            Err(HandlerError::InvalidRadioConfig(_))
        ));
        bad.packet_size = 33;
        assert!(radio.init(bad).is_err());
        bad = RadioConfig { channel: 126, ..config() };
        assert!(radio.init(bad).is_err());

        assert_eq!(radio.state(), RadioState::Uninitialized);
        assert_eq!(radio.device().config(), None);
        radio.init(config()).unwrap();
    }

    #[test]
    fn test_power_down_stops_listening() {
        let mut radio = ready_controller();
        radio.power_up().unwrap();
        radio.switch_to_rx().unwrap();
        radio.start_listening().unwrap();
        assert!(radio.device().is_listening());

        radio.power_down().unwrap();
        assert!(!radio.is_powered());
        assert!(!radio.is_listening());
    }
}
