//! In-memory radio for tests and hardware-less deployments.

use std::collections::VecDeque;
use std::time::Duration;

use rrpi_protocol::{Address, RadioConfig};

use super::{RadioDevice, RadioMode};
use crate::error::HardwareError;

/// Number of read pipes on the transceiver.
const PIPE_COUNT: usize = 6;

/// Simulated transceiver.
///
/// Acknowledgements come from a scripted queue, falling back to
/// `default_ack` when the queue is empty. With the echo peer enabled every
/// acknowledged packet is answered with a copy of itself, which lands in the
/// receive queue. `poll` never sleeps.
#[derive(Debug, Clone)]
pub struct SimRadio {
    config: Option<RadioConfig>,
    powered: bool,
    mode: RadioMode,
    listening: bool,
    read_pipes: [Option<Address>; PIPE_COUNT],
    write_address: Option<Address>,
    acks: VecDeque<bool>,
    default_ack: bool,
    echo_peer: bool,
    rx_queue: VecDeque<Vec<u8>>,
    sent: Vec<Vec<u8>>,
    receive_fault: Option<String>,
}

impl Default for SimRadio {
    fn default() -> Self {
        SimRadio {
            config: None,
            powered: false,
            mode: RadioMode::Tx,
            listening: false,
            read_pipes: [None; PIPE_COUNT],
            write_address: None,
            acks: VecDeque::new(),
            default_ack: true,
            echo_peer: false,
            rx_queue: VecDeque::new(),
            sent: Vec::new(),
            receive_fault: None,
        }
    }
}

impl SimRadio {
    /// Create a simulated radio that acknowledges every packet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue acknowledgement results for the next transmissions.
    pub fn script_acks(&mut self, acks: impl IntoIterator<Item = bool>) {
        self.acks.extend(acks);
    }

    /// Acknowledgement used once the scripted queue is empty.
    pub fn set_default_ack(&mut self, ack: bool) {
        self.default_ack = ack;
    }

    /// Answer every acknowledged packet with a copy of itself.
    pub fn set_echo_peer(&mut self, enabled: bool) {
        self.echo_peer = enabled;
    }

    /// Place a packet in the receive queue.
    pub fn inject(&mut self, packet: Vec<u8>) {
        self.rx_queue.push_back(packet);
    }

    /// Make the next `receive` fail with a device error.
    pub fn fail_next_receive(&mut self, reason: impl Into<String>) {
        self.receive_fault = Some(reason.into());
    }

    /// Packets transmitted so far, in order.
    pub fn sent_packets(&self) -> &[Vec<u8>] {
        &self.sent
    }

    /// Packets waiting to be received.
    pub fn pending(&self) -> usize {
        self.rx_queue.len()
    }

    /// Configuration applied by the last `configure`.
    pub fn config(&self) -> Option<&RadioConfig> {
        self.config.as_ref()
    }

    /// Whether the transceiver is powered.
    pub fn is_powered(&self) -> bool {
        self.powered
    }

    /// Current mode.
    pub fn mode(&self) -> RadioMode {
        self.mode
    }

    /// Whether chip enable is held in RX mode.
    pub fn is_listening(&self) -> bool {
        self.listening
    }

    /// Address of a read pipe.
    pub fn read_pipe(&self, pipe: u8) -> Option<Address> {
        self.read_pipes.get(pipe as usize).copied().flatten()
    }

    /// Transmit address.
    pub fn write_address(&self) -> Option<Address> {
        self.write_address
    }

    fn power_on_defaults(&mut self) {
        self.powered = false;
        self.mode = RadioMode::Tx;
        self.listening = false;
        self.read_pipes = [None; PIPE_COUNT];
        self.write_address = None;
        self.rx_queue.clear();
    }
}

impl RadioDevice for SimRadio {
    fn configure(&mut self, config: &RadioConfig) -> Result<(), HardwareError> {
        self.power_on_defaults();
        self.read_pipes[0] = Some(config.address);
        self.write_address = Some(config.address);
        self.config = Some(*config);
        Ok(())
    }

    fn set_read_pipe_address(&mut self, pipe: u8, address: &Address) -> Result<(), HardwareError> {
        let slot = self
            .read_pipes
            .get_mut(pipe as usize)
            .ok_or(HardwareError::InvalidPipe(pipe))?;
        *slot = Some(*address);
        Ok(())
    }

    fn set_write_pipe_address(&mut self, address: &Address) -> Result<(), HardwareError> {
        self.write_address = Some(*address);
        Ok(())
    }

    fn flush_tx(&mut self) -> Result<(), HardwareError> {
        Ok(())
    }

    fn flush_rx(&mut self) -> Result<(), HardwareError> {
        self.rx_queue.clear();
        Ok(())
    }

    fn set_power(&mut self, on: bool) -> Result<(), HardwareError> {
        self.powered = on;
        if !on {
            self.listening = false;
        }
        Ok(())
    }

    fn set_mode(&mut self, mode: RadioMode) -> Result<(), HardwareError> {
        self.mode = mode;
        Ok(())
    }

    fn reset(&mut self) -> Result<(), HardwareError> {
        self.power_on_defaults();
        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> Result<bool, HardwareError> {
        // A powered-down or receiving transceiver puts nothing on the air
        if !self.powered || self.mode != RadioMode::Tx {
            return Ok(false);
        }
        self.sent.push(data.to_vec());
        let acked = self.acks.pop_front().unwrap_or(self.default_ack);
        if acked && self.echo_peer {
            self.rx_queue.push_back(data.to_vec());
        }
        Ok(acked)
    }

    fn receive(&mut self, count: usize) -> Result<Vec<u8>, HardwareError> {
        if let Some(reason) = self.receive_fault.take() {
            return Err(HardwareError::Device(reason));
        }
        let mut data = self.rx_queue.pop_front().unwrap_or_default();
        data.truncate(count);
        Ok(data)
    }

    fn set_listening(&mut self, on: bool) -> Result<(), HardwareError> {
        self.listening = on && self.mode == RadioMode::Rx;
        Ok(())
    }

    fn poll(&mut self, _timeout: Duration) -> Result<bool, HardwareError> {
        Ok(!self.rx_queue.is_empty())
    }

    fn close(&mut self) -> Result<(), HardwareError> {
        self.power_on_defaults();
        self.config = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RadioConfig {
        RadioConfig {
            spi_bus: 0,
            spi_device: 0,
            packet_size: 8,
            address: Address([0xE7; 5]),
            channel: 2,
        }
    }

    #[test]
    fn test_send_requires_power_and_tx_mode() {
        let mut radio = SimRadio::new();
        radio.configure(&config()).unwrap();
        assert!(!radio.send(&[1]).unwrap());

        radio.set_power(true).unwrap();
        radio.set_mode(RadioMode::Rx).unwrap();
        assert!(!radio.send(&[1]).unwrap());

        radio.set_mode(RadioMode::Tx).unwrap();
        assert!(radio.send(&[1]).unwrap());
        assert_eq!(radio.sent_packets(), &[vec![1]]);
    }

    #[test]
    fn test_scripted_acks_then_default() {
        let mut radio = SimRadio::new();
        radio.configure(&config()).unwrap();
        radio.set_power(true).unwrap();
        radio.script_acks([false, true]);
        radio.set_default_ack(false);

        assert!(!radio.send(&[1]).unwrap());
        assert!(radio.send(&[2]).unwrap());
        assert!(!radio.send(&[3]).unwrap());
    }

    #[test]
    fn test_echo_peer_fills_rx_queue() {
        let mut radio = SimRadio::new();
        radio.configure(&config()).unwrap();
        radio.set_power(true).unwrap();
        radio.set_echo_peer(true);

        radio.send(&[1, 2, 3]).unwrap();
        assert_eq!(radio.pending(), 1);
        assert!(radio.poll(Duration::ZERO).unwrap());
        assert_eq!(radio.receive(2).unwrap(), vec![1, 2]);
        assert!(!radio.poll(Duration::ZERO).unwrap());
    }

    #[test]
    fn test_pipe_range() {
        let mut radio = SimRadio::new();
        for pipe in 0..6 {
            radio.set_read_pipe_address(pipe, &Address([pipe; 5])).unwrap();
        }
        assert_eq!(radio.read_pipe(5), Some(Address([5; 5])));
        assert!(matches!(
            radio.set_read_pipe_address(6, &Address([0; 5])),
            Err(HardwareError::InvalidPipe(6))
        ));
    }

    #[test]
    fn test_listening_only_in_rx_mode() {
        let mut radio = SimRadio::new();
        radio.set_listening(true).unwrap();
        assert!(!radio.is_listening());
        radio.set_mode(RadioMode::Rx).unwrap();
        radio.set_listening(true).unwrap();
        assert!(radio.is_listening());
    }
}
