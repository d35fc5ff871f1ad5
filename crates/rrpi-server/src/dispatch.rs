//! Routes decoded commands to the bus bridge and radio controller.

use rrpi_protocol::{Command, Reply};
use tracing::trace;

use crate::bus::{BusBridge, SpiTransport};
use crate::error::HandlerResult;
use crate::radio::{RadioController, RadioDevice};

/// Per-session handler state: one bus bridge and one radio controller.
pub struct Dispatcher<T, D> {
    bus: BusBridge<T>,
    radio: RadioController<D>,
}

impl<T: SpiTransport, D: RadioDevice> Dispatcher<T, D> {
    /// Create a dispatcher over the given hardware.
    pub fn new(transport: T, radio: D) -> Self {
        Dispatcher {
            bus: BusBridge::new(transport),
            radio: RadioController::new(radio),
        }
    }

    /// The SPI bridge.
    pub fn bus(&self) -> &BusBridge<T> {
        &self.bus
    }

    /// The radio controller.
    pub fn radio(&self) -> &RadioController<D> {
        &self.radio
    }

    /// Mutable access to the radio controller.
    pub fn radio_mut(&mut self) -> &mut RadioController<D> {
        &mut self.radio
    }

    /// Execute one command and produce its reply, if the command has one.
    pub fn execute(&mut self, command: Command) -> HandlerResult<Option<Reply>> {
        trace!(opcode = command.opcode().name(), "dispatch");
        let reply = match command {
            Command::SpiOpen { bus, device } => {
                self.bus.open(bus, device)?;
                None
            }
            Command::SpiTransfer { data } => Some(Reply::Bytes(self.bus.transfer(&data)?)),
            Command::SpiClose => {
                self.bus.close()?;
                None
            }

            Command::RadioInit(config) => {
                self.radio.init(config)?;
                None
            }
            Command::RadioClose => {
                self.radio.close()?;
                None
            }
            Command::RadioSetReadPipeAddress { pipe, address } => {
                self.radio.set_read_pipe_address(pipe, address)?;
                None
            }
            Command::RadioSetWritePipeAddress { address } => {
                self.radio.set_write_pipe_address(address)?;
                None
            }
            // Reserved on the wire: no reply bytes are defined
            Command::RadioGetReadPipeAddress | Command::RadioGetWritePipeAddress => None,
            Command::RadioFlushTx => {
                self.radio.flush_tx()?;
                None
            }
            Command::RadioFlushRx => {
                self.radio.flush_rx()?;
                None
            }
            Command::RadioPowerUp => {
                self.radio.power_up()?;
                None
            }
            Command::RadioPowerDown => {
                self.radio.power_down()?;
                None
            }
            Command::RadioSwitchToTx => {
                self.radio.switch_to_tx()?;
                None
            }
            Command::RadioSwitchToRx => {
                self.radio.switch_to_rx()?;
                None
            }
            Command::RadioReset => {
                self.radio.reset()?;
                None
            }
            Command::RadioSend { data } => Some(Reply::Bool(self.radio.send(&data)?)),
            Command::RadioReceive { count } => Some(Reply::Bytes(self.radio.receive(count)?)),
            Command::RadioStartListening => {
                self.radio.start_listening()?;
                None
            }
            Command::RadioStopListening => {
                self.radio.stop_listening()?;
                None
            }
            Command::RadioPoll { timeout } => {
                Some(Reply::Bool(self.radio.poll(timeout.as_duration())?))
            }
            Command::RadioSendAndReceive { data, timeout } => Some(Reply::Bytes(
                self.radio.send_and_receive(&data, timeout.as_duration())?,
            )),
        };
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::LoopbackSpi;
    use crate::error::HandlerError;
    use crate::radio::{RadioState, SimRadio};
    use rrpi_protocol::{Address, RadioConfig, RadioPayload, Timeout, TransferData};

    fn dispatcher() -> Dispatcher<LoopbackSpi, SimRadio> {
        Dispatcher::new(LoopbackSpi::new(), SimRadio::new())
    }

    fn init() -> Command {
        Command::RadioInit(RadioConfig {
            spi_bus: 0,
            spi_device: 0,
            packet_size: 32,
            address: Address([0xE7; 5]),
            channel: 76,
        })
    }

    #[test]
    fn test_spi_round_trip() {
        let mut d = dispatcher();
        assert_eq!(d.execute(Command::SpiOpen { bus: 0, device: 1 }).unwrap(), None);
        let reply = d
            .execute(Command::SpiTransfer {
                data: TransferData::new(vec![1, 2, 3]).unwrap(),
            })
            .unwrap();
        assert_eq!(reply, Some(Reply::Bytes(vec![1, 2, 3])));
        assert_eq!(d.execute(Command::SpiClose).unwrap(), None);
        assert_eq!(d.bus().selected(), None);
    }

    #[test]
    fn test_radio_send_reply_is_bool() {
        let mut d = dispatcher();
        d.radio_mut().device_mut().script_acks([true]);
        d.execute(init()).unwrap();
        d.execute(Command::RadioPowerUp).unwrap();
        let reply = d
            .execute(Command::RadioSend {
                data: RadioPayload::new(vec![0xAA, 0xBB]).unwrap(),
            })
            .unwrap();
        assert_eq!(reply, Some(Reply::Bool(true)));
    }

    #[test]
    fn test_reserved_getters_are_noops() {
        let mut d = dispatcher();
        assert_eq!(d.execute(Command::RadioGetReadPipeAddress).unwrap(), None);
        assert_eq!(d.execute(Command::RadioGetWritePipeAddress).unwrap(), None);
        assert_eq!(d.radio().state(), RadioState::Uninitialized);
    }

    #[test]
    fn test_handler_errors_propagate() {
        let mut d = dispatcher();
        assert!(matches!(
            d.execute(Command::RadioPoll { timeout: Timeout(0.0) }),
            Err(HandlerError::RadioNotInitialized)
        ));
        assert!(matches!(
            d.execute(Command::SpiTransfer {
                data: TransferData::new(vec![0]).unwrap()
            }),
            Err(HandlerError::BusNotOpen)
        ));
    }

    #[test]
    fn test_send_and_receive_reply_length() {
        let mut d = dispatcher();
        d.execute(init()).unwrap();
        d.execute(Command::RadioPowerUp).unwrap();
        let reply = d
            .execute(Command::RadioSendAndReceive {
                data: RadioPayload::new(vec![1; 10]).unwrap(),
                timeout: Timeout(0.0),
            })
            .unwrap();
        assert_eq!(reply, Some(Reply::Bytes(vec![0; 10])));
    }
}
