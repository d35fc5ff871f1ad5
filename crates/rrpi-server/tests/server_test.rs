//! End-to-end tests: real TCP listener on an ephemeral port, driven by the
//! client stubs.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use rrpi_client::{Address, ClientConfig, Nrf24, RadioConfig, SpiDev};
use rrpi_protocol::SizeMode;
use rrpi_server::config::{BoxedRadio, BoxedTransport};
use rrpi_server::{Hardware, Listener, ListenerHandle, LoopbackSpi, SimRadio, SimulatedHardware};

/// Simulated hardware whose radio acknowledges according to a script.
struct ScriptedHardware {
    acks: Vec<bool>,
}

impl Hardware for ScriptedHardware {
    fn spi(&self) -> BoxedTransport {
        Box::new(LoopbackSpi::new())
    }

    fn radio(&self) -> BoxedRadio {
        let mut radio = SimRadio::new();
        radio.script_acks(self.acks.iter().copied());
        radio.set_default_ack(false);
        Box::new(radio)
    }
}

fn start(hardware: Arc<dyn Hardware>, size_mode: SizeMode) -> ListenerHandle {
    Listener::bind_with("127.0.0.1:0".parse().unwrap(), hardware, size_mode)
        .unwrap()
        .spawn()
        .unwrap()
}

fn client_config(server: &ListenerHandle) -> ClientConfig {
    ClientConfig::new("127.0.0.1").with_port(server.local_addr().port())
}

fn radio_config() -> RadioConfig {
    RadioConfig {
        spi_bus: 1,
        spi_device: 0,
        packet_size: 32,
        address: Address([1, 2, 3, 4, 5]),
        channel: 76,
    }
}

#[test]
fn test_spi_loopback_over_tcp() {
    let server = start(Arc::new(SimulatedHardware), SizeMode::LittleEndian);
    let mut spi = SpiDev::connect(&client_config(&server)).unwrap();

    spi.open(0, 0).unwrap();
    assert_eq!(spi.xfer(b"Hello").unwrap(), b"Hello".to_vec());
    assert_eq!(spi.xfer(&[]).unwrap(), Vec::<u8>::new());

    let big: Vec<u8> = (0..65535u32).map(|i| (i % 256) as u8).collect();
    assert_eq!(spi.xfer(&big).unwrap(), big);
    spi.close().unwrap();

    server.shutdown();
}

#[test]
fn test_radio_init_power_up_send_scripted_ack() {
    let server = start(
        Arc::new(ScriptedHardware {
            acks: vec![true, false],
        }),
        SizeMode::LittleEndian,
    );
    let mut radio = Nrf24::connect(&client_config(&server)).unwrap();

    radio.init(radio_config()).unwrap();
    radio.power_up().unwrap();
    assert!(radio.send(&[0xAA, 0xBB]).unwrap());
    assert!(!radio.send(&[0xAA, 0xBB]).unwrap());

    assert_eq!(radio.receive(4).unwrap(), vec![0, 0, 0, 0]);
    assert!(!radio.poll(0.0).unwrap());
    assert_eq!(radio.send_and_receive(&[7; 16], 0.0).unwrap(), vec![0; 16]);
    radio.close().unwrap();

    server.shutdown();
}

#[test]
fn test_simulated_echo_peer() {
    let server = start(Arc::new(SimulatedHardware), SizeMode::LittleEndian);
    let mut radio = Nrf24::connect(&client_config(&server)).unwrap();

    radio.init(radio_config()).unwrap();
    radio.power_up().unwrap();
    radio
        .set_read_pipe_address(1, Address([0xC2; 5]))
        .unwrap();
    assert_eq!(radio.send_and_receive(b"ping", 0.1).unwrap(), b"ping".to_vec());

    server.shutdown();
}

#[test]
fn test_commands_before_init_get_filler_replies() {
    let server = start(Arc::new(SimulatedHardware), SizeMode::LittleEndian);
    let mut radio = Nrf24::connect(&client_config(&server)).unwrap();

    assert!(!radio.send(&[1, 2, 3]).unwrap());
    assert_eq!(radio.receive(3).unwrap(), vec![0, 0, 0]);

    // The session is still usable afterwards
    radio.init(radio_config()).unwrap();
    radio.power_up().unwrap();
    assert!(radio.send(&[1]).unwrap());

    server.shutdown();
}

#[test]
fn test_unknown_opcode_closes_session_listener_keeps_accepting() {
    let server = start(Arc::new(SimulatedHardware), SizeMode::LittleEndian);
    let addr = server.local_addr();

    let mut raw = TcpStream::connect(addr).unwrap();
    raw.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    raw.write_all(&[0xFF, 0x23, 1, 0, 9]).unwrap();
    let mut buf = [0u8; 8];
    // Closed without executing the transfer that followed
    match raw.read(&mut buf) {
        Ok(n) => assert_eq!(n, 0),
        Err(e) => assert_eq!(e.kind(), io::ErrorKind::ConnectionReset),
    }

    let mut spi = SpiDev::connect(&client_config(&server)).unwrap();
    spi.open(0, 0).unwrap();
    assert_eq!(spi.xfer(&[4, 5]).unwrap(), vec![4, 5]);

    server.shutdown();
}

#[test]
fn test_legacy_size_mode() {
    let server = start(Arc::new(SimulatedHardware), SizeMode::Legacy);
    let mut raw = TcpStream::connect(server.local_addr()).unwrap();
    raw.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

    // (low + high) << 8 with low = 1, high = 0 announces 256 bytes
    let mut frame = vec![0x22, 0, 0, 0x23, 1, 0];
    frame.extend(std::iter::repeat(0x5A).take(256));
    raw.write_all(&frame).unwrap();

    let mut reply = vec![0u8; 256];
    raw.read_exact(&mut reply).unwrap();
    assert!(reply.iter().all(|&b| b == 0x5A));

    server.shutdown();
}
