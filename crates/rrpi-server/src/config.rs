//! Server configuration and hardware selection.
//!
//! Configuration comes from an optional YAML file, overridden by command
//! line flags:
//!
//! ```yaml
//! bind: 0.0.0.0
//! port: 8789
//! backend: simulated
//! size_mode: little-endian
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;

use rrpi_protocol::{SizeMode, DEFAULT_PORT};
use serde::{Deserialize, Serialize};

use crate::bus::{LoopbackSpi, SpiTransport};
use crate::error::ServerError;
use crate::radio::{RadioDevice, SimRadio};

/// Which hardware the sessions drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Loopback SPI and a simulated radio with an echo peer.
    #[default]
    Simulated,
    /// Linux spidev for SPI and the nRF24 register driver on top of it.
    Spidev,
}

/// Server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind.
    #[serde(default = "default_bind")]
    pub bind: IpAddr,
    /// TCP port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Hardware backend.
    #[serde(default)]
    pub backend: Backend,
    /// How SPI transfer sizes are decoded.
    #[serde(default, with = "size_mode_serde")]
    pub size_mode: SizeMode,
}

fn default_bind() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: default_bind(),
            port: default_port(),
            backend: Backend::default(),
            size_mode: SizeMode::default(),
        }
    }
}

impl ServerConfig {
    /// Parse a YAML document.
    pub fn from_yaml(text: &str) -> Result<Self, ServerError> {
        let config: ServerConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML file.
    pub fn load(path: &Path) -> Result<Self, ServerError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    /// Socket address to listen on.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    /// Reject settings this build cannot honor.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.backend == Backend::Spidev && !cfg!(all(feature = "spidev", target_os = "linux")) {
            return Err(ServerError::InvalidConfig(
                "backend 'spidev' needs a Linux build with the `spidev` feature".to_string(),
            ));
        }
        Ok(())
    }
}

mod size_mode_serde {
    use rrpi_protocol::SizeMode;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(mode: &SizeMode, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(mode)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SizeMode, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}

// ============================================================================
// Hardware factory
// ============================================================================

/// Boxed SPI transport handed to a session.
pub type BoxedTransport = Box<dyn SpiTransport + Send>;
/// Boxed radio device handed to a session.
pub type BoxedRadio = Box<dyn RadioDevice + Send>;

/// Creates fresh hardware handles for each session.
pub trait Hardware: Send + Sync {
    /// SPI transport for the bus bridge.
    fn spi(&self) -> BoxedTransport;
    /// Radio device for the radio controller.
    fn radio(&self) -> BoxedRadio;
}

/// Loopback SPI and a simulated radio whose peer echoes every packet.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedHardware;

impl Hardware for SimulatedHardware {
    fn spi(&self) -> BoxedTransport {
        Box::new(LoopbackSpi::new())
    }

    fn radio(&self) -> BoxedRadio {
        let mut radio = SimRadio::new();
        radio.set_echo_peer(true);
        Box::new(radio)
    }
}

/// Kernel spidev devices.
#[cfg(all(feature = "spidev", target_os = "linux"))]
#[derive(Debug, Default, Clone, Copy)]
pub struct SpidevHardware;

#[cfg(all(feature = "spidev", target_os = "linux"))]
impl Hardware for SpidevHardware {
    fn spi(&self) -> BoxedTransport {
        Box::new(crate::spidev::SpidevTransport::new())
    }

    fn radio(&self) -> BoxedRadio {
        Box::new(crate::radio::Nrf24::new(crate::spidev::SpidevTransport::new()))
    }
}

impl Backend {
    /// Hardware factory for this backend.
    pub fn hardware(self) -> Result<Box<dyn Hardware>, ServerError> {
        match self {
            Backend::Simulated => Ok(Box::new(SimulatedHardware)),
            #[cfg(all(feature = "spidev", target_os = "linux"))]
            Backend::Spidev => Ok(Box::new(SpidevHardware)),
            #[cfg(not(all(feature = "spidev", target_os = "linux")))]
            Backend::Spidev => Err(ServerError::InvalidConfig(
                "spidev backend not compiled in".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8789);
        assert_eq!(config.socket_addr().to_string(), "0.0.0.0:8789");
        assert_eq!(config.backend, Backend::Simulated);
        assert_eq!(config.size_mode, SizeMode::LittleEndian);
    }

    #[test]
    fn test_from_yaml() {
        let config = ServerConfig::from_yaml(
            "bind: 127.0.0.1\nport: 9000\nbackend: simulated\nsize_mode: legacy\n",
        )
        .unwrap();
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:9000");
        assert_eq!(config.size_mode, SizeMode::Legacy);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config = ServerConfig::from_yaml("port: 1234\n").unwrap();
        assert_eq!(config.port, 1234);
        assert_eq!(config.bind, default_bind());
    }

    #[test]
    fn test_rejects_unknown_fields_and_modes() {
        assert!(matches!(
            ServerConfig::from_yaml("prot: 1\n"),
            Err(ServerError::Config(_))
        ));
        assert!(matches!(
            ServerConfig::from_yaml("size_mode: big\n"),
            Err(ServerError::Config(_))
        ));
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = ServerConfig {
            size_mode: SizeMode::Legacy,
            ..Default::default()
        };
        let text = serde_yaml::to_string(&config).unwrap();
        assert_eq!(ServerConfig::from_yaml(&text).unwrap(), config);
    }

    #[test]
    fn test_simulated_hardware_echoes() {
        let hardware = Backend::Simulated.hardware().unwrap();
        let mut spi = hardware.spi();
        spi.open(0, 0).unwrap();
        assert_eq!(spi.transfer(&[1, 2]).unwrap(), vec![1, 2]);
    }
}
