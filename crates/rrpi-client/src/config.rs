//! Locating the companion server.

use rrpi_protocol::DEFAULT_PORT;

use crate::error::{ClientError, Result};

/// Environment variable holding the server's host name or IP address.
pub const HOST_VAR: &str = "RASPBERRY_IP";
/// Environment variable holding the server's port.
pub const PORT_VAR: &str = "RASPBERRY_PORT";

/// Where the companion server listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Host name or IP address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl ClientConfig {
    /// Server at `host` on the default port.
    pub fn new(host: impl Into<String>) -> Self {
        ClientConfig {
            host: host.into(),
            port: DEFAULT_PORT,
        }
    }

    /// Override the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Read `RASPBERRY_IP` (required) and `RASPBERRY_PORT` (optional).
    pub fn from_env() -> Result<Self> {
        Self::from_values(
            std::env::var(HOST_VAR).ok(),
            std::env::var(PORT_VAR).ok(),
        )
    }

    fn from_values(host: Option<String>, port: Option<String>) -> Result<Self> {
        let host = host
            .filter(|h| !h.trim().is_empty())
            .ok_or(ClientError::MissingHost)?;
        let mut config = ClientConfig::new(host.trim());
        if let Some(port) = port {
            config.port = port
                .trim()
                .parse()
                .map_err(|_| ClientError::InvalidPort(port.clone()))?;
        }
        Ok(config)
    }

    /// `host:port` string for connecting.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_required() {
        assert!(matches!(
            ClientConfig::from_values(None, Some("1".into())),
            Err(ClientError::MissingHost)
        ));
        assert!(matches!(
            ClientConfig::from_values(Some("  ".into()), None),
            Err(ClientError::MissingHost)
        ));
    }

    #[test]
    fn test_default_port() {
        let config = ClientConfig::from_values(Some("10.0.0.7".into()), None).unwrap();
        assert_eq!(config.port, 8789);
        assert_eq!(config.address(), "10.0.0.7:8789");
    }

    #[test]
    fn test_port_override_and_validation() {
        let config = ClientConfig::from_values(Some("pi".into()), Some("9000".into())).unwrap();
        assert_eq!(config, ClientConfig::new("pi").with_port(9000));

        assert!(matches!(
            ClientConfig::from_values(Some("pi".into()), Some("70000".into())),
            Err(ClientError::InvalidPort(_))
        ));
    }
}
