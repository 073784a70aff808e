//! Client configuration.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::codec::FrameDecoder;
use crate::history::MessageHistory;

/// Settings for a [`crate::Client`].
///
/// Only `address` and `client_name` are normally supplied by the host; the
/// remaining fields have defaults suited to a hub on the local network.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use deako_rs::ClientConfig;
///
/// let config = ClientConfig::new("192.168.1.50", "Living Room Panel")
///     .with_discovery_timeout(Duration::from_secs(5));
/// assert_eq!(config.socket_address(), "192.168.1.50:23");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Hub address: `host`, `host:port`, `ip` or `ip:port`.
    pub address: String,
    /// Sent as `src` on every request.
    pub client_name: String,
    pub connect_timeout_ms: u64,
    pub discovery_timeout_ms: u64,
    pub read_buffer_size: usize,
    pub max_frame_len: usize,
    pub history_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            address: String::new(),
            client_name: String::from(Self::DEFAULT_CLIENT_NAME),
            connect_timeout_ms: 5_000,
            discovery_timeout_ms: 10_000,
            read_buffer_size: 4096,
            max_frame_len: FrameDecoder::DEFAULT_MAX_FRAME_LEN,
            history_size: MessageHistory::DEFAULT_MAX_ENTRIES,
        }
    }
}

impl ClientConfig {
    /// TCP port the hub listens on.
    pub const DEFAULT_PORT: u16 = 23;
    pub const DEFAULT_CLIENT_NAME: &'static str = "deako-rs";

    pub fn new(address: &str, client_name: &str) -> Self {
        ClientConfig {
            address: address.to_string(),
            client_name: client_name.to_string(),
            ..Self::default()
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = duration_ms(timeout);
        self
    }

    pub fn with_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout_ms = duration_ms(timeout);
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    pub fn with_max_frame_len(mut self, len: usize) -> Self {
        self.max_frame_len = len;
        self
    }

    pub fn with_history_size(mut self, size: usize) -> Self {
        self.history_size = size;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    /// The address to connect to, with the default port applied if missing.
    pub fn socket_address(&self) -> String {
        let address = self.address.trim();
        if address.parse::<SocketAddr>().is_ok() {
            return address.to_string();
        }
        if let Ok(ip) = address.parse::<IpAddr>() {
            return SocketAddr::new(ip, Self::DEFAULT_PORT).to_string();
        }
        match address.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                address.to_string()
            }
            _ => format!("{address}:{}", Self::DEFAULT_PORT),
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_address_defaults_port() {
        let address = |a: &str| ClientConfig::new(a, "test").socket_address();
        assert_eq!(address("10.0.0.5"), "10.0.0.5:23");
        assert_eq!(address("10.0.0.5:2323"), "10.0.0.5:2323");
        assert_eq!(address("hub.local"), "hub.local:23");
        assert_eq!(address("hub.local:24"), "hub.local:24");
        assert_eq!(address("fe80::1"), "[fe80::1]:23");
        assert_eq!(address("[fe80::1]:99"), "[fe80::1]:99");
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"address": "10.0.0.5", "client_name": "Panel"}"#).unwrap();
        assert_eq!(config.client_name, "Panel");
        assert_eq!(config.discovery_timeout(), Duration::from_secs(10));
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.max_frame_len, 64 * 1024);
    }

    #[test]
    fn test_builders() {
        let config = ClientConfig::new("10.0.0.5", "Panel")
            .with_connect_timeout(Duration::from_millis(250))
            .with_history_size(5);
        assert_eq!(config.connect_timeout_ms, 250);
        assert_eq!(config.history_size, 5);
    }
}
