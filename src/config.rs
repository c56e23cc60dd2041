//! Runtime configuration for hubs and clients
//!
//! Every field has a default, so a config file only needs to name what it
//! changes. Files are JSON.

use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Bytes requested per read; one read is one frame
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1024;

/// Hub settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Interface to listen on
    pub bind_host: IpAddr,
    /// Pending connection queue length
    pub backlog: u32,
    pub read_buffer_size: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bind_host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            backlog: 5,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl HubConfig {
    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        load_json(path.as_ref())
    }
}

/// Client settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub connect_timeout_ms: u64,
    /// How long `disconnect` waits for the echo summary frame
    pub close_timeout_ms: u64,
    pub read_buffer_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            close_timeout_ms: 2_000,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl ClientConfig {
    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        load_json(path.as_ref())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }
}

fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hub_defaults() {
        let config = HubConfig::default();
        assert_eq!(config.bind_host, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(config.backlog, 5);
        assert_eq!(config.read_buffer_size, 1024);
    }

    #[test]
    fn test_partial_hub_config() {
        let config: HubConfig = serde_json::from_str(r#"{"bind_host": "127.0.0.1"}"#).unwrap();
        assert_eq!(config.bind_host, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(config.backlog, 5);
    }

    #[test]
    fn test_client_timeouts() {
        let config: ClientConfig = serde_json::from_str(r#"{"close_timeout_ms": 250}"#).unwrap();
        assert_eq!(config.close_timeout(), Duration::from_millis(250));
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_load_missing_file() {
        let result = ClientConfig::load("/nonexistent/chat_hub.json");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
