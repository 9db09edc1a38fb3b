//! Server configuration.
//!
//! All fields have sensible defaults; the binary layer (`apps/server`)
//! applies environment/CLI overrides before calling [`Config::validate`].

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Runtime configuration for the Beatsync server.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Host to bind the HTTP/WS server to.
    pub bind_host: String,

    /// Port to bind the HTTP/WS server to.
    pub bind_port: u16,

    /// Directory for persistent state (room snapshot file).
    pub data_dir: PathBuf,

    /// Base URL of the music search/stream provider this server proxies to.
    pub provider_url: String,

    /// Capacity of each room's broadcast channel.
    pub room_broadcast_channel_capacity: usize,

    /// Interval, in seconds, between periodic snapshot backups.
    pub backup_interval_secs: u64,
}

impl Config {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.bind_host.trim().is_empty() {
            return Err("bind_host must not be empty".to_string());
        }
        if self.room_broadcast_channel_capacity == 0 {
            return Err(
                "room_broadcast_channel_capacity must be >= 1 (broadcast::channel panics on 0)"
                    .to_string(),
            );
        }
        if self.backup_interval_secs == 0 {
            return Err("backup_interval_secs must be >= 1".to_string());
        }
        if self.provider_url.trim().is_empty() {
            return Err("provider_url must not be empty".to_string());
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            bind_port: crate::protocol_constants::DEFAULT_BIND_PORT,
            data_dir: PathBuf::from("./data"),
            provider_url: "http://localhost:8080".to_string(),
            room_broadcast_channel_capacity:
                crate::protocol_constants::ROOM_BROADCAST_CHANNEL_CAPACITY,
            backup_interval_secs: crate::protocol_constants::BACKUP_SNAPSHOT_INTERVAL_SECS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn empty_bind_host_is_rejected() {
        let mut config = Config::default();
        config.bind_host = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_channel_capacity_is_rejected() {
        let mut config = Config::default();
        config.room_broadcast_channel_capacity = 0;
        assert!(config.validate().is_err());
    }
}
