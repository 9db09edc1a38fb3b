//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind the HTTP server to.
    /// Override: `BEATSYNC_BIND_HOST`
    pub bind_host: String,

    /// Port to bind the HTTP server to.
    /// Override: `BEATSYNC_BIND_PORT`
    pub bind_port: u16,

    /// Directory for persistent data (room snapshots).
    /// Override: `BEATSYNC_DATA_DIR`
    pub data_dir: Option<PathBuf>,

    /// Base URL of the music search/stream provider.
    /// Override: `PROVIDER_URL`
    pub provider_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let defaults = beatsync_core::Config::default();
        Self {
            bind_host: defaults.bind_host,
            bind_port: defaults.bind_port,
            data_dir: None,
            provider_url: defaults.provider_url,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("BEATSYNC_BIND_HOST") {
            self.bind_host = val;
        }

        if let Ok(val) = std::env::var("BEATSYNC_BIND_PORT") {
            if let Ok(port) = val.parse() {
                self.bind_port = port;
            }
        }

        if let Ok(val) = std::env::var("PROVIDER_URL") {
            self.provider_url = val;
        }

        // Note: BEATSYNC_DATA_DIR is handled by clap via #[arg(env = ...)] in main.rs
    }

    /// Converts to beatsync-core's Config type.
    pub fn to_core_config(&self) -> beatsync_core::Config {
        beatsync_core::Config {
            bind_host: self.bind_host.clone(),
            bind_port: self.bind_port,
            data_dir: self
                .data_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from("./data")),
            provider_url: self.provider_url.clone(),
            ..Default::default()
        }
    }
}
