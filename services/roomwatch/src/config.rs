//! Configuration types for the roomwatch service

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    /// Reject settings the service cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.query.timeout.is_zero() {
            return Err(crate::RoomwatchError::Config(
                "query.timeout must be greater than zero".to_string(),
            ));
        }
        if self.query.trailing_window.is_zero() {
            return Err(crate::RoomwatchError::Config(
                "query.trailing_window must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Measurement store backend, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StoreConfig {
    /// Append-only in-memory store, optionally seeded from a JSON snapshot
    #[serde(rename = "memory")]
    Memory {
        #[serde(default)]
        seed_path: Option<PathBuf>,
    },
    /// Existing SQLite database
    #[serde(rename = "sqlite")]
    Sqlite { path: PathBuf },
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Memory { seed_path: None }
    }
}

impl StoreConfig {
    pub fn type_name(&self) -> &str {
        match self {
            StoreConfig::Memory { .. } => "memory",
            StoreConfig::Sqlite { .. } => "sqlite",
        }
    }
}

/// Query execution settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Upper bound on a single façade request
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    /// Length of the trailing window used by the building dashboard
    #[serde(default = "default_trailing_window", with = "humantime_serde")]
    pub trailing_window: Duration,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            trailing_window: default_trailing_window(),
        }
    }
}

/// HTTP API configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

fn default_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_trailing_window() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

fn default_port() -> u16 {
    11120
}

/// Load configuration from a JSON file
pub fn load_config(path: &Path) -> crate::Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        crate::RoomwatchError::Config(format!("Failed to read config file {:?}: {}", path, e))
    })?;
    let config: Config = serde_json::from_str(&content)?;
    config.validate()?;
    Ok(config)
}
