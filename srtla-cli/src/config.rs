//! Configuration file support for the SRTLA CLI tools

use serde::{Deserialize, Serialize};
use srtla_bonding::{ConnectionPriorities, ConnectionPriority};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Priority of one named link
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityConfig {
    /// Link name: `Cellular`, `WiFi`, or an Ethernet device name
    pub name: String,
    pub priority: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Bonding client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Destination, e.g. `srtla://ingest.example.com:5000`
    pub uri: String,
    /// Direct SRT without bonding
    #[serde(default)]
    pub passthrough: bool,
    /// Connect timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Statistics print interval in seconds
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,
    /// Whether link priorities apply
    #[serde(default)]
    pub priorities_enabled: bool,
    /// Per-link priorities
    #[serde(default)]
    pub priorities: Vec<PriorityConfig>,
}

fn default_timeout() -> u64 {
    10
}

fn default_stats_interval() -> u64 {
    2
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }

    pub fn connection_priorities(&self) -> ConnectionPriorities {
        ConnectionPriorities {
            enabled: self.priorities_enabled,
            priorities: self
                .priorities
                .iter()
                .map(|p| ConnectionPriority {
                    name: p.name.clone(),
                    priority: p.priority,
                    enabled: p.enabled,
                })
                .collect(),
        }
    }
}

/// Combined configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub client: Option<ClientConfig>,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Create an example client configuration
    pub fn example_client() -> Self {
        Config {
            client: Some(ClientConfig {
                uri: "srtla://ingest.example.com:5000".to_string(),
                passthrough: false,
                timeout_secs: 10,
                stats_interval_secs: 2,
                priorities_enabled: true,
                priorities: vec![
                    PriorityConfig {
                        name: "Cellular".to_string(),
                        priority: 1,
                        enabled: true,
                    },
                    PriorityConfig {
                        name: "WiFi".to_string(),
                        priority: 2,
                        enabled: true,
                    },
                ],
            }),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}
