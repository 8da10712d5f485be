//! Application settings

use crate::core::connection::ConnectionConfig;
use crate::core::hub::HubConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Serial link defaults
    pub link: LinkSettings,
    /// Lifecycle and fan-out timing
    pub timing: TimingSettings,
}

/// Serial link defaults used when the CLI does not override them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkSettings {
    /// Default port path
    pub port: String,
    /// Default baud rate
    pub baud_rate: u32,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
        }
    }
}

/// Timing knobs, all in whole units so the TOML stays readable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingSettings {
    /// Connect bound in seconds
    pub connect_timeout_secs: u64,
    /// Command dispatch bound in seconds
    pub command_timeout_secs: u64,
    /// Watchdog check period in seconds
    pub watchdog_interval_secs: u64,
    /// Idle time before the watchdog pings, in seconds
    pub idle_threshold_secs: u64,
    /// Rediscovery check period in seconds
    pub rediscovery_interval_secs: u64,
    /// Subscriber liveness probe period in seconds
    pub probe_interval_secs: u64,
    /// Deferred log flush tick in milliseconds
    pub log_flush_interval_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            command_timeout_secs: 5,
            watchdog_interval_secs: 30,
            idle_threshold_secs: 60,
            rediscovery_interval_secs: 2,
            probe_interval_secs: 30,
            log_flush_interval_ms: 50,
        }
    }
}

impl AppConfig {
    /// Load config from the default location, falling back to defaults when
    /// no file exists yet
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let config_path = super::config_dir()
            .ok_or("Could not determine config directory")?
            .join("config.toml");
        Self::load_from(&config_path)
    }

    /// Load config from an explicit path
    pub fn load_from(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let config_path = super::config_dir()
            .ok_or("Could not determine config directory")?
            .join("config.toml");
        self.save_to(&config_path)
    }

    /// Save config to an explicit path
    pub fn save_to(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Lifecycle timing as the connection manager consumes it
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            connect_timeout: Duration::from_secs(self.timing.connect_timeout_secs),
            command_timeout: Duration::from_secs(self.timing.command_timeout_secs),
            watchdog_interval: Duration::from_secs(self.timing.watchdog_interval_secs),
            idle_threshold: Duration::from_secs(self.timing.idle_threshold_secs),
            rediscovery_interval: Duration::from_secs(self.timing.rediscovery_interval_secs),
            ..ConnectionConfig::default()
        }
    }

    /// Fan-out timing as the hub consumes it
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            probe_interval: Duration::from_secs(self.timing.probe_interval_secs),
            log_flush_interval: Duration::from_millis(self.timing.log_flush_interval_ms),
        }
    }
}
