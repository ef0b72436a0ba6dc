//! Configuration management for Heatlink
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files. Every section falls back to defaults, so a
//! minimal file only needs the device host.

use crate::adapter::modbus::MAX_READ_REGISTERS;
use crate::error::{HeatlinkError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Which controller to talk to and where it lives
    pub device: DeviceConfig,

    /// Timeouts, transport retries and reconnect backoff
    pub connection: ConnectionConfig,

    /// Poll cadence and read-block planning limits
    pub polling: PollingConfig,

    /// Enabled heating circuits and zones
    pub catalog: CatalogConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Device identity and network endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Manufacturer key in the driver registry (e.g. "idm", "luxtronik")
    pub manufacturer: String,

    /// Model key in the driver registry
    pub model: String,

    /// Host name or IP address of the controller
    pub host: String,

    /// TCP port; `None` uses the driver's default port
    pub port: Option<u16>,

    /// Modbus unit id (ignored by non-Modbus drivers)
    pub unit_id: u8,
}

/// Connection lifecycle parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Per-operation timeout in milliseconds
    pub timeout_ms: u64,

    /// Transport-level attempts per request
    pub retries: u32,

    /// First reconnect delay in seconds
    pub reconnect_base_delay_secs: f64,

    /// Upper bound for the reconnect delay in seconds
    pub reconnect_max_delay_secs: f64,

    /// Growth factor applied after each failed reconnect
    pub reconnect_multiplier: f64,
}

/// Polling and planner parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Time between poll cycles in milliseconds
    pub interval_ms: u64,

    /// Pause between two bulk reads of the same cycle
    pub inter_block_delay_ms: u64,

    /// Pause before the single retry of a failed bulk read
    pub bulk_retry_delay_ms: u64,

    /// Maximum registers covered by one bulk read
    pub max_block_size: u16,

    /// Largest run of unused registers bridged inside a block
    pub max_gap: u16,

    /// How long a rejected block stays demoted to per-sensor reads
    pub failed_block_ttl_secs: u64,

    /// How often expired demotions are swept
    pub failed_block_sweep_secs: u64,
}

/// Installation-specific catalog extensions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Heating circuit letters ("a".."g")
    pub circuits: Vec<String>,

    /// Room zone indices (0..=9)
    pub zones: Vec<u8>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Path to log file (its parent directory receives the rolling files)
    pub file: String,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,

    /// Number of rotated files to keep
    pub backup_count: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            manufacturer: "idm".to_string(),
            model: "navigator_2_0".to_string(),
            host: "192.168.1.100".to_string(),
            port: None,
            unit_id: 1,
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 3000,
            retries: 3,
            reconnect_base_delay_secs: 1.0,
            reconnect_max_delay_secs: 60.0,
            reconnect_multiplier: 2.0,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 10_000,
            inter_block_delay_ms: 50,
            bulk_retry_delay_ms: 200,
            max_block_size: 50,
            max_gap: 5,
            failed_block_ttl_secs: 3600,
            failed_block_sweep_secs: 300,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: "/tmp/heatlink.log".to_string(),
            console_output: true,
            json_format: false,
            backup_count: 5,
        }
    }
}

impl ConnectionConfig {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_secs_f64(self.reconnect_base_delay_secs.max(0.0))
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_secs_f64(self.reconnect_max_delay_secs.max(0.0))
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn inter_block_delay(&self) -> Duration {
        Duration::from_millis(self.inter_block_delay_ms)
    }

    pub fn bulk_retry_delay(&self) -> Duration {
        Duration::from_millis(self.bulk_retry_delay_ms)
    }

    pub fn failed_block_ttl(&self) -> Duration {
        Duration::from_secs(self.failed_block_ttl_secs)
    }

    pub fn failed_block_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.failed_block_sweep_secs)
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from `HEATLINK_CONFIG` or the first default location found
    pub fn load() -> Result<Self> {
        let mut candidates: Vec<PathBuf> = Vec::new();
        if let Some(path) = std::env::var_os("HEATLINK_CONFIG") {
            candidates.push(PathBuf::from(path));
        }
        candidates.extend(
            [
                "heatlink.yaml",
                "/data/heatlink.yaml",
                "/etc/heatlink/config.yaml",
            ]
            .iter()
            .map(PathBuf::from),
        );

        for path in &candidates {
            if path.exists() {
                return Self::from_file(path);
            }
        }

        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.device.host.trim().is_empty() {
            return Err(HeatlinkError::validation(
                "device.host",
                "Host cannot be empty",
            ));
        }

        if self.device.port == Some(0) {
            return Err(HeatlinkError::validation(
                "device.port",
                "Port must be greater than 0",
            ));
        }

        if self.connection.timeout_ms == 0 {
            return Err(HeatlinkError::validation(
                "connection.timeout_ms",
                "Must be greater than 0",
            ));
        }

        if self.connection.reconnect_multiplier < 1.0 {
            return Err(HeatlinkError::validation(
                "connection.reconnect_multiplier",
                "Must be at least 1.0",
            ));
        }

        if self.connection.reconnect_max_delay_secs < self.connection.reconnect_base_delay_secs {
            return Err(HeatlinkError::validation(
                "connection.reconnect_max_delay_secs",
                "Must not be below reconnect_base_delay_secs",
            ));
        }

        if !(1..=MAX_READ_REGISTERS).contains(&self.polling.max_block_size) {
            return Err(HeatlinkError::validation(
                "polling.max_block_size".to_string(),
                format!("Must be between 1 and {}", MAX_READ_REGISTERS),
            ));
        }

        if self.polling.interval_ms == 0 {
            return Err(HeatlinkError::validation(
                "polling.interval_ms",
                "Must be greater than 0",
            ));
        }

        Ok(())
    }
}
