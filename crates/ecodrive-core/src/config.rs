//! Configuration
//!
//! Every tunable in the crate lives in [`EcoDriveConfig`]. All fields have
//! defaults, so a config file only needs the values it changes.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::protocol::{DriverConfig, InitConfig, DEFAULT_BAUD_RATE};
use crate::scoring::ScoringConfig;
use crate::telemetry::PollerConfig;
use crate::trip::{FuelModel, GearConfig};

/// Errors loading or saving configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read or written
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The file is not valid config JSON
    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    /// Neither a config nor a home directory is known
    #[error("Could not find a config directory")]
    NoConfigDir,
}

/// Where to find the adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Serial port name (e.g. `/dev/rfcomm0`, `COM5`)
    pub port_name: Option<String>,
    /// Serial baud rate; ignored for TCP
    pub baud_rate: u32,
    /// `host:port` of a Wi-Fi adapter; takes precedence over the serial port
    pub tcp_address: Option<String>,
    /// Upper bound for opening the link
    pub connect_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            port_name: None,
            baud_rate: DEFAULT_BAUD_RATE,
            tcp_address: None,
            connect_timeout_ms: 5000,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EcoDriveConfig {
    /// Adapter location
    pub connection: ConnectionConfig,
    /// Command exchange timing
    pub driver: DriverConfig,
    /// Adapter initialization timing
    pub init: InitConfig,
    /// Poll cadence
    pub poller: PollerConfig,
    /// Drivetrain geometry for gear estimation
    pub gear: GearConfig,
    /// Fuel flow model
    pub fuel: FuelModel,
    /// Efficiency score thresholds and weights
    pub scoring: ScoringConfig,
}

impl EcoDriveConfig {
    /// Default config file location
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let base = dirs::config_dir()
            .or_else(dirs::home_dir)
            .ok_or(ConfigError::NoConfigDir)?;
        Ok(base.join("EcoDrive").join("config.json"))
    }

    /// Read a config file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// Load `path` if it exists, defaults otherwise
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Write the config as pretty JSON, creating parent directories
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!(path = %path.display(), "config saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"fuel": {"fuel_density_g_per_l": 745.0}, "poller": {"error_backoff_ms": 50}}"#)
            .unwrap();

        let config = EcoDriveConfig::load(&path).unwrap();
        assert_eq!(config.fuel.fuel_density_g_per_l, 745.0);
        assert_eq!(config.fuel.min_afr, 50.0);
        assert_eq!(config.poller.error_backoff_ms, 50);
        assert_eq!(config.poller.inter_command_delay_ms, 100);
        assert_eq!(config.gear, GearConfig::default());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sub").join("config.json");
        let mut config = EcoDriveConfig::default();
        config.connection.port_name = Some("/dev/rfcomm0".to_string());
        config.scoring.optimal_speed_max = 80.0;
        config.save(&path).unwrap();

        assert_eq!(EcoDriveConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.json");
        assert_eq!(EcoDriveConfig::load_or_default(&path).unwrap(), EcoDriveConfig::default());
        assert!(matches!(EcoDriveConfig::load(&path), Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_invalid_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ nope").unwrap();
        assert!(matches!(EcoDriveConfig::load(&path), Err(ConfigError::Parse(_))));
    }
}
