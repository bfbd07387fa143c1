//! Configuration file support for the Groovy tools

use groovy::ConnectOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Test pattern settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// Core framebuffer width
    pub width: u16,
    /// Core framebuffer height
    pub height: u16,
    /// Core refresh rate in Hz
    pub refresh_hz: f64,
    /// Number of frames to send, 0 to run until interrupted
    pub frames: u64,
    /// Horizontal scroll in pixels per frame
    pub scroll: u16,
    /// Send a square wave tone alongside the video
    pub tone: bool,
    /// Statistics interval in seconds
    pub stats_interval_secs: u64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        PatternConfig {
            width: 320,
            height: 240,
            refresh_hz: 59.94,
            frames: 0,
            scroll: 1,
            tone: false,
            stats_interval_secs: 1,
        }
    }
}

impl PatternConfig {
    /// Get statistics interval as Duration
    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }
}

/// Combined configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Device connection
    pub device: ConnectOptions,
    /// Test pattern
    pub pattern: PatternConfig,
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Check values serde cannot
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device.host.is_empty() {
            return Err(ConfigError::Invalid("device.host is empty".to_string()));
        }
        if self.pattern.width == 0 || self.pattern.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "pattern size {}x{}",
                self.pattern.width, self.pattern.height
            )));
        }
        if !(self.pattern.refresh_hz > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "pattern refresh {} Hz",
                self.pattern.refresh_hz
            )));
        }
        Ok(())
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

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
