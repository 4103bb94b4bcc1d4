//! Configuration management for trackrecorder.
//!
//! Configuration is loaded with figment from defaults, an optional TOML
//! file, and environment variables, then validated. There is no global
//! configuration state: the loaded value is passed explicitly to the
//! constructors that need it.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::filter;
use crate::store;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default config/data directory name.
const DATA_DIR_NAME: &str = "trackrecorder";

/// Application configuration.
///
/// Loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `TRACKRECORDER_`, sections
///    separated by `__`, e.g. `TRACKRECORDER_LOG__PREFIX`)
/// 2. TOML config file at `~/.config/trackrecorder/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Per-day log configuration.
    pub log: LogConfig,
    /// Device connection configuration.
    pub gps: GpsConfig,
    /// Noise filter configuration.
    pub noise: NoiseConfig,
    /// Display unit configuration.
    pub display: DisplayConfig,
}

/// Per-day log configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Directory holding the per-day log files.
    /// Defaults to `~/.local/share/trackrecorder/logs`.
    pub directory: Option<PathBuf>,
    /// File name prefix, completed by the local date as `YYYYMMDD`.
    pub prefix: String,
    /// Minimum seconds between log writes.
    pub write_period_secs: u64,
}

/// Device connection configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpsConfig {
    /// gpsd address as host:port.
    pub address: String,
    /// Socket read timeout in milliseconds; bounds every poll and how
    /// quickly the sampler observes shutdown.
    pub read_timeout_ms: u64,
}

/// Noise filter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    /// Divisor applied to the combined error estimates when deriving the
    /// jitter threshold. Rough and unscientific by design; tune, don't
    /// derive.
    pub divisor: f64,
}

/// Display unit configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Report distances in kilometres rather than miles.
    pub metric: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            directory: None, // Resolved to the data dir at runtime
            prefix: "gpslog".to_string(),
            write_period_secs: store::DEFAULT_WRITE_PERIOD_SECS,
        }
    }
}

impl Default for GpsConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:2947".to_string(),
            read_timeout_ms: 2000,
        }
    }
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            divisor: filter::DEFAULT_DIVISOR,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self { metric: true }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if loading, parsing, or validation fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config file path.
    ///
    /// # Errors
    ///
    /// Returns an error if loading, parsing, or validation fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file).nested())
            .merge(Env::prefixed("TRACKRECORDER_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigValidation`] if any value is unusable.
    pub fn validate(&self) -> Result<()> {
        if self.log.write_period_secs == 0 {
            return Err(Error::ConfigValidation {
                message: "log.write_period_secs must be greater than 0".to_string(),
            });
        }

        if self.log.prefix.is_empty() {
            return Err(Error::ConfigValidation {
                message: "log.prefix must not be empty".to_string(),
            });
        }

        if self.log.prefix.contains(['/', '\\']) {
            return Err(Error::ConfigValidation {
                message: format!(
                    "log.prefix must not contain path separators: {}",
                    self.log.prefix
                ),
            });
        }

        if self.gps.address.is_empty() {
            return Err(Error::ConfigValidation {
                message: "gps.address must not be empty".to_string(),
            });
        }

        if self.gps.read_timeout_ms == 0 {
            return Err(Error::ConfigValidation {
                message: "gps.read_timeout_ms must be greater than 0".to_string(),
            });
        }

        if !self.noise.divisor.is_finite() || self.noise.divisor <= 0.0 {
            return Err(Error::ConfigValidation {
                message: format!("noise.divisor must be positive: {}", self.noise.divisor),
            });
        }

        Ok(())
    }

    /// Get the log directory, resolving the default if not set.
    #[must_use]
    pub fn log_directory(&self) -> PathBuf {
        self.log
            .directory
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join("logs"))
    }

    /// Get the write throttle period as a Duration.
    #[must_use]
    pub fn write_period(&self) -> Duration {
        Duration::from_secs(self.log.write_period_secs)
    }

    /// Get the device read timeout as a Duration.
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.gps.read_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log.prefix, "gpslog");
        assert_eq!(config.log.write_period_secs, 20);
        assert_eq!(config.gps.address, "127.0.0.1:2947");
        assert!((config.noise.divisor - 4.0).abs() < f64::EPSILON);
        assert!(config.display.metric);
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_zero_write_period() {
        let mut config = Config::default();
        config.log.write_period_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("write_period_secs"));
        assert!(err.is_config());
    }

    #[test]
    fn test_validate_bad_prefix() {
        let mut config = Config::default();
        config.log.prefix = String::new();
        assert!(config.validate().is_err());

        config.log.prefix = "logs/gps".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("path separators"));
    }

    #[test]
    fn test_validate_bad_address() {
        let mut config = Config::default();
        config.gps.address = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_read_timeout() {
        let mut config = Config::default();
        config.gps.read_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bad_divisor() {
        let mut config = Config::default();
        config.noise.divisor = 0.0;
        assert!(config.validate().is_err());
        config.noise.divisor = -3.0;
        assert!(config.validate().is_err());
        config.noise.divisor = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_durations() {
        let config = Config::default();
        assert_eq!(config.write_period(), Duration::from_secs(20));
        assert_eq!(config.read_timeout(), Duration::from_millis(2000));
    }

    #[test]
    fn test_log_directory_default_and_custom() {
        let config = Config::default();
        assert!(config.log_directory().to_string_lossy().contains("logs"));

        let mut config = Config::default();
        config.log.directory = Some(PathBuf::from("/var/log/tracker"));
        assert_eq!(config.log_directory(), PathBuf::from("/var/log/tracker"));
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("trackrecorder"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config_uses_defaults() {
        let result = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml")));
        assert_eq!(result.unwrap(), Config::default());
    }

    #[test]
    fn test_load_from_toml_file() {
        let path = std::env::temp_dir().join(format!(
            "trackrecorder-config-{}.toml",
            std::process::id()
        ));
        std::fs::write(
            &path,
            "[log]\nprefix = \"ride\"\nwrite_period_secs = 5\n\n[display]\nmetric = false\n",
        )
        .expect("write config");

        let config = Config::load_from(Some(path.clone())).expect("load");
        assert_eq!(config.log.prefix, "ride");
        assert_eq!(config.log.write_period_secs, 5);
        assert!(!config.display.metric);
        // Untouched sections keep their defaults.
        assert_eq!(config.gps.address, "127.0.0.1:2947");

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_load_rejects_invalid_file_values() {
        let path = std::env::temp_dir().join(format!(
            "trackrecorder-config-bad-{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, "[noise]\ndivisor = -1.0\n").expect("write config");
        assert!(Config::load_from(Some(path.clone())).is_err());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_config_round_trips_through_serde() {
        let config = Config::default();
        let json = serde_json::to_string(&config).expect("serialize");
        let back: Config = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(config, back);
    }
}
