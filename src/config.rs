//! Configuration management for servofocus
//!
//! Provides configuration loading, saving, and validation for sweep timing,
//! the actuator link, the angle range and autofocus selection.

use crate::actuator::SettleModel;
use crate::errors::SweepError;
use crate::types::{AngleSequence, Degrees, Resolution};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServofocusConfig {
    pub sweep: SweepConfig,
    pub actuator: ActuatorConfig,
    pub angles: AngleRangeConfig,
    pub autofocus: AutofocusConfig,
}

/// Capture and pipeline timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Capture resolution [width, height]
    pub resolution: [u32; 2],
    /// Target frames per second; also sets the poll interval
    pub framerate: u32,
    /// Measurement worker threads
    pub threads: usize,
    /// Hard ceiling on one sweep, in seconds
    pub timeout_secs: f64,
    /// Modelled actuator settle time per degree travelled
    pub seconds_per_degree: f64,
    /// Time given to auto exposure before it is locked
    pub calibration_secs: f64,
    /// Longest idle wait before a worker rechecks for shutdown
    pub worker_wait_ms: u64,
    /// How long shutdown may wait for busy workers
    pub shutdown_timeout_ms: u64,
    /// Optional mask image; non-zero pixels are measured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mask_path: Option<PathBuf>,
}

/// Servo controller link settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuatorConfig {
    /// Serial port of the servo controller
    pub device: PathBuf,
    pub baud: u32,
    pub min_angle: Degrees,
    pub max_angle: Degrees,
}

/// Angles visited by a sweep, `start` to `end` inclusive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AngleRangeConfig {
    pub start: Degrees,
    pub end: Degrees,
    pub step: Degrees,
}

/// Peak selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutofocusConfig {
    /// Smooth measures with a 3-point median before picking the peak
    pub median_filter: bool,
    /// Minimum fraction of filled slots for a sweep to be usable (0.0-1.0)
    pub min_coverage: f64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            resolution: [640, 480],
            framerate: 30,
            threads: 4,
            timeout_secs: 100.0,
            seconds_per_degree: 0.005,
            calibration_secs: 2.0,
            worker_wait_ms: 1000,
            shutdown_timeout_ms: 5000,
            mask_path: None,
        }
    }
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::from("/dev/ttyACM0"),
            baud: 9600,
            min_angle: 0,
            max_angle: 180,
        }
    }
}

impl Default for AngleRangeConfig {
    fn default() -> Self {
        Self {
            start: 5,
            end: 150,
            step: 5,
        }
    }
}

impl Default for AutofocusConfig {
    fn default() -> Self {
        Self {
            median_filter: true,
            min_coverage: 0.5,
        }
    }
}

impl SweepConfig {
    pub fn resolution(&self) -> Resolution {
        Resolution::from(self.resolution)
    }

    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_secs).unwrap_or(Duration::ZERO)
    }

    pub fn calibration(&self) -> Duration {
        Duration::try_from_secs_f64(self.calibration_secs).unwrap_or(Duration::ZERO)
    }

    /// One frame period
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.framerate.max(1) as f64)
    }

    pub fn worker_wait(&self) -> Duration {
        Duration::from_millis(self.worker_wait_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn settle_model(&self) -> SettleModel {
        SettleModel::new(self.seconds_per_degree)
    }

    pub fn validate(&self) -> Result<(), SweepError> {
        if self.resolution().is_empty() {
            return Err(SweepError::config("resolution must be non-zero"));
        }
        if self.framerate == 0 || self.framerate > 240 {
            return Err(SweepError::config("framerate must be 1-240"));
        }
        if self.threads == 0 {
            return Err(SweepError::config("worker thread count must be at least 1"));
        }
        if !(self.timeout_secs.is_finite() && self.timeout_secs > 0.0) {
            return Err(SweepError::config("timeout_secs must be positive"));
        }
        if !(self.seconds_per_degree.is_finite() && self.seconds_per_degree >= 0.0) {
            return Err(SweepError::config("seconds_per_degree must be non-negative"));
        }
        if !(self.calibration_secs.is_finite() && self.calibration_secs >= 0.0) {
            return Err(SweepError::config("calibration_secs must be non-negative"));
        }
        if self.worker_wait_ms == 0 {
            return Err(SweepError::config("worker_wait_ms must be greater than zero"));
        }
        Ok(())
    }
}

impl AngleRangeConfig {
    pub fn sequence(&self) -> Result<AngleSequence, SweepError> {
        AngleSequence::range(self.start, self.end, self.step)
    }
}

impl ServofocusConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, SweepError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| SweepError::ConfigFile(format!("Failed to read config file: {}", e)))?;

        let config: ServofocusConfig = toml::from_str(&contents)
            .map_err(|e| SweepError::ConfigFile(format!("Failed to parse config file: {}", e)))?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), SweepError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                SweepError::ConfigFile(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = self.to_toml()?;
        fs::write(path, toml_string)
            .map_err(|e| SweepError::ConfigFile(format!("Failed to write config file: {}", e)))?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, SweepError> {
        toml::to_string_pretty(self)
            .map_err(|e| SweepError::ConfigFile(format!("Failed to serialize config: {}", e)))
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("servofocus.toml")
    }

    /// Load from default location or fall back to defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), SweepError> {
        self.sweep.validate()?;

        if self.actuator.baud == 0 {
            return Err(SweepError::config("actuator baud must be greater than zero"));
        }

        // Raw I2C nodes need an address select before any write; only serial
        // controllers are driven here.
        if self
            .actuator
            .device
            .file_name()
            .is_some_and(|name| name.to_string_lossy().starts_with("i2c-"))
        {
            return Err(SweepError::config(format!(
                "{:?} is an I2C bus; connect the servo controller over serial",
                self.actuator.device
            )));
        }

        if self.actuator.min_angle > self.actuator.max_angle {
            return Err(SweepError::config("actuator min_angle exceeds max_angle"));
        }

        let angles = self.angles.sequence()?;
        if let Some(angle) = angles
            .iter()
            .find(|a| *a < self.actuator.min_angle || *a > self.actuator.max_angle)
        {
            return Err(SweepError::config(format!(
                "sweep angle {} outside actuator range {}..={}",
                angle, self.actuator.min_angle, self.actuator.max_angle
            )));
        }

        if !(0.0..=1.0).contains(&self.autofocus.min_coverage) {
            return Err(SweepError::config("min_coverage must be between 0.0 and 1.0"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServofocusConfig::default();
        assert_eq!(config.sweep.resolution, [640, 480]);
        assert_eq!(config.sweep.framerate, 30);
        assert_eq!(config.sweep.threads, 4);
        assert_eq!(config.sweep.seconds_per_degree, 0.005);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut bad = ServofocusConfig::default();
        bad.sweep.resolution = [0, 480];
        assert!(bad.validate().is_err());

        let mut bad = ServofocusConfig::default();
        bad.sweep.threads = 0;
        assert!(bad.validate().is_err());

        let mut bad = ServofocusConfig::default();
        bad.angles.end = 200;
        assert!(bad.validate().is_err());

        let mut bad = ServofocusConfig::default();
        bad.autofocus.min_coverage = 1.5;
        assert!(bad.validate().is_err());

        let mut bad = ServofocusConfig::default();
        bad.actuator.baud = 0;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_i2c_device_rejected() {
        let mut config = ServofocusConfig::default();
        config.actuator.device = PathBuf::from("/dev/i2c-1");
        let err = config.validate().unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("I2C"));

        config.actuator.device = PathBuf::from("/dev/ttyUSB0");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_durations() {
        let sweep = SweepConfig::default();
        assert_eq!(sweep.timeout(), Duration::from_secs(100));
        assert_eq!(sweep.calibration(), Duration::from_secs(2));
        assert_eq!(sweep.worker_wait(), Duration::from_secs(1));
        assert!(sweep.poll_interval() > Duration::from_millis(33));
        assert!(sweep.poll_interval() < Duration::from_millis(34));
    }

    #[test]
    fn test_config_toml_format() {
        let toml_string = ServofocusConfig::default().to_toml().unwrap();

        assert!(toml_string.contains("[sweep]"));
        assert!(toml_string.contains("[actuator]"));
        assert!(toml_string.contains("[angles]"));
        assert!(toml_string.contains("[autofocus]"));
        assert!(toml_string.contains("seconds_per_degree"));
        assert!(!toml_string.contains("mask_path"));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: ServofocusConfig = toml::from_str("[sweep]\nthreads = 2\n").unwrap();
        assert_eq!(config.sweep.threads, 2);
        assert_eq!(config.sweep.framerate, 30);
        assert_eq!(config.angles, AngleRangeConfig::default());
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = ServofocusConfig::load_from_file("nonexistent_servofocus.toml");
        assert_eq!(result.unwrap(), ServofocusConfig::default());
    }
}
