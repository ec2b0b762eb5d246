//! Monitor configuration
//!
//! Values are resolved in three layers: built-in defaults, an optional JSON
//! file, then the environment (`NOISE_LEVEL_THRESHOLD`,
//! `MAX_TIME_BETWEEN_NOISE`). A malformed environment value is logged and
//! ignored so a typo never stops an unattended monitor.

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::detection::buffer::capacity_for;

/// Environment variable holding the noise threshold (integer dB)
pub const ENV_NOISE_LEVEL_THRESHOLD: &str = "NOISE_LEVEL_THRESHOLD";

/// Environment variable holding the grace period (integer seconds)
pub const ENV_MAX_TIME_BETWEEN_NOISE: &str = "MAX_TIME_BETWEEN_NOISE";

/// Errors raised while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value {value:?} for {name}")]
    InvalidValue { name: &'static str, value: String },
}

/// How the quiet gap is compared against the grace period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GracePrecision {
    /// Sub-second remainder of the gap is discarded before comparing
    #[default]
    WholeSeconds,
    /// Gap is compared at full timestamp precision
    Exact,
}

fn default_noise_level_threshold() -> i32 {
    crate::DEFAULT_NOISE_LEVEL_THRESHOLD
}

fn default_max_time_between_noise() -> u64 {
    crate::DEFAULT_MAX_TIME_BETWEEN_NOISE
}

fn default_sample_rate() -> u32 {
    crate::SAMPLE_RATE
}

fn default_frame_size() -> usize {
    crate::DEFAULT_FRAME_SIZE
}

fn default_averaging_period_secs() -> f64 {
    crate::AVERAGING_PERIOD_SECS
}

fn default_log_path() -> PathBuf {
    PathBuf::from(crate::DEFAULT_LOG_PATH)
}

fn default_sink_retry_attempts() -> u32 {
    3
}

fn default_sink_retry_backoff_ms() -> u64 {
    200
}

/// Complete monitor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Level (dB) a frame must exceed to count as noisy
    #[serde(default = "default_noise_level_threshold")]
    pub noise_level_threshold: i32,
    /// Longest quiet gap in seconds that keeps an event open
    #[serde(default = "default_max_time_between_noise")]
    pub max_time_between_noise: u64,
    /// Capture sample rate in Hz
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Samples per analysis frame
    #[serde(default = "default_frame_size")]
    pub frame_size: usize,
    /// Averaging window in seconds, sizes the level buffer
    #[serde(default = "default_averaging_period_secs")]
    pub averaging_period_secs: f64,
    /// CSV file receiving finished events
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,
    /// Input device name (None = system default)
    #[serde(default)]
    pub device: Option<String>,
    /// Emit a still-open event when monitoring stops
    #[serde(default)]
    pub flush_on_shutdown: bool,
    /// Gap comparison precision
    #[serde(default)]
    pub grace_precision: GracePrecision,
    /// Write attempts per event before it is dropped
    #[serde(default = "default_sink_retry_attempts")]
    pub sink_retry_attempts: u32,
    /// Delay before the first retry, doubled on each further attempt
    #[serde(default = "default_sink_retry_backoff_ms")]
    pub sink_retry_backoff_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            noise_level_threshold: default_noise_level_threshold(),
            max_time_between_noise: default_max_time_between_noise(),
            sample_rate: default_sample_rate(),
            frame_size: default_frame_size(),
            averaging_period_secs: default_averaging_period_secs(),
            log_path: default_log_path(),
            device: None,
            flush_on_shutdown: false,
            grace_precision: GracePrecision::default(),
            sink_retry_attempts: default_sink_retry_attempts(),
            sink_retry_backoff_ms: default_sink_retry_backoff_ms(),
        }
    }
}

impl MonitorConfig {
    /// Resolve configuration from an optional file and the process environment
    ///
    /// # Arguments
    /// * `file` - JSON config file; an unreadable or malformed file is an error
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        Ok(base.with_env_overrides(|name| std::env::var(name).ok()))
    }

    /// Load a JSON config file, missing fields take their defaults
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), "Loaded config from disk");
        Ok(config)
    }

    /// Apply environment overrides read through `lookup`
    ///
    /// Invalid values are logged and the current value is kept.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        match parse_var::<i32, _>(&lookup, ENV_NOISE_LEVEL_THRESHOLD) {
            Ok(Some(value)) => self.noise_level_threshold = value,
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, default = self.noise_level_threshold, "Ignoring environment override"),
        }

        match parse_var::<u64, _>(&lookup, ENV_MAX_TIME_BETWEEN_NOISE) {
            Ok(Some(value)) => self.max_time_between_noise = value,
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, default = self.max_time_between_noise, "Ignoring environment override"),
        }

        self
    }

    /// Level buffer capacity in frames
    pub fn buffer_capacity(&self) -> usize {
        capacity_for(self.averaging_period_secs, self.sample_rate, self.frame_size)
    }

    /// Grace period as a time delta
    pub fn grace_period(&self) -> TimeDelta {
        let secs = self.max_time_between_noise.min((i64::MAX / 1000) as u64) as i64;
        TimeDelta::seconds(secs)
    }

    /// Save config to disk, creating parent directories if needed
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), "Config saved to disk");
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { name, value: raw }),
    }
}
