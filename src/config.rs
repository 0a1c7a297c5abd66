//! TOML configuration for the monitor.
//!
//! The configuration is a plain value handed to every detection and KPI
//! call. [`ConfigStore`] wraps it with a key/value surface where every
//! successful `set` is written back to disk before returning.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Environment variable overriding the configuration file path.
pub const CONFIG_ENV: &str = "CUTWATCH_CONFIG";

/// One week.
pub const MAX_DETECTION_INTERVAL_MINUTES: u64 = 7 * 24 * 60;
/// Ten years.
pub const MAX_RETENTION_DAYS: u32 = 3650;

// ---------------------------------------------------------------------------
// Config value
// ---------------------------------------------------------------------------

/// Runtime settings for detection, alerting and retention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Vibration magnitude (mm/s) at or below which the machine counts as stopped.
    pub stop_vibration_threshold: f64,
    /// Shortest stop (minutes) that is reported as a downtime event.
    pub min_stop_duration: f64,
    /// Single-axis level (mm/s) that raises a display alert.
    pub alert_vibration_threshold: f64,
    /// Single-axis level (mm/s) that raises a critical alert.
    pub critical_vibration_threshold: f64,
    pub auto_detection_enabled: bool,
    pub notifications_enabled: bool,
    /// Sigma multiplier used by the anomaly scanner.
    pub anomaly_multiplier: f64,
    /// Period of the background detection loop in `serve` mode.
    pub detection_interval_minutes: u64,
    /// Age beyond which `cleanup` drops samples and events.
    pub retention_days: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            stop_vibration_threshold: 0.1,
            min_stop_duration: 2.0,
            alert_vibration_threshold: 2.0,
            critical_vibration_threshold: 4.0,
            auto_detection_enabled: true,
            notifications_enabled: true,
            anomaly_multiplier: 2.5,
            detection_interval_minutes: 15,
            retention_days: 30,
        }
    }
}

impl MonitorConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded monitor configuration");
        Ok(config)
    }

    /// Load `path` if it exists; a missing or unreadable file yields defaults.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            debug!(path = %path.display(), "no config file found, using compiled-in defaults");
            return Self::default();
        }
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "config file exists but could not be loaded, using defaults"
                );
                Self::default()
            }
        }
    }

    /// Write the configuration as TOML, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create config directory: {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("failed to write config file: {}", path.display()))?;
        Ok(())
    }

    pub fn get(&self, key: ConfigKey) -> ConfigValue {
        match key {
            ConfigKey::StopVibrationThreshold => ConfigValue::Float(self.stop_vibration_threshold),
            ConfigKey::MinStopDuration => ConfigValue::Float(self.min_stop_duration),
            ConfigKey::AlertVibrationThreshold => ConfigValue::Float(self.alert_vibration_threshold),
            ConfigKey::CriticalVibrationThreshold => {
                ConfigValue::Float(self.critical_vibration_threshold)
            }
            ConfigKey::AutoDetectionEnabled => ConfigValue::Flag(self.auto_detection_enabled),
            ConfigKey::NotificationsEnabled => ConfigValue::Flag(self.notifications_enabled),
            ConfigKey::AnomalyMultiplier => ConfigValue::Float(self.anomaly_multiplier),
            ConfigKey::DetectionIntervalMinutes => {
                ConfigValue::Integer(self.detection_interval_minutes)
            }
            ConfigKey::RetentionDays => ConfigValue::Integer(u64::from(self.retention_days)),
        }
    }

    /// Parse `raw` for `key` and apply it. The config is left untouched on error.
    pub fn apply(&mut self, key: ConfigKey, raw: &str) -> Result<(), ConfigError> {
        let mut next = self.clone();
        match key {
            ConfigKey::StopVibrationThreshold => next.stop_vibration_threshold = parse_float(key, raw)?,
            ConfigKey::MinStopDuration => next.min_stop_duration = parse_float(key, raw)?,
            ConfigKey::AlertVibrationThreshold => next.alert_vibration_threshold = parse_float(key, raw)?,
            ConfigKey::CriticalVibrationThreshold => {
                next.critical_vibration_threshold = parse_float(key, raw)?
            }
            ConfigKey::AutoDetectionEnabled => next.auto_detection_enabled = parse_flag(key, raw)?,
            ConfigKey::NotificationsEnabled => next.notifications_enabled = parse_flag(key, raw)?,
            ConfigKey::AnomalyMultiplier => next.anomaly_multiplier = parse_float(key, raw)?,
            ConfigKey::DetectionIntervalMinutes => {
                next.detection_interval_minutes = parse_integer(key, raw)?
            }
            ConfigKey::RetentionDays => {
                let days = parse_integer(key, raw)?;
                next.retention_days = u32::try_from(days).map_err(|_| ConfigError::InvalidValue {
                    key,
                    value: raw.to_string(),
                    reason: "out of range".to_string(),
                })?;
            }
        }
        next.validate()?;
        *self = next;
        Ok(())
    }

    /// Cross-field and range checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_negative = [
            (ConfigKey::StopVibrationThreshold, self.stop_vibration_threshold),
            (ConfigKey::MinStopDuration, self.min_stop_duration),
            (ConfigKey::AlertVibrationThreshold, self.alert_vibration_threshold),
            (ConfigKey::CriticalVibrationThreshold, self.critical_vibration_threshold),
            (ConfigKey::AnomalyMultiplier, self.anomaly_multiplier),
        ];
        for (key, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidValue {
                    key,
                    value: value.to_string(),
                    reason: "must be a finite, non-negative number".to_string(),
                });
            }
        }
        if self.critical_vibration_threshold < self.alert_vibration_threshold {
            return Err(ConfigError::InvalidValue {
                key: ConfigKey::CriticalVibrationThreshold,
                value: self.critical_vibration_threshold.to_string(),
                reason: format!(
                    "must not be below alert_vibration_threshold ({})",
                    self.alert_vibration_threshold
                ),
            });
        }
        let bounded = [
            (
                ConfigKey::DetectionIntervalMinutes,
                self.detection_interval_minutes,
                MAX_DETECTION_INTERVAL_MINUTES,
            ),
            (
                ConfigKey::RetentionDays,
                u64::from(self.retention_days),
                u64::from(MAX_RETENTION_DAYS),
            ),
        ];
        for (key, value, max) in bounded {
            if !(1..=max).contains(&value) {
                return Err(ConfigError::InvalidValue {
                    key,
                    value: value.to_string(),
                    reason: format!("must be between 1 and {}", max),
                });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Keys and values
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigKey {
    StopVibrationThreshold,
    MinStopDuration,
    AlertVibrationThreshold,
    CriticalVibrationThreshold,
    AutoDetectionEnabled,
    NotificationsEnabled,
    AnomalyMultiplier,
    DetectionIntervalMinutes,
    RetentionDays,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 9] = [
        ConfigKey::StopVibrationThreshold,
        ConfigKey::MinStopDuration,
        ConfigKey::AlertVibrationThreshold,
        ConfigKey::CriticalVibrationThreshold,
        ConfigKey::AutoDetectionEnabled,
        ConfigKey::NotificationsEnabled,
        ConfigKey::AnomalyMultiplier,
        ConfigKey::DetectionIntervalMinutes,
        ConfigKey::RetentionDays,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigKey::StopVibrationThreshold => "stop_vibration_threshold",
            ConfigKey::MinStopDuration => "min_stop_duration",
            ConfigKey::AlertVibrationThreshold => "alert_vibration_threshold",
            ConfigKey::CriticalVibrationThreshold => "critical_vibration_threshold",
            ConfigKey::AutoDetectionEnabled => "auto_detection_enabled",
            ConfigKey::NotificationsEnabled => "notifications_enabled",
            ConfigKey::AnomalyMultiplier => "anomaly_multiplier",
            ConfigKey::DetectionIntervalMinutes => "detection_interval_minutes",
            ConfigKey::RetentionDays => "retention_days",
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConfigKey::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Float(f64),
    Integer(u64),
    Flag(bool),
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Float(v) => write!(f, "{}", v),
            ConfigValue::Integer(v) => write!(f, "{}", v),
            ConfigValue::Flag(v) => write!(f, "{}", v),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown configuration key '{0}'")]
    UnknownKey(String),
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: ConfigKey,
        value: String,
        reason: String,
    },
}

fn parse_float(key: ConfigKey, raw: &str) -> Result<f64, ConfigError> {
    raw.trim().parse::<f64>().map_err(|e| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn parse_integer(key: ConfigKey, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse::<u64>().map_err(|e| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn parse_flag(key: ConfigKey, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: raw.to_string(),
            reason: "expected true/false".to_string(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Persistent store
// ---------------------------------------------------------------------------

/// File-backed configuration with immediate persistence on `set`.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    config: MonitorConfig,
}

impl ConfigStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let config = MonitorConfig::load_or_default(&path);
        Self { path, config }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn get(&self, key: &str) -> Result<ConfigValue, ConfigError> {
        let key: ConfigKey = key.parse()?;
        Ok(self.config.get(key))
    }

    /// Validate, apply and persist a single key.
    pub fn set(&mut self, key: &str, raw: &str) -> Result<ConfigValue> {
        let key: ConfigKey = key.parse()?;
        let mut next = self.config.clone();
        next.apply(key, raw)?;
        next.save(&self.path)?;
        self.config = next;
        info!(%key, value = %self.config.get(key), "configuration updated");
        Ok(self.config.get(key))
    }

    pub fn entries(&self) -> Vec<(ConfigKey, ConfigValue)> {
        ConfigKey::ALL
            .into_iter()
            .map(|k| (k, self.config.get(k)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = MonitorConfig::default();
        assert_eq!(cfg.stop_vibration_threshold, 0.1);
        assert_eq!(cfg.min_stop_duration, 2.0);
        assert_eq!(cfg.alert_vibration_threshold, 2.0);
        assert_eq!(cfg.critical_vibration_threshold, 4.0);
        assert!(cfg.auto_detection_enabled);
        assert!(cfg.notifications_enabled);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let cfg: MonitorConfig = toml::from_str("min_stop_duration = 5.0").unwrap();
        assert_eq!(cfg.min_stop_duration, 5.0);
        assert_eq!(cfg.stop_vibration_threshold, 0.1);
    }

    #[test]
    fn test_apply_rejects_bad_values() {
        let mut cfg = MonitorConfig::default();
        assert!(cfg.apply(ConfigKey::StopVibrationThreshold, "abc").is_err());
        assert!(cfg.apply(ConfigKey::MinStopDuration, "-1").is_err());
        assert!(cfg.apply(ConfigKey::CriticalVibrationThreshold, "1.0").is_err());
        assert!(cfg.apply(ConfigKey::AutoDetectionEnabled, "maybe").is_err());
        assert_eq!(cfg, MonitorConfig::default());

        cfg.apply(ConfigKey::AutoDetectionEnabled, "off").unwrap();
        assert!(!cfg.auto_detection_enabled);
    }

    #[test]
    fn test_apply_rejects_out_of_range_integers() {
        let mut cfg = MonitorConfig::default();
        assert!(cfg.apply(ConfigKey::RetentionDays, "4294967295").is_err());
        assert!(cfg.apply(ConfigKey::RetentionDays, "3651").is_err());
        assert!(cfg.apply(ConfigKey::RetentionDays, "0").is_err());
        assert!(cfg
            .apply(ConfigKey::DetectionIntervalMinutes, "18446744073709551615")
            .is_err());
        assert!(cfg.apply(ConfigKey::DetectionIntervalMinutes, "10081").is_err());
        assert_eq!(cfg, MonitorConfig::default());

        cfg.apply(ConfigKey::RetentionDays, "3650").unwrap();
        cfg.apply(ConfigKey::DetectionIntervalMinutes, "10080").unwrap();
        assert_eq!(cfg.retention_days, MAX_RETENTION_DAYS);
        assert_eq!(cfg.detection_interval_minutes, MAX_DETECTION_INTERVAL_MINUTES);
    }

    #[test]
    fn test_load_rejects_oversized_interval() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cutwatch.toml");
        std::fs::write(&path, "detection_interval_minutes = 9999999\n").unwrap();
        assert!(MonitorConfig::load(&path).is_err());
        assert_eq!(MonitorConfig::load_or_default(&path), MonitorConfig::default());
    }

    #[test]
    fn test_unknown_key() {
        assert!(matches!(
            "vibration_limit".parse::<ConfigKey>(),
            Err(ConfigError::UnknownKey(_))
        ));
    }

    #[test]
    fn test_store_set_persists_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cutwatch.toml");

        let mut store = ConfigStore::open(&path);
        assert_eq!(store.get("min_stop_duration").unwrap(), ConfigValue::Float(2.0));

        store.set("min_stop_duration", "3.5").unwrap();
        assert!(path.exists());

        let reopened = ConfigStore::open(&path);
        assert_eq!(reopened.config().min_stop_duration, 3.5);
        assert_eq!(reopened.get("retention_days").unwrap(), ConfigValue::Integer(30));
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cutwatch.toml");
        std::fs::write(&path, "stop_vibration_threshold = \"loud\"").unwrap();

        let cfg = MonitorConfig::load_or_default(&path);
        assert_eq!(cfg, MonitorConfig::default());
    }
}
