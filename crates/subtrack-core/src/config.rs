//! Application configuration
//!
//! Resolution order, later wins:
//! 1. Built-in defaults
//! 2. TOML file (`--config`, or `<config dir>/subtrack/config.toml` if present)
//! 3. Environment variables
//!
//! ```toml
//! [schedule]
//! refresh_secs = 10
//! reminder_scan_secs = 60
//!
//! [sync]
//! on_status_change = false
//!
//! [trend]
//! low = 0.85
//! high = 1.15
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::analytics::{DEFAULT_TREND_HIGH, DEFAULT_TREND_LOW};
use crate::error::{Error, Result};

pub const REFRESH_SECS_ENV: &str = "SUBTRACK_REFRESH_SECS";
pub const REMINDER_SCAN_SECS_ENV: &str = "SUBTRACK_REMINDER_SCAN_SECS";
pub const SYNC_ON_STATUS_CHANGE_ENV: &str = "SUBTRACK_SYNC_ON_STATUS_CHANGE";

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// Period of the status refresh loop
    pub refresh_interval: Duration,
    /// Period of the reminder scan loop
    pub reminder_scan_interval: Duration,
    /// Persist the snapshot after a refresh pass that flipped any status
    pub sync_on_status_change: bool,
    pub trend_low: f64,
    pub trend_high: f64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(10),
            reminder_scan_interval: Duration::from_secs(60),
            sync_on_status_change: false,
            trend_low: DEFAULT_TREND_LOW,
            trend_high: DEFAULT_TREND_HIGH,
        }
    }
}

impl AppConfig {
    /// Load from `path` (or the default location) and apply env overrides
    ///
    /// An explicit `path` must exist; the default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let content = match path {
            Some(p) => Some(fs::read_to_string(p).map_err(|e| {
                Error::InvalidData(format!("Cannot read config {}: {}", p.display(), e))
            })?),
            None => default_config_path()
                .filter(|p| p.exists())
                .map(|p| {
                    debug!(path = %p.display(), "Loading config file");
                    fs::read_to_string(&p)
                })
                .transpose()?,
        };

        let mut config = match content {
            Some(c) => parse_config(&c)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply overrides from a key lookup (normally the process environment)
    ///
    /// Unparseable or zero values are ignored with a warning.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(secs) = lookup(REFRESH_SECS_ENV).and_then(|v| parse_secs(REFRESH_SECS_ENV, &v)) {
            self.refresh_interval = Duration::from_secs(secs);
        }
        if let Some(secs) =
            lookup(REMINDER_SCAN_SECS_ENV).and_then(|v| parse_secs(REMINDER_SCAN_SECS_ENV, &v))
        {
            self.reminder_scan_interval = Duration::from_secs(secs);
        }
        if let Some(raw) = lookup(SYNC_ON_STATUS_CHANGE_ENV) {
            match parse_bool(&raw) {
                Some(flag) => self.sync_on_status_change = flag,
                None => warn!(var = SYNC_ON_STATUS_CHANGE_ENV, value = %raw, "Ignoring invalid flag"),
            }
        }
    }
}

/// `<config dir>/subtrack/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("subtrack").join("config.toml"))
}

/// `<data dir>/subtrack`, falling back to the working directory
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("subtrack"))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    schedule: Option<RawSchedule>,
    sync: Option<RawSync>,
    trend: Option<RawTrend>,
}

#[derive(Debug, Deserialize)]
struct RawSchedule {
    refresh_secs: Option<u64>,
    reminder_scan_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawSync {
    on_status_change: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RawTrend {
    low: Option<f64>,
    high: Option<f64>,
}

fn parse_config(content: &str) -> Result<AppConfig> {
    let raw: RawConfig = toml::from_str(content)?;
    let mut config = AppConfig::default();

    if let Some(schedule) = raw.schedule {
        if let Some(secs) = schedule.refresh_secs {
            config.refresh_interval = Duration::from_secs(nonzero(secs, "schedule.refresh_secs")?);
        }
        if let Some(secs) = schedule.reminder_scan_secs {
            config.reminder_scan_interval =
                Duration::from_secs(nonzero(secs, "schedule.reminder_scan_secs")?);
        }
    }

    if let Some(flag) = raw.sync.and_then(|s| s.on_status_change) {
        config.sync_on_status_change = flag;
    }

    if let Some(trend) = raw.trend {
        config.trend_low = trend.low.unwrap_or(config.trend_low);
        config.trend_high = trend.high.unwrap_or(config.trend_high);
        let valid = config.trend_low.is_finite()
            && config.trend_high.is_finite()
            && config.trend_low >= 0.0
            && config.trend_low <= config.trend_high;
        if !valid {
            return Err(Error::InvalidData(format!(
                "trend band [{}, {}] is invalid",
                config.trend_low, config.trend_high
            )));
        }
    }

    Ok(config)
}

fn nonzero(secs: u64, key: &str) -> Result<u64> {
    if secs == 0 {
        return Err(Error::InvalidData(format!("{} must be greater than zero", key)));
    }
    Ok(secs)
}

fn parse_secs(var: &str, raw: &str) -> Option<u64> {
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Some(secs),
        _ => {
            warn!(var, value = %raw, "Ignoring invalid interval");
            None
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_parse_partial_config_keeps_defaults() {
        let config = parse_config("[schedule]\nrefresh_secs = 5\n").unwrap();
        assert_eq!(config.refresh_interval, Duration::from_secs(5));
        assert_eq!(config.reminder_scan_interval, Duration::from_secs(60));
        assert!(!config.sync_on_status_change);
        assert_eq!(config.trend_low, DEFAULT_TREND_LOW);
    }

    #[test]
    fn test_parse_full_config() {
        let config = parse_config(
            r#"
            [schedule]
            refresh_secs = 30
            reminder_scan_secs = 120

            [sync]
            on_status_change = true

            [trend]
            low = 1.0
            high = 1.0
            "#,
        )
        .unwrap();
        assert_eq!(config.reminder_scan_interval, Duration::from_secs(120));
        assert!(config.sync_on_status_change);
        assert_eq!(config.trend_high, 1.0);
    }

    #[test]
    fn test_parse_rejects_bad_values() {
        assert!(parse_config("[schedule]\nrefresh_secs = 0\n").is_err());
        assert!(parse_config("[trend]\nlow = 1.2\nhigh = 0.8\n").is_err());
        assert!(matches!(parse_config("[nope]\n"), Err(Error::Config(_))));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (REFRESH_SECS_ENV, "2"),
            (REMINDER_SCAN_SECS_ENV, "zero"),
            (SYNC_ON_STATUS_CHANGE_ENV, "yes"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.refresh_interval, Duration::from_secs(2));
        assert_eq!(config.reminder_scan_interval, Duration::from_secs(60));
        assert!(config.sync_on_status_change);
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[schedule]\nreminder_scan_secs = 15\n").unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.reminder_scan_interval, Duration::from_secs(15));

        assert!(AppConfig::load(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
