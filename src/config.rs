use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::FixedOffset;

use crate::calendar::{offset_from_minutes, DEFAULT_UTC_OFFSET_MINUTES};
use crate::limits::*;

pub const WAL_FILE_NAME: &str = "courtbook.wal";

/// Daemon settings, read from `COURTBOOK_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub utc_offset_minutes: i32,
    pub window_days: u32,
    pub status_interval: Duration,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    OffsetOutOfRange(i32),
    WindowOutOfRange(u32),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::OffsetOutOfRange(m) => {
                write!(f, "COURTBOOK_UTC_OFFSET_MINUTES={m} is outside ±{MAX_UTC_OFFSET_MINUTES}")
            }
            ConfigError::WindowOutOfRange(d) => {
                write!(f, "COURTBOOK_WINDOW_DAYS={d} must be within 1..={MAX_WINDOW_DAYS}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            utc_offset_minutes: DEFAULT_UTC_OFFSET_MINUTES,
            window_days: 7,
            status_interval: Duration::from_secs(30 * 60),
            compact_threshold: 1000,
            metrics_port: None,
        }
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|s| s.trim().parse().ok())
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unparseable values fall back to their defaults; out-of-range ones are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Config::default();
        let config = Config {
            data_dir: lookup("COURTBOOK_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            utc_offset_minutes: parsed(&lookup, "COURTBOOK_UTC_OFFSET_MINUTES")
                .unwrap_or(defaults.utc_offset_minutes),
            window_days: parsed(&lookup, "COURTBOOK_WINDOW_DAYS").unwrap_or(defaults.window_days),
            status_interval: parsed(&lookup, "COURTBOOK_STATUS_INTERVAL_SECS")
                .filter(|secs: &u64| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.status_interval),
            compact_threshold: parsed(&lookup, "COURTBOOK_COMPACT_THRESHOLD")
                .unwrap_or(defaults.compact_threshold),
            metrics_port: parsed(&lookup, "COURTBOOK_METRICS_PORT"),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
            return Err(ConfigError::OffsetOutOfRange(self.utc_offset_minutes));
        }
        if self.window_days == 0 || self.window_days > MAX_WINDOW_DAYS {
            return Err(ConfigError::WindowOutOfRange(self.window_days));
        }
        Ok(())
    }

    pub fn offset(&self) -> Result<FixedOffset, ConfigError> {
        offset_from_minutes(self.utc_offset_minutes)
            .ok_or(ConfigError::OffsetOutOfRange(self.utc_offset_minutes))
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join(WAL_FILE_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.offset().unwrap().local_minus_utc(), 345 * 60);
        assert_eq!(config.wal_path(), PathBuf::from("./data/courtbook.wal"));
    }

    #[test]
    fn overrides_are_read() {
        let config = Config::from_lookup(lookup(&[
            ("COURTBOOK_DATA_DIR", "/var/lib/courtbook"),
            ("COURTBOOK_UTC_OFFSET_MINUTES", "330"),
            ("COURTBOOK_WINDOW_DAYS", "14"),
            ("COURTBOOK_STATUS_INTERVAL_SECS", "60"),
            ("COURTBOOK_METRICS_PORT", "9100"),
        ]))
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/courtbook"));
        assert_eq!(config.utc_offset_minutes, 330);
        assert_eq!(config.window_days, 14);
        assert_eq!(config.status_interval, Duration::from_secs(60));
        assert_eq!(config.metrics_port, Some(9100));
    }

    #[test]
    fn garbage_falls_back_and_range_errors() {
        let config = Config::from_lookup(lookup(&[
            ("COURTBOOK_WINDOW_DAYS", "a week"),
            ("COURTBOOK_STATUS_INTERVAL_SECS", "0"),
        ]))
        .unwrap();
        assert_eq!(config.window_days, 7);
        assert_eq!(config.status_interval, Duration::from_secs(1800));

        let err = Config::from_lookup(lookup(&[("COURTBOOK_WINDOW_DAYS", "0")])).unwrap_err();
        assert_eq!(err, ConfigError::WindowOutOfRange(0));
        let err = Config::from_lookup(lookup(&[("COURTBOOK_UTC_OFFSET_MINUTES", "900")])).unwrap_err();
        assert_eq!(err, ConfigError::OffsetOutOfRange(900));
    }
}
