//! Board settings, stored as a JSON document in NVS.

use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

use crate::boot::FEED_INTERVAL_MS;
use crate::storage::StorageKind;
use crate::watchdog::DEFAULT_TIMEOUT_SECS;

/// Shortest timeout that still leaves the idle task a full feed interval of slack
pub const MIN_WATCHDOG_TIMEOUT_SECS: u32 = FEED_INTERVAL_MS / 1000 + 2;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("malformed settings: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unknown log level {0:?}")]
    LogLevel(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BoardSettings {
    pub watchdog_timeout_secs: u32,
    pub storage: StorageKind,
    pub log_level: String,
}

impl Default for BoardSettings {
    fn default() -> Self {
        Self {
            watchdog_timeout_secs: DEFAULT_TIMEOUT_SECS,
            storage: StorageKind::default(),
            log_level: "info".into(),
        }
    }
}

impl BoardSettings {
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn level_filter(&self) -> Result<log::LevelFilter, SettingsError> {
        log::LevelFilter::from_str(&self.log_level)
            .map_err(|_| SettingsError::LogLevel(self.log_level.clone()))
    }

    /// Runs before the logger exists, so problems go to stdout
    pub fn level_filter_or_default(&self) -> log::LevelFilter {
        self.level_filter().unwrap_or_else(|e| {
            println!("{e}, logging at info");
            log::LevelFilter::Info
        })
    }

    /// Configured watchdog timeout, raised to `MIN_WATCHDOG_TIMEOUT_SECS`
    pub fn watchdog_timeout(&self) -> u32 {
        if self.watchdog_timeout_secs < MIN_WATCHDOG_TIMEOUT_SECS {
            log::warn!(
                "Watchdog timeout of {}s is shorter than the feed interval allows, using {}s",
                self.watchdog_timeout_secs,
                MIN_WATCHDOG_TIMEOUT_SECS
            );
            MIN_WATCHDOG_TIMEOUT_SECS
        } else {
            self.watchdog_timeout_secs
        }
    }
}
