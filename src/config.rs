//! config.rs
//! Runtime configuration loaded from TOML.
//!
//! ```toml
//! [logger]
//! dir = "data/logs"
//! maxlen = 1000
//!
//! [runtime]
//! tick_interval_ms = 10
//! join_poll_ms = 1000
//! ```

use crate::error::ConfigError;
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    pub logger: LoggerConfig,
    pub runtime: RuntimeSettings,
}

/// Where samples are persisted and how many stay in memory.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggerConfig {
    /// Directory for generated `{Aggregate}_{timestamp}.csv` files.
    pub dir: PathBuf,
    /// Explicit log file; overrides `dir`.
    pub path: Option<PathBuf>,
    /// Size of the in-memory window of the log queue.
    pub maxlen: usize,
    /// Capacity of the reference queue read by control threads.
    pub ref_capacity: usize,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/logs"),
            path: None,
            maxlen: 1_000,
            ref_capacity: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeSettings {
    /// Judge-loop period; unset means back-to-back ticks.
    pub tick_interval_ms: Option<u64>,
    /// How long to wait on the control thread before warning again.
    pub join_poll_ms: u64,
    /// Consecutive failed sensor ticks tolerated; reaching the limit stops the mission.
    pub max_sensor_failures: Option<u32>,
    /// CPU core for the runtime thread.
    pub pin_core: Option<usize>,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: None,
            join_poll_ms: 1_000,
            max_sensor_failures: None,
            pin_core: None,
        }
    }
}

impl RuntimeSettings {
    pub fn tick_interval(&self) -> Option<Duration> {
        self.tick_interval_ms.map(Duration::from_millis)
    }

    /// Never shorter than 1 ms, so the join never spins.
    pub fn join_poll(&self) -> Duration {
        Duration::from_millis(self.join_poll_ms.max(1))
    }
}

impl RuntimeConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.logger.ref_capacity == 0 {
            return Err(ConfigError::Invalid("logger.ref_capacity must be > 0".into()));
        }
        if self.runtime.join_poll_ms == 0 {
            return Err(ConfigError::Invalid("runtime.join_poll_ms must be > 0".into()));
        }
        if self.runtime.tick_interval_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "runtime.tick_interval_ms must be > 0 when set".into(),
            ));
        }
        if self.runtime.max_sensor_failures == Some(0) {
            return Err(ConfigError::Invalid(
                "runtime.max_sensor_failures must be > 0 when set".into(),
            ));
        }
        Ok(())
    }
}
