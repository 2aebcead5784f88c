//! Runtime configuration, read from a TOML file.
//!
//! Every key is optional; a missing file yields the defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use log::LevelFilter;
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "./home-env-relay.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Seconds between sampling cycles.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Slots in the offline buffer; one slot is kept free.
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub sensors: SensorConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    /// Upper bound on how long one insert may wait for a locked database.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SensorConfig {
    #[serde(default = "default_true")]
    pub bme280: bool,

    #[serde(default = "default_true")]
    pub mh_z19c: bool,
}

fn default_interval_secs() -> u64 {
    60
}

fn default_buffer_capacity() -> usize {
    600
}

fn default_log_level() -> String {
    "info".into()
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./home-env-log.db")
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            buffer_capacity: default_buffer_capacity(),
            log_level: default_log_level(),
            database: DatabaseConfig::default(),
            sensors: SensorConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            bme280: true,
            mh_z19c: true,
        }
    }
}

impl Config {
    /// Loads and validates the configuration at `path`, falling back to the
    /// defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, anyhow::Error> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
        } else {
            Config::default()
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        anyhow::ensure!(self.interval_secs > 0, "interval_secs must be at least 1");
        anyhow::ensure!(
            self.buffer_capacity >= 2,
            "buffer_capacity must be at least 2, got {}",
            self.buffer_capacity
        );
        self.log_level_filter()?;
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn log_level_filter(&self) -> Result<LevelFilter, anyhow::Error> {
        self.log_level
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid log_level {:?}", self.log_level))
    }
}

impl DatabaseConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}
