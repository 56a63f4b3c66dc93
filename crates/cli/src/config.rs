//! Configuration loading from steward.toml.

use engine::Arbitrators;
use policy::FailMode;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use stewardship::Limits;

/// Top-level configuration. Every table is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub access: AccessConfig,

    /// Lifecycle bounds for grants, appeals and interventions.
    #[serde(default)]
    pub limits: Limits,

    /// Agents seated above the steward layer without a grant.
    #[serde(default)]
    pub arbitration: Arbitrators,

    #[serde(default)]
    pub sweep: SweepConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct StorageConfig {
    /// Database file. Defaults to the platform data directory.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AccessConfig {
    /// How content checks answer when no policy can be resolved.
    #[serde(default)]
    pub fail_mode: FailMode,
}

#[derive(Debug, Deserialize)]
pub struct SweepConfig {
    /// Seconds between deadline sweeps while serving. 0 disables them.
    #[serde(default = "default_sweep_interval")]
    pub interval_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sweep_interval(),
        }
    }
}

fn default_sweep_interval() -> u64 {
    300
}

impl SweepConfig {
    pub fn interval(&self) -> Option<Duration> {
        (self.interval_secs > 0).then(|| Duration::from_secs(self.interval_secs))
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),
}
