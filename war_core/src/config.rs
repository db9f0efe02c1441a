use std::{
    env, fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use thiserror::Error;

use crate::engine::{EngineOptions, IdlePolicy};
use crate::render::Locale;

pub const BUILTIN_MONITOR_CONFIG: &str = include_str!("data/monitor_config.json");
pub const MONITOR_CONFIG_ENV: &str = "WAR_MONITOR_CONFIG_PATH";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub poll_interval_secs: u64,
    pub backoff_multiplier: u32,
    pub mute_attacks: bool,
    pub idle_policy: IdlePolicy,
    pub locale: Locale,
    /// Send a silent notice while the provider is in maintenance.
    pub announce_maintenance: bool,
    pub ledger_path: PathBuf,
    pub api_base_url: String,
    pub sink_base_url: String,
    pub http_timeout_secs: u64,
    /// Poll the league group first and follow every league war of the clan.
    pub follow_league: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            backoff_multiplier: 10,
            mute_attacks: false,
            idle_policy: IdlePolicy::FinalOutcome,
            locale: Locale::English,
            announce_maintenance: false,
            ledger_path: PathBuf::from("warlog.json"),
            api_base_url: "https://api.clashofclans.com/v1".to_string(),
            sink_base_url: "https://api.telegram.org".to_string(),
            http_timeout_secs: 10,
            follow_league: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse monitor config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read monitor config from {path:?}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("poll interval must be at least one second")]
    ZeroInterval,
}

impl MonitorConfig {
    pub fn builtin() -> Self {
        Self::from_json_str(BUILTIN_MONITOR_CONFIG).unwrap_or_default()
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: MonitorConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        MonitorConfig::from_json_str(&contents)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn backoff_interval(&self) -> Duration {
        self.poll_interval() * self.backoff_multiplier.max(1)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            mute_attacks: self.mute_attacks,
            idle_policy: self.idle_policy,
            locale: self.locale,
        }
    }
}

/// Where the active configuration came from; `None` means the builtin.
#[derive(Debug, Clone, Default)]
pub struct MonitorConfigMetadata {
    path: Option<PathBuf>,
}

impl MonitorConfigMetadata {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }
}

/// Load the monitor configuration from `explicit`, else from the path in
/// `WAR_MONITOR_CONFIG_PATH`, falling back to the builtin defaults when the
/// file is absent or invalid.
pub fn load_monitor_config(explicit: Option<&Path>) -> (MonitorConfig, MonitorConfigMetadata) {
    let candidate = explicit
        .map(Path::to_path_buf)
        .or_else(|| env::var(MONITOR_CONFIG_ENV).ok().map(PathBuf::from));

    if let Some(path) = candidate {
        match MonitorConfig::from_file(&path) {
            Ok(config) => {
                tracing::info!(
                    target: "war_monitor::config",
                    path = %path.display(),
                    "monitor_config.loaded=file"
                );
                return (config, MonitorConfigMetadata::new(Some(path)));
            }
            Err(err) => {
                tracing::warn!(
                    target: "war_monitor::config",
                    path = %path.display(),
                    error = %err,
                    "monitor_config.load_failed"
                );
            }
        }
    }

    tracing::info!(
        target: "war_monitor::config",
        "monitor_config.loaded=builtin"
    );
    (MonitorConfig::builtin(), MonitorConfigMetadata::new(None))
}
