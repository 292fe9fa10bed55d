use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::models::{MIN_INTERVAL_SECS, MonitorConfig};
use crate::monitor::SchedulerSettings;
use crate::probe::{MIN_PROBE_TIMEOUT, ProbeBackend};

const ENV_PREFIX: &str = "LIGHTWATCH_";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file at {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse TOML from config file at {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to load config from environment: {0}")]
    Env(#[from] envy::Error),
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("{key} must be at least {min}")]
    TooSmall { key: &'static str, min: u64 },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bot_token: String,
    /// Chats allowed to talk to the bot. Empty means everyone.
    pub allowed_chat_ids: Vec<i64>,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub default_interval_secs: u64,
    pub probe_timeout_secs: u64,
    pub probe_samples: u32,
    pub probe_backend: ProbeBackend,
    pub backoff_secs: u64,
    pub notify_on_initial: bool,
    pub reminder_every_cycles: u32,
    pub poll_timeout_secs: u64,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
struct PartialAppConfig {
    bot_token: Option<String>,
    allowed_chat_ids: Option<Vec<i64>>,
    data_dir: Option<PathBuf>,
    log_dir: Option<PathBuf>,
    default_interval_secs: Option<u64>,
    probe_timeout_secs: Option<u64>,
    probe_samples: Option<u32>,
    probe_backend: Option<ProbeBackend>,
    backoff_secs: Option<u64>,
    notify_on_initial: Option<bool>,
    reminder_every_cycles: Option<u32>,
    poll_timeout_secs: Option<u64>,
}

impl PartialAppConfig {
    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn from_env() -> Result<Self, ConfigError> {
        Ok(envy::prefixed(ENV_PREFIX).from_env::<Self>()?)
    }

    /// Fields set in `self` win over `other`.
    fn or(self, other: Self) -> Self {
        Self {
            bot_token: self.bot_token.or(other.bot_token),
            allowed_chat_ids: self.allowed_chat_ids.or(other.allowed_chat_ids),
            data_dir: self.data_dir.or(other.data_dir),
            log_dir: self.log_dir.or(other.log_dir),
            default_interval_secs: self.default_interval_secs.or(other.default_interval_secs),
            probe_timeout_secs: self.probe_timeout_secs.or(other.probe_timeout_secs),
            probe_samples: self.probe_samples.or(other.probe_samples),
            probe_backend: self.probe_backend.or(other.probe_backend),
            backoff_secs: self.backoff_secs.or(other.backoff_secs),
            notify_on_initial: self.notify_on_initial.or(other.notify_on_initial),
            reminder_every_cycles: self.reminder_every_cycles.or(other.reminder_every_cycles),
            poll_timeout_secs: self.poll_timeout_secs.or(other.poll_timeout_secs),
        }
    }

    fn finish(self) -> Result<AppConfig, ConfigError> {
        let config = AppConfig {
            bot_token: self.bot_token.ok_or(ConfigError::Missing("bot_token"))?,
            allowed_chat_ids: self.allowed_chat_ids.unwrap_or_default(),
            data_dir: self.data_dir.unwrap_or_else(|| PathBuf::from("data")),
            log_dir: self.log_dir.unwrap_or_else(|| PathBuf::from("logs")),
            default_interval_secs: self.default_interval_secs.unwrap_or(60),
            probe_timeout_secs: self.probe_timeout_secs.unwrap_or(5),
            probe_samples: self.probe_samples.unwrap_or(3),
            probe_backend: self.probe_backend.unwrap_or_default(),
            backoff_secs: self.backoff_secs.unwrap_or(60),
            notify_on_initial: self.notify_on_initial.unwrap_or(true),
            reminder_every_cycles: self.reminder_every_cycles.unwrap_or(0),
            poll_timeout_secs: self.poll_timeout_secs.unwrap_or(30),
        };

        for (key, value, min) in [
            ("default_interval_secs", config.default_interval_secs, MIN_INTERVAL_SECS),
            ("probe_timeout_secs", config.probe_timeout_secs, MIN_PROBE_TIMEOUT.as_secs()),
            ("probe_samples", config.probe_samples as u64, 1),
            ("backoff_secs", config.backoff_secs, 1),
        ] {
            if value < min {
                return Err(ConfigError::TooSmall { key, min });
            }
        }
        Ok(config)
    }
}

impl AppConfig {
    /// Loads the config from an optional TOML file, then lets `LIGHTWATCH_*`
    /// environment variables (including those from `.env`) override it.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let file_config = match config_path {
            Some(path) => PartialAppConfig::from_file(path)?,
            None => PartialAppConfig::default(),
        };
        PartialAppConfig::from_env()?.or(file_config).finish()
    }

    /// Parses a config from TOML text without consulting the environment.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let partial: PartialAppConfig = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        partial.finish()
    }

    pub fn is_chat_allowed(&self, chat_id: i64) -> bool {
        self.allowed_chat_ids.is_empty() || self.allowed_chat_ids.contains(&chat_id)
    }

    /// Settings a subject gets before it configures anything itself.
    pub fn default_monitor_config(&self) -> MonitorConfig {
        MonitorConfig::with_interval(self.default_interval_secs)
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            probe_timeout: Duration::from_secs(self.probe_timeout_secs),
            probe_samples: self.probe_samples,
            backoff: Duration::from_secs(self.backoff_secs),
            notify_on_initial: self.notify_on_initial,
            reminder_every_cycles: self.reminder_every_cycles,
            ..SchedulerSettings::default()
        }
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }
}
