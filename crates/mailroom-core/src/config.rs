//! Configuration management for Mailroom

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Environment variable that overrides `api.base_url`
pub const API_URL_ENV: &str = "MAILROOM_API_URL";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Mail service connection settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Job polling cadence
    #[serde(default)]
    pub polling: PollingConfig,

    /// Mailbox view settings
    #[serde(default)]
    pub mailbox: MailboxConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory for rolling log files (daemon only)
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Write daemon logs to `log_dir` in addition to stderr
    #[serde(default)]
    pub log_to_file: bool,

    /// Data directory path
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_dir: default_log_dir(),
            log_to_file: false,
            data_dir: default_data_dir(),
        }
    }
}

/// Mail service connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the REST API, including the version prefix
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Global rate limit (requests per second)
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_second: u32,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
            rate_limit_per_second: default_rate_limit(),
            user_agent: default_user_agent(),
        }
    }
}

impl ApiConfig {
    /// Request timeout as a Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Poll cadence for server-side jobs (all values in milliseconds)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Delay before the first classification status poll
    #[serde(default = "default_initial_delay_ms")]
    pub classification_initial_delay_ms: u64,

    /// Delay between the end of one classification poll and the next
    #[serde(default = "default_interval_ms")]
    pub classification_interval_ms: u64,

    /// Settle delay between a completed batch and the backlog re-check
    #[serde(default = "default_continuation_delay_ms")]
    pub continuation_delay_ms: u64,

    /// Delay between sync status polls while a sync is running
    #[serde(default = "default_interval_ms")]
    pub sync_interval_ms: u64,

    /// How often the daemon refreshes folder counts (seconds)
    #[serde(default = "default_count_refresh_secs")]
    pub count_refresh_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            classification_initial_delay_ms: default_initial_delay_ms(),
            classification_interval_ms: default_interval_ms(),
            continuation_delay_ms: default_continuation_delay_ms(),
            sync_interval_ms: default_interval_ms(),
            count_refresh_secs: default_count_refresh_secs(),
        }
    }
}

/// Mailbox view settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailboxConfig {
    /// Mails per page in list views
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Start classification automatically when unclassified mail exists
    #[serde(default = "default_true")]
    pub auto_classify: bool,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            auto_classify: true,
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    get_data_dir().join("logs")
}

fn default_data_dir() -> PathBuf {
    get_data_dir()
}

fn default_base_url() -> String {
    "http://localhost:8000/v1".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_rate_limit() -> u32 {
    20
}

fn default_user_agent() -> String {
    format!("{}/{}", crate::APP_NAME, env!("CARGO_PKG_VERSION"))
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_interval_ms() -> u64 {
    3000
}

fn default_continuation_delay_ms() -> u64 {
    1000
}

fn default_count_refresh_secs() -> u64 {
    30
}

fn default_page_size() -> u32 {
    20
}

fn default_true() -> bool {
    true
}

/// Get the data directory (XDG: ~/.local/share/mailroom)
fn get_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".local")
        .join("share")
        .join(crate::APP_NAME)
}

/// Get the config directory (XDG: ~/.config/mailroom)
pub fn get_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join(crate::APP_NAME)
}

impl Config {
    /// Default config file location
    pub fn default_path() -> PathBuf {
        get_config_dir().join("config.toml")
    }

    /// Load configuration from the default path, then apply env overrides
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::default_path())?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&contents)?;
            info!("Loaded configuration from {:?}", path);
            Ok(config)
        } else {
            info!("No config file found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents =
            toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, contents)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Apply `MAILROOM_API_URL` if set
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                self.api.base_url = url;
            }
        }
    }

    /// Reject settings that cannot work
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.api.base_url).map_err(|e| Error::InvalidConfig {
            field: "api.base_url".to_string(),
            reason: e.to_string(),
        })?;
        if self.polling.classification_interval_ms == 0 || self.polling.sync_interval_ms == 0 {
            return Err(Error::InvalidConfig {
                field: "polling".to_string(),
                reason: "poll intervals must be greater than zero".to_string(),
            });
        }
        if self.mailbox.page_size == 0 {
            return Err(Error::InvalidConfig {
                field: "mailbox.page_size".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Path of the stored login tokens
    pub fn token_file(&self) -> PathBuf {
        get_config_dir().join("session.json")
    }

    /// Poll cadence for classification jobs
    pub fn classification_cadence(&self) -> crate::orchestrator::PollCadence {
        crate::orchestrator::PollCadence {
            initial_delay: Duration::from_millis(self.polling.classification_initial_delay_ms),
            interval: Duration::from_millis(self.polling.classification_interval_ms),
        }
    }

    /// Poll cadence for sync jobs
    pub fn sync_cadence(&self) -> crate::orchestrator::PollCadence {
        let interval = Duration::from_millis(self.polling.sync_interval_ms);
        crate::orchestrator::PollCadence {
            initial_delay: interval,
            interval,
        }
    }

    /// Settle delay between a completed batch and the backlog re-check
    pub fn continuation_delay(&self) -> Duration {
        Duration::from_millis(self.polling.continuation_delay_ms)
    }
}
