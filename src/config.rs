use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub routines: RoutinesConfig,
    #[serde(default)]
    pub console: ConsoleConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
    /// Keyword overrides, keyed by command kind (e.g. `[commands.poweroff]`)
    #[serde(default)]
    pub commands: HashMap<String, CommandOverride>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    /// Only used to seed the store on first start; the stored token wins afterwards.
    #[serde(default)]
    pub bot_token: String,
    /// Only used to seed the store when no chat list has been persisted yet.
    #[serde(default)]
    pub allowed_chat_ids: Vec<i64>,
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub database_path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RoutinesConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Consecutive failures before a routine is evicted. 0 keeps retrying forever.
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConsoleConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CameraConfig {
    /// Latest frame written by the external capture process
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,
    #[serde(default)]
    pub motion_on_command: Option<String>,
    #[serde(default)]
    pub motion_off_command: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MaintenanceConfig {
    #[serde(default = "default_heartbeat_cron")]
    pub heartbeat_cron: String,
    #[serde(default = "default_backup_cron")]
    pub backup_cron: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CommandOverride {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_poll_timeout_secs() -> u64 {
    10
}

fn default_retry_backoff_secs() -> u64 {
    1
}

fn default_db_path() -> PathBuf {
    PathBuf::from("domoroom.db")
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_max_failures() -> u32 {
    60
}

fn default_true() -> bool {
    true
}

fn default_read_timeout_secs() -> u64 {
    5
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("snapshots/latest.jpg")
}

fn default_heartbeat_cron() -> String {
    "0 0 * * * *".to_string()
}

fn default_backup_cron() -> String {
    "0 */15 * * * *".to_string()
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            allowed_chat_ids: Vec::new(),
            poll_timeout_secs: default_poll_timeout_secs(),
            retry_backoff_secs: default_retry_backoff_secs(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_db_path(),
        }
    }
}

impl Default for RoutinesConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            max_failures: default_max_failures(),
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            read_timeout_secs: default_read_timeout_secs(),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            snapshot_path: default_snapshot_path(),
            motion_on_command: None,
            motion_off_command: None,
        }
    }
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            heartbeat_cron: default_heartbeat_cron(),
            backup_cron: default_backup_cron(),
        }
    }
}

impl TelegramConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }
}

impl RoutinesConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

impl ConsoleConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;

        if config.telegram.poll_timeout_secs == 0 {
            anyhow::bail!("telegram.poll_timeout_secs must be at least 1");
        }

        Ok(config)
    }
}
