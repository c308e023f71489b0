//! MoMo Bot configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use chrono_tz::Tz;

use crate::error::{MomoError, Result};
use crate::types::NotifyTime;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MomoConfig {
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl MomoConfig {
    /// Load config from the default path (~/.momo/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| MomoError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| MomoError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Apply environment overrides (`BOT_TOKEN`).
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(token) = std::env::var("BOT_TOKEN")
            && !token.trim().is_empty()
        {
            tracing::debug!("🔑 Bot token taken from BOT_TOKEN");
            self.bot.bot_token = token.trim().to_string();
        }
        self
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the MoMo home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".momo")
    }
}

/// Telegram bot settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,
}

fn default_poll_interval() -> u64 { 1 }
fn default_send_timeout() -> u64 { 10 }

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            poll_interval: default_poll_interval(),
            send_timeout_secs: default_send_timeout(),
        }
    }
}

/// Trigger settings. One zone for every user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_hour")]
    pub default_hour: u32,
    #[serde(default = "default_minute")]
    pub default_minute: u32,
    /// How often due jobs are checked; also bounds the reschedule gap.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
}

fn default_timezone() -> String { "Europe/Madrid".into() }
fn default_hour() -> u32 { 12 }
fn default_minute() -> u32 { 0 }
fn default_tick_secs() -> u64 { 20 }

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            default_hour: default_hour(),
            default_minute: default_minute(),
            tick_secs: default_tick_secs(),
        }
    }
}

impl ScheduleConfig {
    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| MomoError::Config(format!("Unknown timezone '{}': {e}", self.timezone)))
    }

    pub fn default_time(&self) -> Result<NotifyTime> {
        NotifyTime::new(self.default_hour, self.default_minute)
    }
}

/// Dataset download settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    #[serde(default = "default_dataset_url")]
    pub url: String,
    #[serde(default = "default_cache_file")]
    pub cache_file: String,
    #[serde(default = "default_refresh_hour")]
    pub refresh_hour: u32,
    #[serde(default = "default_refresh_minute")]
    pub refresh_minute: u32,
    #[serde(default = "default_dataset_timeout")]
    pub timeout_secs: u64,
}

fn default_dataset_url() -> String { "https://momo.isciii.es/public/momo/data".into() }
fn default_cache_file() -> String { "~/.momo/momo.csv".into() }
fn default_refresh_hour() -> u32 { 4 }
fn default_refresh_minute() -> u32 { 0 }
fn default_dataset_timeout() -> u64 { 60 }

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            url: default_dataset_url(),
            cache_file: default_cache_file(),
            refresh_hour: default_refresh_hour(),
            refresh_minute: default_refresh_minute(),
            timeout_secs: default_dataset_timeout(),
        }
    }
}

impl DatasetConfig {
    pub fn refresh_time(&self) -> Result<NotifyTime> {
        NotifyTime::new(self.refresh_hour, self.refresh_minute)
    }

    pub fn cache_path(&self) -> PathBuf {
        expand_path(&self.cache_file)
    }
}

/// SQLite location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String { "~/.momo/momo_bot.db".into() }

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl StorageConfig {
    pub fn path(&self) -> PathBuf {
        expand_path(&self.db_path)
    }
}

/// Expand a leading `~`.
pub fn expand_path(p: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(p).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = MomoConfig::default();
        assert_eq!(cfg.schedule.timezone, "Europe/Madrid");
        assert_eq!(cfg.schedule.default_time().unwrap(), NotifyTime::default());
        assert_eq!(cfg.dataset.refresh_time().unwrap().hour(), 4);
        assert!(cfg.schedule.tz().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let cfg: MomoConfig = toml::from_str(
            r#"
            [bot]
            bot_token = "123:abc"

            [schedule]
            timezone = "Atlantic/Canary"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.bot.bot_token, "123:abc");
        assert_eq!(cfg.bot.poll_interval, 1);
        assert_eq!(cfg.schedule.tz().unwrap(), chrono_tz::Atlantic::Canary);
        assert_eq!(cfg.schedule.tick_secs, 20);
        assert_eq!(cfg.dataset.timeout_secs, 60);
    }

    #[test]
    fn test_bad_timezone() {
        let cfg = ScheduleConfig {
            timezone: "Mars/Olympus".into(),
            ..Default::default()
        };
        assert!(matches!(cfg.tz(), Err(MomoError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[storage]\ndb_path = \"/tmp/momo-test.db\"\n").unwrap();
        let cfg = MomoConfig::load_from(&path).unwrap();
        assert_eq!(cfg.storage.path(), PathBuf::from("/tmp/momo-test.db"));
    }
}
