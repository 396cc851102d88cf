//! Daemon configuration.
//!
//! Loaded from `~/.zen/config.json`. Every field has a default, so a missing
//! file or a partial document is fine.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Duration;

use crate::platform::Permission;
use crate::types::AppId;

/// Directory holding every Zen file, relative to the home directory
pub const ZEN_DIR: &str = ".zen";

/// Config file name
pub const CONFIG_FILE: &str = "config.json";

/// Longest accepted event look-back window (7 days)
const MAX_EVENT_WINDOW_SECS: u64 = 7 * 24 * 60 * 60;

// ============================================================================
// ConfigError
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The home directory could not be determined
    #[error("ホームディレクトリが見つかりません")]
    NoHomeDir,

    /// The config file could not be read
    #[error("設定ファイルを読み込めません ({path}): {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON
    #[error("設定ファイルの形式が不正です ({path}): {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A value is out of range
    #[error("{0}")]
    Invalid(String),
}

impl ConfigError {
    /// Returns true if fixing the file and retrying may succeed.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::NoHomeDir)
    }
}

// ============================================================================
// ZenConfig
// ============================================================================

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_break_minutes() -> u64 {
    5
}

fn default_event_window_secs() -> u64 {
    60 * 60
}

fn default_self_app_id() -> AppId {
    "xyz.zen".to_string()
}

fn default_granted_permissions() -> Vec<Permission> {
    Permission::ALL.to_vec()
}

/// Daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZenConfig {
    /// Seconds between foreground polls (1-3600)
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Break length in minutes (1-120)
    #[serde(default = "default_break_minutes")]
    pub break_minutes: u64,
    /// Settings document (default `~/.zen/settings.json`)
    #[serde(default)]
    pub settings_path: Option<PathBuf>,
    /// IPC socket (default `~/.zen/zen.sock`)
    #[serde(default)]
    pub socket_path: Option<PathBuf>,
    /// Usage event log (default `~/.zen/usage-events.jsonl`)
    #[serde(default)]
    pub events_path: Option<PathBuf>,
    /// The blocker's own app id, never blocked
    #[serde(default = "default_self_app_id")]
    pub self_app_id: AppId,
    /// Display names by app id
    #[serde(default)]
    pub app_names: HashMap<AppId, String>,
    /// Permissions reported as granted
    #[serde(default = "default_granted_permissions")]
    pub granted_permissions: Vec<Permission>,
    /// Look-back window for foreground queries, in seconds
    #[serde(default = "default_event_window_secs")]
    pub event_window_secs: u64,
}

impl Default for ZenConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            break_minutes: default_break_minutes(),
            settings_path: None,
            socket_path: None,
            events_path: None,
            self_app_id: default_self_app_id(),
            app_names: HashMap::new(),
            granted_permissions: default_granted_permissions(),
            event_window_secs: default_event_window_secs(),
        }
    }
}

impl ZenConfig {
    /// Loads the config from the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&default_config_path()?)
    }

    /// Loads the config from `path`. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read, parsed or
    /// validated.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(?path, "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let config: Self = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error message if any value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=3600).contains(&self.poll_interval_secs) {
            return Err(ConfigError::Invalid(
                "監視間隔は1-3600秒の範囲で指定してください".to_string(),
            ));
        }
        if !(1..=120).contains(&self.break_minutes) {
            return Err(ConfigError::Invalid(
                "休憩時間は1-120分の範囲で指定してください".to_string(),
            ));
        }
        if !(1..=MAX_EVENT_WINDOW_SECS).contains(&self.event_window_secs) {
            return Err(ConfigError::Invalid(
                "イベントの検索範囲は1秒から7日の範囲で指定してください".to_string(),
            ));
        }
        Ok(())
    }

    /// Poll interval as a duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Break length as a duration.
    pub fn break_duration(&self) -> Duration {
        Duration::from_secs(self.break_minutes * 60)
    }

    /// Event look-back window.
    pub fn event_window(&self) -> TimeDelta {
        let secs = self.event_window_secs.min(MAX_EVENT_WINDOW_SECS);
        TimeDelta::seconds(i64::try_from(secs).unwrap_or(i64::MAX))
    }

    /// Resolved settings document path.
    ///
    /// # Errors
    ///
    /// Returns an error if the default is needed and there is no home directory.
    pub fn settings_path(&self) -> Result<PathBuf, ConfigError> {
        resolve(self.settings_path.as_deref(), "settings.json")
    }

    /// Resolved IPC socket path.
    ///
    /// # Errors
    ///
    /// Returns an error if the default is needed and there is no home directory.
    pub fn socket_path(&self) -> Result<PathBuf, ConfigError> {
        resolve(self.socket_path.as_deref(), "zen.sock")
    }

    /// Resolved usage event log path.
    ///
    /// # Errors
    ///
    /// Returns an error if the default is needed and there is no home directory.
    pub fn events_path(&self) -> Result<PathBuf, ConfigError> {
        resolve(self.events_path.as_deref(), "usage-events.jsonl")
    }
}

/// Returns `~/.zen`.
///
/// # Errors
///
/// Returns an error if there is no home directory.
pub fn zen_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|home| home.join(ZEN_DIR))
        .ok_or(ConfigError::NoHomeDir)
}

/// Returns `~/.zen/config.json`.
///
/// # Errors
///
/// Returns an error if there is no home directory.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    Ok(zen_dir()?.join(CONFIG_FILE))
}

fn resolve(configured: Option<&Path>, file_name: &str) -> Result<PathBuf, ConfigError> {
    match configured {
        Some(path) => Ok(expand_tilde(path)),
        None => Ok(zen_dir()?.join(file_name)),
    }
}

/// Expands a leading `~/` to the home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

// ============================================================================
// Tests
// ============================================================================
