//! Daemon configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via LIVEDM_CONFIG)
//! 3. Environment variables

use livedm_client::{ReconnectPolicy, SessionConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Room to join and the credentials to join it with.
    pub room: RoomConfig,
    /// Connection tuning.
    pub session: SessionSettings,
    /// Event archive.
    pub archive: ArchiveConfig,
    /// Gift catalog.
    pub catalog: CatalogConfig,
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("LIVEDM_CONFIG") {
            config = Self::from_file(&path)?;
        }

        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides read through `lookup` (normally the process environment).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        self.room.apply_overrides(&lookup);
        self.session.apply_overrides(&lookup);
        self.archive.apply_overrides(&lookup);
        self.catalog.apply_overrides(&lookup);
    }

    /// Checks the settings the daemon cannot start without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.room.room_id == 0 {
            return Err(ConfigError::Validation(
                "room.room_id must be set (LIVEDM_ROOM_ID)".to_string(),
            ));
        }
        if !(self.room.server_url.starts_with("ws://") || self.room.server_url.starts_with("wss://"))
        {
            return Err(ConfigError::Validation(format!(
                "room.server_url must be a ws:// or wss:// URL, got '{}'",
                self.room.server_url
            )));
        }
        if self.session.heartbeat_secs == 0 {
            return Err(ConfigError::Validation(
                "session.heartbeat_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Builds the session configuration for the configured room.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::new(&self.room.server_url, self.room.room_id)
            .with_uid(self.room.uid)
            .with_auth_token(&self.room.auth_token)
            .with_heartbeat_interval(self.session.heartbeat_interval())
            .with_connect_timeout(Duration::from_secs(self.session.connect_timeout_secs))
            .with_reconnect_policy(ReconnectPolicy::new(
                Duration::from_millis(self.session.reconnect_step_ms),
                self.session.max_retries,
            ))
    }
}

/// Room bootstrap data.
///
/// Normally produced by the platform's room-info HTTP call; here it is
/// supplied directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// Push server WebSocket URL.
    pub server_url: String,
    pub room_id: u64,
    /// Streamer's uid.
    pub owner_uid: u64,
    /// Viewer uid to authenticate as (0 = anonymous).
    pub uid: u64,
    /// Token from the room-info call.
    pub auth_token: String,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            server_url: "wss://broadcastlv.chat.bilibili.com:443/sub".to_string(),
            room_id: 0,
            owner_uid: 0,
            uid: 0,
            auth_token: String::new(),
        }
    }
}

impl RoomConfig {
    fn apply_overrides(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("LIVEDM_SERVER_URL") {
            self.server_url = url;
        }

        if let Some(room) = lookup("LIVEDM_ROOM_ID") {
            if let Ok(id) = room.parse() {
                self.room_id = id;
            }
        }

        if let Some(uid) = lookup("LIVEDM_UID") {
            if let Ok(uid) = uid.parse() {
                self.uid = uid;
            }
        }

        if let Some(token) = lookup("LIVEDM_TOKEN") {
            self.auth_token = token;
        }
    }
}

/// Connection tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Heartbeat interval in seconds.
    pub heartbeat_secs: u64,
    /// WebSocket open timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Whether unplanned closes are followed by a reconnect.
    pub auto_reconnect: bool,
    /// Reconnect delay step; attempt n waits n steps.
    pub reconnect_step_ms: u64,
    /// Retry counter cap.
    pub max_retries: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            heartbeat_secs: livedm_protocol::HEARTBEAT_INTERVAL_SECS,
            connect_timeout_secs: 10,
            auto_reconnect: true,
            reconnect_step_ms: 1000,
            max_retries: 5,
        }
    }
}

impl SessionSettings {
    fn apply_overrides(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        if let Some(secs) = lookup("LIVEDM_HEARTBEAT_SECS") {
            if let Ok(secs) = secs.parse() {
                self.heartbeat_secs = secs;
            }
        }

        if let Some(flag) = lookup("LIVEDM_AUTO_RECONNECT") {
            self.auto_reconnect = flag == "1" || flag.to_lowercase() == "true";
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }
}

/// Event archive configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub enabled: bool,
    /// Directory holding one `<room_id>.jsonl` file per room.
    pub dir: PathBuf,
    /// Whether to read the room's archive back at startup.
    pub replay_on_start: bool,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from("./archive"),
            replay_on_start: true,
        }
    }
}

impl ArchiveConfig {
    fn apply_overrides(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup("LIVEDM_ARCHIVE_DIR") {
            self.dir = PathBuf::from(dir);
        }
    }
}

/// Gift catalog configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// JSON catalog file; gifts are not enriched when unset.
    pub path: Option<PathBuf>,
}

impl CatalogConfig {
    fn apply_overrides(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("LIVEDM_GIFT_CATALOG") {
            self.path = Some(PathBuf::from(path));
        }
    }
}

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),

    #[error("failed to parse config file '{}': {}", .0.display(), .1)]
    Parse(PathBuf, #[source] serde_yaml::Error),

    #[error("configuration validation failed: {0}")]
    Validation(String),
}
