use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

pub const MAX_DISPLAY_TICK_MS: u64 = 1_000;
pub const MAX_RELOCK_INTERVAL_SECS: u64 = 60;
pub const MAX_NOTICE_TTL_SECS: u64 = 86_400;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("failed to parse config file {path}: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },
}

/// Runtime knobs for the board engine.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BoardConfig {
    pub page_size: usize,
    pub display_tick_ms: u64,
    pub relock_interval_secs: u64,
    pub notice_ttl_secs: u64,
    pub max_content_chars: usize,
    pub max_image_bytes: usize,
    pub max_audio_bytes: usize,
    pub engagement_path: PathBuf,
    pub log_level: String,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            page_size: 20,
            display_tick_ms: 1_000,
            relock_interval_secs: 30,
            notice_ttl_secs: 3,
            max_content_chars: 2_000,
            max_image_bytes: 5 * 1024 * 1024,
            max_audio_bytes: 10 * 1024 * 1024,
            engagement_path: PathBuf::from("capsule-engagement.db"),
            log_level: "info".to_string(),
        }
    }
}

impl BoardConfig {
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        let cfg: BoardConfig = toml::from_str(&raw).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
        Ok(cfg.normalized())
    }

    /// Clamps cadences and sizes into their supported ranges.
    pub fn normalized(mut self) -> Self {
        self.page_size = self.page_size.max(1);
        self.display_tick_ms = self.display_tick_ms.clamp(50, MAX_DISPLAY_TICK_MS);
        self.relock_interval_secs = self.relock_interval_secs.clamp(1, MAX_RELOCK_INTERVAL_SECS);
        self.notice_ttl_secs = self.notice_ttl_secs.min(MAX_NOTICE_TTL_SECS);
        self.max_content_chars = self.max_content_chars.max(1);
        self
    }

    pub fn display_tick(&self) -> Duration {
        Duration::from_millis(self.display_tick_ms.clamp(50, MAX_DISPLAY_TICK_MS))
    }

    pub fn relock_interval(&self) -> Duration {
        Duration::from_secs(self.relock_interval_secs.clamp(1, MAX_RELOCK_INTERVAL_SECS))
    }

    pub fn notice_ttl(&self) -> chrono::Duration {
        let secs = self.notice_ttl_secs.min(MAX_NOTICE_TTL_SECS) as i64;
        chrono::Duration::try_seconds(secs).unwrap_or_else(chrono::Duration::zero)
    }
}
