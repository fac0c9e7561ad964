use std::path::PathBuf;

use capsule::config::{BoardConfig, ConfigError};
use chrono::NaiveDateTime;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "capsule-board", about = "Browse and write time capsules from the terminal")]
pub struct Cli {
    /// TOML file with board settings; flags below override it.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// JSON file with `posts` and `comments` to seed the in-memory store.
    #[arg(long)]
    pub seed: Option<PathBuf>,
    #[arg(long)]
    pub page_size: Option<usize>,
    #[arg(long)]
    pub display_tick_ms: Option<u64>,
    #[arg(long)]
    pub relock_interval_secs: Option<u64>,
    #[arg(long)]
    pub engagement_path: Option<PathBuf>,
    #[arg(long)]
    pub log_level: Option<String>,
    /// Pins the board clock, e.g. `2025-01-01T09:00:00`.
    #[arg(long)]
    pub now: Option<NaiveDateTime>,
}

impl Cli {
    pub fn load_config(&self) -> Result<BoardConfig, ConfigError> {
        match &self.config {
            Some(path) => BoardConfig::from_toml_file(path),
            None => Ok(BoardConfig::default()),
        }
    }

    pub fn merge_into_config(&self, mut cfg: BoardConfig) -> BoardConfig {
        if let Some(v) = self.page_size {
            cfg.page_size = v;
        }
        if let Some(v) = self.display_tick_ms {
            cfg.display_tick_ms = v;
        }
        if let Some(v) = self.relock_interval_secs {
            cfg.relock_interval_secs = v;
        }
        if let Some(v) = &self.engagement_path {
            cfg.engagement_path = v.clone();
        }
        if let Some(v) = &self.log_level {
            cfg.log_level = v.clone();
        }
        cfg.normalized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn flags_override_file_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "page_size = 5\nrelock_interval_secs = 10\nlog_level = \"warn\"").unwrap();
        let path = file.path().to_string_lossy().to_string();
        let cli = Cli::parse_from(["capsule-board", "--config", &path, "--relock-interval-secs", "120"]);
        let cfg = cli.merge_into_config(cli.load_config().unwrap());
        assert_eq!(cfg.page_size, 5);
        assert_eq!(cfg.relock_interval_secs, 60);
        assert_eq!(cfg.log_level, "warn");
    }

    #[test]
    fn pinned_clock_parses() {
        let cli = Cli::parse_from(["capsule-board", "--now", "2025-01-01T09:00:00"]);
        assert_eq!(cli.now.unwrap().to_string(), "2025-01-01 09:00:00");
        assert!(cli.config.is_none());
    }
}
