//! Logging configuration
//!
//! The core only emits `tracing` events; installing a subscriber is the
//! host's job. This struct carries what the host needs to do so.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::level_filters::LevelFilter;

const LOG_FILE_PREFIX: &str = "avatarflow";

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Level name: trace, debug, info, warn, error or off
    pub level: String,
    /// Directory for log files
    pub log_path: PathBuf,
    /// Number of log files kept by [`LogConfig::cleanup_old_logs`]
    pub max_files: usize,
    /// Log to stderr
    pub console_output: bool,
    /// Log to a file in `log_path`
    pub file_output: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_path: PathBuf::from("logs"),
            max_files: 10,
            console_output: true,
            file_output: false,
        }
    }
}

impl LogConfig {
    /// Parse the configured level, falling back to INFO
    pub fn parse_level(&self) -> LevelFilter {
        self.level.parse().unwrap_or(LevelFilter::INFO)
    }

    /// Create the log directory if needed
    pub fn ensure_log_directory(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.log_path)
    }

    /// Path of today's log file
    pub fn current_log_path(&self) -> PathBuf {
        let date = chrono::Local::now().format("%Y-%m-%d");
        self.log_path.join(format!("{LOG_FILE_PREFIX}_{date}.log"))
    }

    /// Delete the oldest log files beyond `max_files`
    ///
    /// Returns the number of files removed.
    pub fn cleanup_old_logs(&self) -> std::io::Result<usize> {
        if !self.log_path.exists() {
            return Ok(0);
        }

        let mut logs: Vec<PathBuf> = std::fs::read_dir(&self.log_path)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_log_file(path))
            .collect();

        if logs.len() <= self.max_files {
            return Ok(0);
        }

        // Date-stamped names sort chronologically.
        logs.sort();
        let excess = logs.len() - self.max_files;
        for path in &logs[..excess] {
            std::fs::remove_file(path)?;
        }
        Ok(excess)
    }
}

fn is_log_file(path: &Path) -> bool {
    path.is_file()
        && path.extension().is_some_and(|ext| ext == "log")
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(LOG_FILE_PREFIX))
}
