use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::diagnostics::DEFAULT_LOG_CAPACITY;
use crate::error::{Result, WealthError};
use crate::importer::{BlankCellPolicy, ParseOptions};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub data_dir: String,
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,
    #[serde(default)]
    pub strict_categories: bool,
    #[serde(default)]
    pub matrix_blank_cell: BlankCellPolicy,
    #[serde(default = "default_log_buffer_size")]
    pub log_buffer_size: usize,
    #[serde(default = "default_progress_every_rows")]
    pub progress_every_rows: usize,
    #[serde(default = "default_progress_every_ms")]
    pub progress_every_ms: u64,
}

fn default_max_file_size_mb() -> u64 {
    25
}

fn default_log_buffer_size() -> usize {
    DEFAULT_LOG_CAPACITY
}

fn default_progress_every_rows() -> usize {
    250
}

fn default_progress_every_ms() -> u64 {
    300
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir().to_string_lossy().to_string(),
            max_file_size_mb: default_max_file_size_mb(),
            strict_categories: false,
            matrix_blank_cell: BlankCellPolicy::default(),
            log_buffer_size: default_log_buffer_size(),
            progress_every_rows: default_progress_every_rows(),
            progress_every_ms: default_progress_every_ms(),
        }
    }
}

impl Settings {
    pub fn max_file_bytes(&self) -> u64 {
        self.max_file_size_mb.saturating_mul(1024 * 1024)
    }
}

impl From<&Settings> for ParseOptions {
    fn from(s: &Settings) -> Self {
        ParseOptions {
            max_file_bytes: s.max_file_bytes(),
            strict_categories: s.strict_categories,
            blank_cell: s.matrix_blank_cell,
            progress_every_rows: s.progress_every_rows.max(1),
            progress_every: Duration::from_millis(s.progress_every_ms),
            log_capacity: s.log_buffer_size.max(1),
        }
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("wealthdeck")
}

pub fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Documents")
        .join("wealthdeck")
}

pub fn load_settings() -> Settings {
    load_settings_from(&settings_path())
}

/// Missing or unreadable files fall back to defaults; missing fields take
/// their individual defaults.
pub fn load_settings_from(path: &Path) -> Settings {
    let Ok(content) = std::fs::read_to_string(path) else {
        return Settings::default();
    };
    match serde_json::from_str(&content) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable settings file");
            Settings::default()
        }
    }
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    save_settings_to(settings, &settings_path())
}

pub fn save_settings_to(settings: &Settings, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| WealthError::Settings(e.to_string()))?;
    std::fs::write(path, format!("{json}\n"))?;
    Ok(())
}

pub fn settings_file_exists() -> bool {
    settings_path().exists()
}

pub fn get_data_dir() -> PathBuf {
    PathBuf::from(&load_settings().data_dir)
}

pub fn shellexpand_path(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| PathBuf::from(path))
        .to_string_lossy()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let settings = Settings {
            data_dir: "/tmp/test".to_string(),
            max_file_size_mb: 5,
            strict_categories: true,
            matrix_blank_cell: BlankCellPolicy::SkipCell,
            ..Settings::default()
        };
        save_settings_to(&settings, &path).unwrap();
        assert_eq!(load_settings_from(&path), settings);
    }

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.max_file_size_mb, 25);
        assert_eq!(s.max_file_bytes(), 25 * 1024 * 1024);
        assert!(!s.strict_categories);
        assert_eq!(s.matrix_blank_cell, BlankCellPolicy::StopRow);
        assert_eq!(s.log_buffer_size, 200);
        assert!(s.data_dir.ends_with("wealthdeck"));
    }

    #[test]
    fn test_load_merges_with_defaults() {
        let json = r#"{"data_dir": "/tmp/test", "matrix_blank_cell": "skip_cell"}"#;
        let s: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(s.data_dir, "/tmp/test");
        assert_eq!(s.matrix_blank_cell, BlankCellPolicy::SkipCell);
        assert_eq!(s.max_file_size_mb, 25);
        assert_eq!(s.progress_every_ms, 300);
    }

    #[test]
    fn test_missing_or_corrupt_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        assert_eq!(load_settings_from(&path), Settings::default());
        std::fs::write(&path, "{oops").unwrap();
        assert_eq!(load_settings_from(&path), Settings::default());
    }

    #[test]
    fn test_save_creates_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deep").join("nested").join("settings.json");
        save_settings_to(&Settings::default(), &path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_parse_options_from_settings() {
        let settings = Settings {
            max_file_size_mb: 2,
            progress_every_rows: 0,
            progress_every_ms: 50,
            ..Settings::default()
        };
        let options = ParseOptions::from(&settings);
        assert_eq!(options.max_file_bytes, 2 * 1024 * 1024);
        assert_eq!(options.progress_every_rows, 1);
        assert_eq!(options.progress_every, Duration::from_millis(50));
        assert_eq!(options.blank_cell, BlankCellPolicy::StopRow);
    }
}
