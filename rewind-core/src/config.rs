//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/rewind/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/rewind/` (~/.config/rewind/)
//! - Data: `$XDG_DATA_HOME/rewind/` (~/.local/share/rewind/)
//! - State/Logs: `$XDG_STATE_HOME/rewind/` (~/.local/state/rewind/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Stats engine configuration
    #[serde(default)]
    pub stats: StatsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Stats engine configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StatsConfig {
    /// Seconds a cached aggregate stays fresh
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: i64,

    /// Entries per ranked list
    #[serde(default = "default_top_limit")]
    pub top_limit: usize,

    /// Maximum gap between plays of one binge session
    #[serde(default = "default_binge_gap_secs")]
    pub binge_gap_secs: i64,

    /// Sample plays kept for the marathon day
    #[serde(default = "default_marathon_sample_size")]
    pub marathon_sample_size: usize,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
            top_limit: default_top_limit(),
            binge_gap_secs: default_binge_gap_secs(),
            marathon_sample_size: default_marathon_sample_size(),
        }
    }
}

impl StatsConfig {
    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.cache_ttl_secs < 0 {
            return Err(Error::Config(
                "stats.cache_ttl_secs must not be negative".to_string(),
            ));
        }
        if self.top_limit == 0 {
            return Err(Error::Config(
                "stats.top_limit must be at least 1".to_string(),
            ));
        }
        if self.binge_gap_secs <= 0 {
            return Err(Error::Config(
                "stats.binge_gap_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_cache_ttl_secs() -> i64 {
    86_400
}

fn default_top_limit() -> usize {
    crate::stats::ranking::DEFAULT_LIMIT
}

fn default_binge_gap_secs() -> i64 {
    crate::stats::binge::DEFAULT_GAP_SECS
}

fn default_marathon_sample_size() -> usize {
    crate::stats::marathon::DEFAULT_SAMPLE_SIZE
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.stats.validate()?;
        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/rewind/config.toml` (~/.config/rewind/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("rewind").join("config.toml")
    }

    /// Returns the data directory path (for SQLite database)
    ///
    /// `$XDG_DATA_HOME/rewind/` (~/.local/share/rewind/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("rewind")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/rewind/` (~/.local/state/rewind/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("rewind")
    }

    /// Returns the database file path
    ///
    /// `$XDG_DATA_HOME/rewind/history.db` (~/.local/share/rewind/history.db)
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("history.db")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/rewind/rewind.log` (~/.local/state/rewind/rewind.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("rewind.log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.stats.cache_ttl_secs, 86_400);
        assert_eq!(config.stats.top_limit, 10);
        assert_eq!(config.stats.binge_gap_secs, 1800);
        assert_eq!(config.logging.level, "info");
        assert!(config.stats.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[stats]
cache_ttl_secs = 3600
top_limit = 5

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.stats.cache_ttl_secs, 3600);
        assert_eq!(config.stats.top_limit, 5);
        assert_eq!(config.stats.marathon_sample_size, 10);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.max_files, 5);
    }

    #[test]
    fn test_stats_config_validation() {
        let config = StatsConfig {
            top_limit: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = StatsConfig {
            binge_gap_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = StatsConfig {
            cache_ttl_secs: -1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[stats]\nbinge_gap_secs = 900").unwrap();
        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.stats.binge_gap_secs, 900);

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        writeln!(bad, "[stats]\ntop_limit = 0").unwrap();
        assert!(matches!(Config::load_from(bad.path()), Err(Error::Config(_))));
    }

    #[test]
    fn test_paths() {
        assert!(Config::database_path().ends_with("rewind/history.db"));
        assert!(Config::log_path().ends_with("rewind/rewind.log"));
    }
}
