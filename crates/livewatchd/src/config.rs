//! Daemon configuration loaded from a TOML file.
//!
//! ```toml
//! [settings]
//! scan_interval_minutes = 5
//! platform_delay_min_seconds = 5
//! platform_delay_max_seconds = 20
//! database = "livewatch.db"
//! avatar_dir = "avatars"
//!
//! [[targets]]
//! id = "alice"
//! name = "Alice"
//! platform = "bilibili"
//! room_id = "12345"
//! ```
//!
//! Every setting is optional. Relative paths are resolved against the
//! directory holding the config file.

use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use livewatch_core::{DomainError, Target};

/// Environment variable naming the config file when `--config` is absent.
pub const CONFIG_ENV: &str = "LIVEWATCH_CONFIG";

pub const DEFAULT_SCAN_INTERVAL_MINUTES: u64 = 5;
pub const DEFAULT_DELAY_MIN_SECONDS: u64 = 5;
pub const DEFAULT_DELAY_MAX_SECONDS: u64 = 20;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("duplicate target id '{0}'")]
    DuplicateTarget(String),

    #[error(transparent)]
    InvalidTarget(#[from] DomainError),

    #[error("no config path given and no config directory available")]
    NoConfigDir,
}

// ============================================================================
// Settings
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    /// Cycle cadence; also the skip-if-recently-queried threshold.
    #[serde(default = "default_scan_interval_minutes")]
    pub scan_interval_minutes: u64,
    #[serde(default = "default_delay_min_seconds")]
    pub platform_delay_min_seconds: u64,
    #[serde(default = "default_delay_max_seconds")]
    pub platform_delay_max_seconds: u64,
    #[serde(default)]
    pub database: Option<PathBuf>,
    /// Directory for cached avatar images. `None` disables the avatar cache.
    #[serde(default)]
    pub avatar_dir: Option<PathBuf>,
}

fn default_scan_interval_minutes() -> u64 {
    DEFAULT_SCAN_INTERVAL_MINUTES
}

fn default_delay_min_seconds() -> u64 {
    DEFAULT_DELAY_MIN_SECONDS
}

fn default_delay_max_seconds() -> u64 {
    DEFAULT_DELAY_MAX_SECONDS
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            scan_interval_minutes: DEFAULT_SCAN_INTERVAL_MINUTES,
            platform_delay_min_seconds: DEFAULT_DELAY_MIN_SECONDS,
            platform_delay_max_seconds: DEFAULT_DELAY_MAX_SECONDS,
            database: None,
            avatar_dir: None,
        }
    }
}

impl Settings {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_minutes.saturating_mul(60))
    }

    pub fn delay_min(&self) -> Duration {
        Duration::from_secs(self.platform_delay_min_seconds)
    }

    pub fn delay_max(&self) -> Duration {
        Duration::from_secs(self.platform_delay_max_seconds)
    }

    /// Database path, falling back to the platform data directory.
    pub fn database_path(&self) -> PathBuf {
        self.database.clone().unwrap_or_else(default_database_path)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.scan_interval_minutes == 0 {
            return Err(ConfigError::InvalidSettings(
                "scan_interval_minutes must be greater than zero".to_string(),
            ));
        }
        if self.platform_delay_min_seconds > self.platform_delay_max_seconds {
            return Err(ConfigError::InvalidSettings(format!(
                "platform_delay_min_seconds ({}) exceeds platform_delay_max_seconds ({})",
                self.platform_delay_min_seconds, self.platform_delay_max_seconds
            )));
        }
        Ok(())
    }
}

fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("livewatch")
        .join("livewatch.db")
}

// ============================================================================
// Config
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
    /// Monitored targets, in scan order.
    #[serde(default)]
    pub targets: Vec<Target>,
}

impl Config {
    /// Reads, parses and validates the file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let mut config = Self::from_toml(&raw)?;
        if let Some(base) = path.parent() {
            config.resolve_relative_paths(base);
        }
        Ok(config)
    }

    /// Parses and validates config text.
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.settings.validate()?;

        let mut seen = HashSet::new();
        for target in &self.targets {
            target.validate()?;
            if !seen.insert(target.id.as_str()) {
                return Err(ConfigError::DuplicateTarget(target.id.to_string()));
            }
        }
        Ok(())
    }

    pub fn target(&self, id: &str) -> Option<&Target> {
        self.targets.iter().find(|t| t.id.as_str() == id)
    }

    fn resolve_relative_paths(&mut self, base: &Path) {
        for path in [&mut self.settings.database, &mut self.settings.avatar_dir]
            .into_iter()
            .flatten()
        {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}

// ============================================================================
// Path resolution
// ============================================================================

/// Picks the config file: explicit flag, then [`CONFIG_ENV`], then the
/// per-user config directory.
pub fn resolve_path(cli: Option<PathBuf>, env: Option<OsString>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = cli {
        return Ok(path);
    }
    if let Some(path) = env.filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    dirs::config_dir()
        .map(|dir| dir.join("livewatch").join("config.toml"))
        .ok_or(ConfigError::NoConfigDir)
}

/// [`resolve_path`] reading the environment of the current process.
pub fn config_path(cli: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
    resolve_path(cli, std::env::var_os(CONFIG_ENV))
}
