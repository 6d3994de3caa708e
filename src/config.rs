//! Configuration system for pageindex.
//!
//! Provides layered configuration from multiple sources:
//!
//! 1. **Compiled defaults** - Sensible defaults built into the binary
//! 2. **User config file** - `~/.config/pageindex/config.toml`
//! 3. **Environment variables** - `PAGEINDEX_*` prefix
//! 4. **CLI arguments** - Highest priority, always wins
//!
//! # Example Configuration File
//!
//! ```toml
//! [paths]
//! db = "~/.local/share/pageindex/pages.db"
//!
//! [ranking]
//! visit_weight_seconds = 259200
//!
//! [expiration]
//! threshold_seconds = 7776000
//! interval_seconds = 180
//!
//! [favicon]
//! cache_capacity = 512
//! size = 16
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cli::OutputFormat;
use crate::error::{PageIndexError, Result};
use crate::expire::{DEFAULT_EXPIRE_INTERVAL, DEFAULT_EXPIRE_THRESHOLD_SECONDS, ExpirerSettings};
use crate::favicon::DEFAULT_CACHE_CAPACITY;
use crate::icon::DEFAULT_FAVICON_SIZE;
use crate::ledger::DEFAULT_VISIT_WEIGHT_SECONDS;
use crate::suggest::DEFAULT_SUGGEST_LIMIT;

/// Main configuration structure for pageindex.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub ranking: RankingConfig,
    pub expiration: ExpirationConfig,
    pub favicon: FaviconConfig,
    pub suggest: SuggestConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Path to the `SQLite` database file.
    /// Environment variable: `PAGEINDEX_DB`
    pub db: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    /// Seconds of recency one visit is worth in the frecency score.
    pub visit_weight_seconds: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpirationConfig {
    /// Pages not visited for this long are dropped.
    /// Environment variable: `PAGEINDEX_EXPIRE_DAYS` (in days)
    pub threshold_seconds: i64,

    /// Period between background expiration passes.
    pub interval_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FaviconConfig {
    /// Decoded icons kept in memory.
    pub cache_capacity: u64,

    /// Edge length of stored icon rasters, in pixels.
    pub size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestConfig {
    /// Environment variable: `PAGEINDEX_LIMIT`
    pub default_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Default output format: text, json, json-pretty.
    /// Environment variable: `PAGEINDEX_FORMAT`
    pub format: String,
    pub colors: bool,
    pub quiet: bool,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            visit_weight_seconds: DEFAULT_VISIT_WEIGHT_SECONDS,
        }
    }
}

impl Default for ExpirationConfig {
    fn default() -> Self {
        Self {
            threshold_seconds: DEFAULT_EXPIRE_THRESHOLD_SECONDS,
            interval_seconds: DEFAULT_EXPIRE_INTERVAL.as_secs(),
        }
    }
}

impl Default for FaviconConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            size: DEFAULT_FAVICON_SIZE,
        }
    }
}

impl Default for SuggestConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_SUGGEST_LIMIT,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: "text".to_string(),
            colors: true,
            quiet: false,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. User config file (~/.config/pageindex/config.toml)
    /// 3. Compiled defaults
    pub fn load() -> Self {
        let mut config = Self::user_config_path()
            .and_then(|path| Self::load_from_file(&path))
            .unwrap_or_default();

        config.apply_env_overrides();

        debug!("Configuration loaded: {:?}", config);
        config
    }

    /// Load configuration from a specific file.
    ///
    /// Missing or unparseable files yield `None`; the caller falls back to
    /// defaults.
    pub fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            debug!("Config file not found: {}", path.display());
            return None;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    info!("Loaded config from: {}", path.display());
                    Some(config)
                }
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Get the path to the user configuration file.
    #[must_use]
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("pageindex").join("config.toml"))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(db) = std::env::var("PAGEINDEX_DB") {
            self.paths.db = Some(PathBuf::from(db));
        }
        if let Ok(limit) = std::env::var("PAGEINDEX_LIMIT") {
            if let Ok(n) = limit.parse() {
                self.suggest.default_limit = n;
            }
        }
        if let Ok(days) = std::env::var("PAGEINDEX_EXPIRE_DAYS") {
            if let Ok(n) = days.parse::<i64>() {
                self.expiration.threshold_seconds = n.saturating_mul(24 * 60 * 60);
            }
        }
        if std::env::var("PAGEINDEX_NO_COLOR").is_ok() || std::env::var("NO_COLOR").is_ok() {
            self.output.colors = false;
        }
        if let Ok(format) = std::env::var("PAGEINDEX_FORMAT") {
            self.output.format = format;
        }
        if std::env::var("PAGEINDEX_QUIET").is_ok() {
            self.output.quiet = true;
        }
    }

    /// Reject settings the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`PageIndexError::ConfigError`] naming the first bad key.
    pub fn validate(&self) -> Result<()> {
        let origin = Self::user_config_path().unwrap_or_default();
        if self.ranking.visit_weight_seconds <= 0 {
            return Err(PageIndexError::config(
                origin,
                "ranking.visit_weight_seconds must be positive",
            ));
        }
        if self.expiration.threshold_seconds < 0 {
            return Err(PageIndexError::config(
                origin,
                "expiration.threshold_seconds must not be negative",
            ));
        }
        if self.expiration.interval_seconds == 0 {
            return Err(PageIndexError::config(
                origin,
                "expiration.interval_seconds must be at least 1",
            ));
        }
        if self.favicon.cache_capacity == 0 {
            return Err(PageIndexError::config(
                origin,
                "favicon.cache_capacity must be at least 1",
            ));
        }
        if self.favicon.size == 0 {
            return Err(PageIndexError::config(origin, "favicon.size must be at least 1"));
        }
        if Self::parse_format(&self.output.format).is_none() {
            return Err(PageIndexError::config(
                origin,
                format!(
                    "output.format must be one of text, json, json-pretty (got '{}')",
                    self.output.format
                ),
            ));
        }
        Ok(())
    }

    /// Get the database path, using defaults if not configured.
    pub fn db_path(&self) -> PathBuf {
        self.paths
            .db
            .clone()
            .unwrap_or_else(crate::default_db_path)
    }

    /// Output format used when `--format` is not given on the command line.
    /// An unrecognised value falls back to text.
    #[must_use]
    pub fn output_format(&self) -> OutputFormat {
        Self::parse_format(&self.output.format).unwrap_or_default()
    }

    fn parse_format(value: &str) -> Option<OutputFormat> {
        <OutputFormat as clap::ValueEnum>::from_str(value.trim(), true).ok()
    }

    /// Background expiration settings.
    #[must_use]
    pub const fn expirer_settings(&self) -> ExpirerSettings {
        ExpirerSettings {
            interval: Duration::from_secs(self.expiration.interval_seconds),
            threshold_seconds: self.expiration.threshold_seconds,
        }
    }

    /// Look up a single value by dotted key, as shown by `config --get`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        let value = match key {
            "paths.db" => self.db_path().display().to_string(),
            "ranking.visit_weight_seconds" => self.ranking.visit_weight_seconds.to_string(),
            "expiration.threshold_seconds" => self.expiration.threshold_seconds.to_string(),
            "expiration.interval_seconds" => self.expiration.interval_seconds.to_string(),
            "favicon.cache_capacity" => self.favicon.cache_capacity.to_string(),
            "favicon.size" => self.favicon.size.to_string(),
            "suggest.default_limit" => self.suggest.default_limit.to_string(),
            "output.format" => self.output.format.clone(),
            "output.colors" => self.output.colors.to_string(),
            "output.quiet" => self.output.quiet.to_string(),
            _ => return None,
        };
        Some(value)
    }

    /// Save the current configuration to the user config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory cannot be determined,
    /// the parent directory cannot be created, or the file cannot be written.
    pub fn save(&self) -> std::io::Result<PathBuf> {
        let config_path = Self::user_config_path().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not determine config directory",
            )
        })?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        std::fs::write(&config_path, content)?;
        info!("Saved config to: {}", config_path.display());
        Ok(config_path)
    }

    /// Generate a default configuration file content.
    #[must_use]
    pub fn default_config_content() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}
