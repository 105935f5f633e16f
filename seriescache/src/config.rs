//! Configuration for the cache.
//!
//! Settings come from defaults, optionally overridden by the `[cache]`
//! section of an INI file:
//!
//! ```ini
//! [cache]
//! enabled = true
//! directory = ~/.cache/seriescache
//! recent_window_hours = 48
//! metadata_ttl_days = 7
//! catalog_ttl_hours = 24
//! chunk_days = 21
//! batching = grouped
//! ```

use std::path::{Path, PathBuf};

use chrono::Duration;
use ini::Ini;
use thiserror::Error;

use crate::gaps::Batching;

/// Hours after publication during which the source may still revise values.
pub const DEFAULT_RECENT_WINDOW_HOURS: i64 = 48;

/// Days after which cached coverage metadata is revalidated.
pub const DEFAULT_METADATA_TTL_DAYS: i64 = 7;

/// Hours after which a cached endpoint listing is discarded.
pub const DEFAULT_CATALOG_TTL_HOURS: i64 = 24;

/// The source serves at most about three weeks per request.
pub const DEFAULT_CHUNK_DAYS: i64 = 21;

const SECTION: &str = "cache";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {reason}", path.display())]
    Read { path: PathBuf, reason: String },

    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// Configuration for the cache engine.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// When false, every request goes to the source and nothing is read from
    /// or written to disk.
    pub enabled: bool,

    /// Root directory holding every cache artifact.
    pub cache_dir: PathBuf,

    /// Trailing window that is always re-fetched once time has moved on.
    pub recent_window: Duration,

    /// Maximum age of coverage metadata before unsettled data is revalidated.
    pub metadata_ttl: Duration,

    /// Maximum age of a cached endpoint listing.
    pub catalog_ttl: Duration,

    /// Widest range requested from the source in one call.
    pub chunk_width: Duration,

    /// Whether columns with identical gaps share one fetch task.
    pub batching: Batching,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_dir: default_cache_dir(),
            recent_window: Duration::hours(DEFAULT_RECENT_WINDOW_HOURS),
            metadata_ttl: Duration::days(DEFAULT_METADATA_TTL_DAYS),
            catalog_ttl: Duration::hours(DEFAULT_CATALOG_TTL_HOURS),
            chunk_width: Duration::days(DEFAULT_CHUNK_DAYS),
            batching: Batching::Grouped,
        }
    }
}

impl CacheConfig {
    /// Create a configuration rooted at `cache_dir`.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            ..Default::default()
        }
    }

    /// Turn the on-disk cache on or off.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the recent-correction window.
    pub fn with_recent_window(mut self, window: Duration) -> Self {
        self.recent_window = window;
        self
    }

    /// Set the metadata TTL.
    pub fn with_metadata_ttl(mut self, ttl: Duration) -> Self {
        self.metadata_ttl = ttl;
        self
    }

    /// Set the catalog TTL.
    pub fn with_catalog_ttl(mut self, ttl: Duration) -> Self {
        self.catalog_ttl = ttl;
        self
    }

    /// Set the maximum chunk width.
    pub fn with_chunk_width(mut self, width: Duration) -> Self {
        self.chunk_width = width;
        self
    }

    /// Set the batching mode for fetch tasks.
    pub fn with_batching(mut self, batching: Batching) -> Self {
        self.batching = batching;
        self
    }

    /// Load configuration from an INI file.
    ///
    /// A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    /// Build configuration from parsed INI contents.
    pub fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let Some(section) = ini.section(Some(SECTION)) else {
            return Ok(config);
        };

        if let Some(v) = section.get("enabled") {
            config.enabled = parse_bool("enabled", v)?;
        }
        if let Some(dir) = section.get("directory") {
            config.cache_dir = expand_tilde(dir);
        }
        if let Some(v) = section.get("recent_window_hours") {
            config.recent_window = Duration::hours(parse_positive("recent_window_hours", v)?);
        }
        if let Some(v) = section.get("metadata_ttl_days") {
            config.metadata_ttl = Duration::days(parse_positive("metadata_ttl_days", v)?);
        }
        if let Some(v) = section.get("catalog_ttl_hours") {
            config.catalog_ttl = Duration::hours(parse_positive("catalog_ttl_hours", v)?);
        }
        if let Some(v) = section.get("chunk_days") {
            config.chunk_width = Duration::days(parse_positive("chunk_days", v)?);
        }
        if let Some(v) = section.get("batching") {
            config.batching = match v.trim().to_lowercase().as_str() {
                "grouped" => Batching::Grouped,
                "per_column" | "per-column" => Batching::PerColumn,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "batching".to_string(),
                        value: v.to_string(),
                        reason: "expected 'grouped' or 'per_column'".to_string(),
                    })
                }
            };
        }

        Ok(config)
    }
}

/// Default cache root: `$XDG_CACHE_HOME/seriescache` (or the platform
/// equivalent).
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("seriescache")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("seriescache")
        .join("config.ini")
}

fn parse_positive(key: &str, value: &str) -> Result<i64, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    };

    let n: i64 = value
        .trim()
        .parse()
        .map_err(|_| invalid("expected an integer"))?;
    // Bounded so the chrono constructors cannot overflow.
    if !(1..=100_000).contains(&n) {
        return Err(invalid("must be between 1 and 100000"));
    }
    Ok(n)
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: "expected true or false".to_string(),
        }),
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
