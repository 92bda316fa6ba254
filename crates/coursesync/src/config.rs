/// Configuration for a reconciliation run
use crate::cache::CacheConfig;
use crate::source::BanwebConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {message}")]
    Invalid { message: String },
}

/// Top-level configuration, read from a JSON file.
///
/// Every field is optional in the file; missing fields take the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Path to the sqlite catalog
    pub database_path: String,
    /// Sections fetched and dispatched per page
    pub page_size: usize,
    /// Maximum concurrent detail fetches
    pub fetch_limit: usize,
    /// Minimum time each fetch slot is held
    pub fetch_interval_ms: u64,
    pub source: BanwebConfig,
    /// Read API endpoint that drops cached views after a run
    pub cache: CacheConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            database_path: "catalog.db".to_string(),
            page_size: 32,
            fetch_limit: 2,
            fetch_interval_ms: 50,
            source: BanwebConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Loads and validates a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: SyncConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::Invalid {
                message: "page_size must be greater than 0".to_string(),
            });
        }
        if self.fetch_limit == 0 {
            return Err(ConfigError::Invalid {
                message: "fetch_limit must be greater than 0".to_string(),
            });
        }
        if self.source.base_url.is_empty() {
            return Err(ConfigError::Invalid {
                message: "source.base_url must not be empty".to_string(),
            });
        }
        if self.cache.invalidate_url.is_empty() {
            return Err(ConfigError::Invalid {
                message: "cache.invalidate_url must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn fetch_interval(&self) -> Duration {
        Duration::from_millis(self.fetch_interval_ms)
    }
}
