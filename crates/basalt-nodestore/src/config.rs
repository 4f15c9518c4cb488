//! Store configuration.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;
use crate::manager::BackendOptions;
use crate::shard::ShardConfig;

fn default_ledgers_per_shard() -> u32 {
    ShardConfig::DEFAULT_LEDGERS_PER_SHARD
}

fn default_cache_size() -> usize {
    crate::database::CACHE_TARGET_SIZE
}

fn default_cache_age_secs() -> u64 {
    crate::database::CACHE_TARGET_AGE.as_secs()
}

/// Configuration of one store.
///
/// # Examples
///
/// ```
/// use basalt_nodestore::StoreConfig;
///
/// let config: StoreConfig = toml::from_str(
///     r#"
///     type = "memory"
///     path = "/var/lib/basalt/shards"
///     max_size_gb = 4
///     "#,
/// )
/// .unwrap();
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Backend factory name.
    #[serde(rename = "type")]
    pub backend_type: String,
    /// Root directory of the store.
    pub path: PathBuf,
    /// Disk budget in gigabytes.
    pub max_size_gb: u64,
    /// Ledgers per shard; only changed for tests.
    #[serde(default = "default_ledgers_per_shard")]
    pub ledgers_per_shard: u32,
    /// Cache entry target per cache.
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
    /// Cache age target in seconds.
    #[serde(default = "default_cache_age_secs")]
    pub cache_age_secs: u64,
}

impl StoreConfig {
    /// Creates a configuration with defaults for the optional keys.
    pub fn new<P: AsRef<Path>>(backend_type: &str, path: P, max_size_gb: u64) -> Self {
        Self {
            backend_type: backend_type.to_string(),
            path: path.as_ref().to_path_buf(),
            max_size_gb,
            ledgers_per_shard: default_ledgers_per_shard(),
            cache_size: default_cache_size(),
            cache_age_secs: default_cache_age_secs(),
        }
    }

    /// Loads a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] or [`ConfigError::Parse`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let config: Self =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend_type.is_empty() {
            return Err(ConfigError::UnknownBackendType(String::new()));
        }
        if self.path.as_os_str().is_empty() {
            return Err(ConfigError::MissingPath);
        }
        if self.max_size_gb == 0 {
            return Err(ConfigError::InvalidMaxSize(self.max_size_gb));
        }
        if self.ledgers_per_shard < 2 {
            return Err(ConfigError::InvalidLedgersPerShard(self.ledgers_per_shard));
        }
        Ok(())
    }

    /// Returns the disk budget in bytes.
    #[must_use]
    pub fn max_disk_bytes(&self) -> u64 {
        self.max_size_gb << 30
    }

    /// Returns the cache age as a duration.
    #[must_use]
    pub fn cache_age(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cache_age_secs)
    }

    /// Returns the shard layout this configuration describes.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidLedgersPerShard`] if the width is
    /// unusable.
    pub fn shard_config(&self) -> Result<ShardConfig, ConfigError> {
        ShardConfig::new(self.ledgers_per_shard, ShardConfig::DEFAULT_GENESIS_SEQ)
    }

    /// Returns backend options rooted at the store path.
    #[must_use]
    pub fn backend_options(&self) -> BackendOptions {
        BackendOptions::new(&self.backend_type, &self.path)
    }
}
