//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::error::{CacheResult, ConfigError};
use crate::expiry::Expiry;
use crate::record::validate_name;

// Default values for cache configuration
const DEFAULT_INDEX_KEY: &str = "TagCache_TagMap";
const DEFAULT_LMDB_MAX_SIZE_MB: usize = 64;

/// Configuration for a managed cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Reserved store key holding the serialized key/tags index.
    pub index_key: String,
    /// Initial state of debug mode (tag dumps before each operation).
    pub debug: bool,
    /// Expiry used by `put_default`, in seconds. `None` means no expiration.
    pub default_expiry_secs: Option<u64>,
    /// Map size for the LMDB-backed store.
    pub lmdb_max_size_mb: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            index_key: DEFAULT_INDEX_KEY.to_string(),
            debug: false,
            default_expiry_secs: None,
            lmdb_max_size_mb: DEFAULT_LMDB_MAX_SIZE_MB,
        }
    }
}

impl CacheConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document. Missing fields take their defaults.
    pub fn from_toml_str(source: &str) -> CacheResult<Self> {
        let config: Self = toml::from_str(source).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check field values.
    pub fn validate(&self) -> CacheResult<()> {
        validate_name("index_key", &self.index_key).map_err(|e| ConfigError::InvalidValue {
            field: "index_key".to_string(),
            value: self.index_key.clone(),
            reason: e.to_string(),
        })?;
        if self.lmdb_max_size_mb == 0 {
            return Err(ConfigError::InvalidValue {
                field: "lmdb_max_size_mb".to_string(),
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Set the reserved index key.
    pub fn with_index_key(mut self, key: impl Into<String>) -> Self {
        self.index_key = key.into();
        self
    }

    /// Enable or disable debug mode.
    pub fn with_debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    /// Set the default expiry in seconds.
    pub fn with_default_expiry_secs(mut self, secs: Option<u64>) -> Self {
        self.default_expiry_secs = secs;
        self
    }

    /// Set the LMDB map size.
    pub fn with_lmdb_max_size_mb(mut self, size: usize) -> Self {
        self.lmdb_max_size_mb = size;
        self
    }

    /// Default expiry as an [`Expiry`].
    pub fn default_expiry(&self) -> Expiry {
        self.default_expiry_secs
            .map(Expiry::secs)
            .unwrap_or(Expiry::Never)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert_eq!(config.index_key, "TagCache_TagMap");
        assert!(!config.debug);
        assert_eq!(config.default_expiry(), Expiry::Never);
        assert_eq!(config.lmdb_max_size_mb, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_setters() {
        let config = CacheConfig::new()
            .with_index_key("app_tag_map")
            .with_debug(true)
            .with_default_expiry_secs(Some(30))
            .with_lmdb_max_size_mb(8);
        assert_eq!(config.index_key, "app_tag_map");
        assert!(config.debug);
        assert_eq!(config.default_expiry(), Expiry::secs(30));
        assert_eq!(config.lmdb_max_size_mb, 8);
    }

    #[test]
    fn parses_partial_toml() {
        let config = CacheConfig::from_toml_str("debug = true\ndefault_expiry_secs = 600\n").unwrap();
        assert!(config.debug);
        assert_eq!(config.default_expiry_secs, Some(600));
        assert_eq!(config.index_key, "TagCache_TagMap");
    }

    #[test]
    fn rejects_bad_toml() {
        let err = CacheConfig::from_toml_str("debug = \"yes\"").unwrap_err();
        assert!(matches!(err, CacheError::Config(ConfigError::Parse { .. })));
    }

    #[test]
    fn rejects_delimiter_in_index_key() {
        let err = CacheConfig::from_toml_str("index_key = \"tag-map\"").unwrap_err();
        assert!(matches!(
            err,
            CacheError::Config(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn rejects_zero_map_size() {
        let config = CacheConfig::new().with_lmdb_max_size_mb(0);
        assert!(config.validate().is_err());
    }
}
