//! Error types for TagCache operations

use thiserror::Error;

/// Validation errors raised while building conditions or parsing tags.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid entity type: {name} is not a registered record type")]
    InvalidEntityType { name: String },

    #[error("Invalid identifier for {field}: {value:?} - {reason}")]
    InvalidIdentifier {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Malformed tag {tag:?}: {reason}")]
    MalformedTag { tag: String, reason: String },
}

/// Errors surfaced by the underlying tagged store and the key/tags index.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Store unavailable: {reason}")]
    StoreUnavailable { reason: String },

    #[error("Key/tags index corrupt: {reason}")]
    IndexCorrupt { reason: String },

    #[error("Serialization failed: {reason}")]
    Serialization { reason: String },

    #[error("Value under key {key} is not numeric")]
    NotNumeric { key: String },
}

/// Event routing errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EventError {
    #[error("Malformed event identifier: {identifier:?}")]
    MalformedEventIdentifier { identifier: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to parse configuration: {reason}")]
    Parse { reason: String },
}

/// Master error type for all TagCache errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Event error: {0}")]
    Event(#[from] EventError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl CacheError {
    /// Shorthand for a `StoreUnavailable` storage error.
    pub fn store_unavailable(reason: impl Into<String>) -> Self {
        StorageError::StoreUnavailable {
            reason: reason.into(),
        }
        .into()
    }

    /// Returns true if the underlying store could not be reached.
    pub fn is_store_unavailable(&self) -> bool {
        matches!(
            self,
            CacheError::Storage(StorageError::StoreUnavailable { .. })
        )
    }

    /// Returns true if a condition named an unregistered record type.
    pub fn is_invalid_entity_type(&self) -> bool {
        matches!(
            self,
            CacheError::Validation(ValidationError::InvalidEntityType { .. })
        )
    }
}

/// Result type alias for TagCache operations.
pub type CacheResult<T> = Result<T, CacheError>;

// =============================================================================
// TESTS
// =============================================================================
