//! TagCache Core - Conditions and Tag Encoding
//!
//! Pure data types shared by the storage and event crates:
//!
//! - [`Condition`]: one invalidation trigger and its canonical tag string
//! - [`ConditionSet`]: fluent, ordered accumulation of conditions
//! - [`Record`] / [`RecordTypes`]: the record abstraction and the registry of
//!   valid entity types
//! - [`LifecycleEvent`]: the closed set of observable events
//! - [`CacheError`] / [`CacheResult`]: the error taxonomy
//!
//! This crate performs no I/O.

pub mod condition;
pub mod condition_set;
pub mod config;
pub mod error;
pub mod event;
pub mod expiry;
pub mod record;

pub use condition::{Condition, TAG_PREFIX};
pub use condition_set::{ConditionSet, Subject};
pub use config::CacheConfig;
pub use error::{CacheError, CacheResult, ConfigError, EventError, StorageError, ValidationError};
pub use event::{LifecycleEvent, LifecycleEventParseError};
pub use expiry::Expiry;
pub use record::{validate_name, Attributes, DynamicRecord, Record, RecordId, RecordTypes};
