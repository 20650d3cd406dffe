//! TagCache Storage - Tagged Store, Key/Tags Index and Access Layer
//!
//! This crate connects conditions from `tagcache-core` to an actual store:
//!
//! - [`TaggedStore`]: contract of the underlying tagging-capable store, with
//!   an in-memory and an LMDB implementation
//! - [`KeyTagIndex`]: the persisted reverse index from key to tags
//! - [`TaggedCache`]: get/put/forget/flush scoped to a condition set
//! - [`ManagedCache`]: facade owning the shared pieces

pub mod cache;
pub mod lock;

pub use cache::{
    tag_namespace, InMemoryTaggedStore, KeyTagIndex, LmdbStoreError, LmdbTaggedStore,
    ManagedCache, StoredEntry, TagScopedKey, TaggedCache, TaggedStore, DEBUG_TARGET,
};

// Re-export core types for convenience
pub use tagcache_core::{CacheConfig, CacheError, CacheResult, ConditionSet, Expiry, RecordTypes};
