//! Tagged cache layer.
//!
//! This module provides the tagged access layer over a pluggable tagging
//! store, plus the key/tags index that lets callers read by key alone.
//!
//! # Components
//!
//! - [`TaggedStore`]: the underlying store contract
//! - [`InMemoryTaggedStore`], [`LmdbTaggedStore`]: backends
//! - [`KeyTagIndex`]: persisted `key → tags` reverse lookup
//! - [`TaggedCache`]: cache operations scoped to a condition set
//! - [`ManagedCache`]: the facade callers hold on to
//!
//! # Example
//!
//! ```ignore
//! let cache = ManagedCache::in_memory(RecordTypes::with_types(["Order"])?)?;
//!
//! // Stored under "TagCache:updated-Order(5)"
//! cache
//!     .when(|c| c.entity_updated("Order", Some(5)))?
//!     .put("order:5", &order, Expiry::Never)?;
//!
//! // Read without restating the conditions
//! let order: Option<Order> = cache.get("order:5")?;
//! ```

pub mod entry;
pub mod index;
pub mod lmdb;
pub mod managed;
pub mod memory;
pub mod scoped_key;
pub mod tagged;
pub mod traits;

pub use entry::StoredEntry;
pub use index::KeyTagIndex;
pub use lmdb::{LmdbStoreError, LmdbTaggedStore};
pub use managed::ManagedCache;
pub use memory::InMemoryTaggedStore;
pub use scoped_key::{tag_namespace, TagScopedKey};
pub use tagged::{TaggedCache, DEBUG_TARGET};
pub use traits::TaggedStore;
