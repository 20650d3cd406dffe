//! Managed cache facade.
//!
//! [`ManagedCache`] owns the shared pieces (store, key/tags index, record
//! type registry, debug flag) and hands out [`TaggedCache`] views bound to a
//! condition set. It also offers a plain read/write surface with no
//! conditions attached.
//!
//! # Example
//!
//! ```ignore
//! let cache = ManagedCache::new(store, types, CacheConfig::default())?;
//!
//! cache
//!     .when(|c| c.entity_updated("Order", Some(5)))?
//!     .put("order:5:summary", &summary, Expiry::minutes(10))?;
//!
//! // Later, without knowing the conditions
//! let summary: Option<Summary> = cache.get("order:5:summary")?;
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tagcache_core::{CacheConfig, CacheResult, ConditionSet, Expiry, RecordTypes};
use tracing::debug;

use super::index::KeyTagIndex;
use super::memory::InMemoryTaggedStore;
use super::tagged::TaggedCache;
use super::traits::TaggedStore;

/// Entry point of the engine.
pub struct ManagedCache {
    store: Arc<dyn TaggedStore>,
    index: Arc<KeyTagIndex>,
    types: Arc<RecordTypes>,
    config: CacheConfig,
    debug: Arc<AtomicBool>,
}

impl std::fmt::Debug for ManagedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedCache")
            .field("types", &self.types)
            .field("config", &self.config)
            .field("debug", &self.is_debug_mode_enabled())
            .finish_non_exhaustive()
    }
}

impl ManagedCache {
    /// Create a cache over `store`, accepting conditions on `types`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if `config` does not validate.
    pub fn new(
        store: Arc<dyn TaggedStore>,
        types: RecordTypes,
        config: CacheConfig,
    ) -> CacheResult<Self> {
        config.validate()?;
        let index = Arc::new(KeyTagIndex::open(store.clone(), config.index_key.clone()));
        debug!(
            index_key = %config.index_key,
            types = types.len(),
            debug = config.debug,
            "Created managed cache"
        );

        Ok(Self {
            store,
            index,
            types: Arc::new(types),
            debug: Arc::new(AtomicBool::new(config.debug)),
            config,
        })
    }

    /// A cache over a fresh in-memory store with default configuration.
    pub fn in_memory(types: RecordTypes) -> CacheResult<Self> {
        Self::new(
            Arc::new(InMemoryTaggedStore::new()),
            types,
            CacheConfig::default(),
        )
    }

    /// An empty condition set bound to this cache's record types.
    pub fn conditions(&self) -> ConditionSet {
        ConditionSet::new(self.types.clone())
    }

    /// A view of the cache scoped to `conditions`.
    pub fn tagged(&self, conditions: ConditionSet) -> TaggedCache {
        TaggedCache::new(self.store.clone(), self.index.clone(), conditions)
            .with_debug_flag(self.debug.clone())
            .with_default_expiry(self.config.default_expiry())
    }

    /// Build a condition set with `build` and return the scoped view.
    pub fn when<F>(&self, build: F) -> CacheResult<TaggedCache>
    where
        F: FnOnce(ConditionSet) -> CacheResult<ConditionSet>,
    {
        Ok(self.tagged(build(self.conditions())?))
    }

    /// A view with no conditions attached.
    pub fn plain(&self) -> TaggedCache {
        self.tagged(self.conditions())
    }

    /// Flush every value carrying any tag of `conditions`.
    pub fn flush_conditions(&self, conditions: ConditionSet) -> CacheResult<u64> {
        self.tagged(conditions).flush()
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        self.plain().get(key)
    }

    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> CacheResult<T> {
        self.plain().get_or(key, default)
    }

    pub fn get_or_else<T, F>(&self, key: &str, default: F) -> CacheResult<T>
    where
        T: DeserializeOwned,
        F: FnOnce() -> T,
    {
        self.plain().get_or_else(key, default)
    }

    pub fn has(&self, key: &str) -> CacheResult<bool> {
        self.plain().has(key)
    }

    pub fn many<T, I, K>(&self, keys: I) -> CacheResult<BTreeMap<String, Option<T>>>
    where
        T: DeserializeOwned,
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        self.plain().many(keys)
    }

    pub fn put<T: Serialize>(&self, key: &str, value: &T, expiry: Expiry) -> CacheResult<()> {
        self.plain().put(key, value, expiry)
    }

    pub fn put_default<T: Serialize>(&self, key: &str, value: &T) -> CacheResult<()> {
        self.plain().put_default(key, value)
    }

    pub fn put_many<T, I, K>(&self, entries: I, expiry: Expiry) -> CacheResult<()>
    where
        T: Serialize,
        I: IntoIterator<Item = (K, T)>,
        K: Into<String>,
    {
        self.plain().put_many(entries, expiry)
    }

    pub fn forever<T: Serialize>(&self, key: &str, value: &T) -> CacheResult<()> {
        self.plain().forever(key, value)
    }

    pub fn increment(&self, key: &str, by: i64) -> CacheResult<i64> {
        self.plain().increment(key, by)
    }

    pub fn decrement(&self, key: &str, by: i64) -> CacheResult<i64> {
        self.plain().decrement(key, by)
    }

    /// Delete `key`, wherever its indexed tags put it.
    pub fn forget(&self, key: &str) -> CacheResult<bool> {
        self.plain().forget(key)
    }

    pub fn prefix(&self) -> &str {
        self.store.prefix()
    }

    /// Emit the tag set of every subsequent operation under the
    /// `tagcache::debug` target.
    pub fn enable_debug_mode(&self) {
        self.debug.store(true, Ordering::Relaxed);
    }

    pub fn disable_debug_mode(&self) {
        self.debug.store(false, Ordering::Relaxed);
    }

    pub fn is_debug_mode_enabled(&self) -> bool {
        self.debug.load(Ordering::Relaxed)
    }

    pub fn store(&self) -> &Arc<dyn TaggedStore> {
        &self.store
    }

    pub fn index(&self) -> &Arc<KeyTagIndex> {
        &self.index
    }

    pub fn types(&self) -> &Arc<RecordTypes> {
        &self.types
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}
