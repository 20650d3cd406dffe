//! Tagged access layer.
//!
//! A [`TaggedCache`] binds a [`ConditionSet`] to the store and the key/tags
//! index. Writes store values under the set's tags and record them in the
//! index; reads resolve the tags for a key through the index first and fall
//! back to the set's own tags.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tagcache_core::{CacheResult, ConditionSet, Expiry, StorageError, ValidationError};
use tracing::info;

use super::index::KeyTagIndex;
use super::traits::TaggedStore;

/// Target of debug-mode tag dumps.
pub const DEBUG_TARGET: &str = "tagcache::debug";

/// Cache operations scoped to a condition set.
pub struct TaggedCache {
    store: Arc<dyn TaggedStore>,
    index: Arc<KeyTagIndex>,
    conditions: ConditionSet,
    /// Rendered tags, reset whenever `conditions` changes.
    tags: OnceCell<Vec<String>>,
    debug: Arc<AtomicBool>,
    default_expiry: Expiry,
}

impl std::fmt::Debug for TaggedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaggedCache")
            .field("conditions", &self.conditions)
            .field("index", &self.index)
            .field("default_expiry", &self.default_expiry)
            .finish_non_exhaustive()
    }
}

impl TaggedCache {
    pub fn new(
        store: Arc<dyn TaggedStore>,
        index: Arc<KeyTagIndex>,
        conditions: ConditionSet,
    ) -> Self {
        Self {
            store,
            index,
            conditions,
            tags: OnceCell::new(),
            debug: Arc::new(AtomicBool::new(false)),
            default_expiry: Expiry::Never,
        }
    }

    /// Share a debug-mode flag with the owner of this cache.
    pub fn with_debug_flag(mut self, debug: Arc<AtomicBool>) -> Self {
        self.debug = debug;
        self
    }

    /// Expiry used by [`TaggedCache::put_default`].
    pub fn with_default_expiry(mut self, expiry: Expiry) -> Self {
        self.default_expiry = expiry;
        self
    }

    pub fn conditions(&self) -> &ConditionSet {
        &self.conditions
    }

    /// Replace the condition set.
    pub fn set_conditions(&mut self, conditions: ConditionSet) {
        self.conditions = conditions;
        self.tags.take();
    }

    /// Append conditions to the current set.
    pub fn add_conditions(&mut self, conditions: ConditionSet) {
        self.conditions.extend(conditions);
        self.tags.take();
    }

    /// Rendered tags of the current condition set, in order.
    pub fn tags(&self) -> &[String] {
        self.tags.get_or_init(|| self.conditions.render_tags())
    }

    /// Tags to address `key` with: the indexed ones, else the current ones.
    pub fn resolve_tags(&self, key: &str) -> CacheResult<Vec<String>> {
        Ok(self
            .index
            .get(key)?
            .unwrap_or_else(|| self.tags().to_vec()))
    }

    /// Raw JSON value for `key`.
    pub fn get_value(&self, key: &str) -> CacheResult<Option<Value>> {
        self.ensure_not_reserved(key)?;
        let tags = self.resolve_tags(key)?;
        self.dump("get", key, &tags);
        self.store.get(&tags, key)
    }

    /// Value for `key`, or `None` if absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        self.get_value(key)?.map(|value| from_value(key, value)).transpose()
    }

    /// Value for `key`, or `default` if absent.
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> CacheResult<T> {
        Ok(self.get(key)?.unwrap_or(default))
    }

    /// Value for `key`, or the result of `default` if absent.
    ///
    /// `default` runs at most once, and only on a miss.
    pub fn get_or_else<T, F>(&self, key: &str, default: F) -> CacheResult<T>
    where
        T: DeserializeOwned,
        F: FnOnce() -> T,
    {
        Ok(self.get(key)?.unwrap_or_else(default))
    }

    /// Returns true if `key` holds a value.
    pub fn has(&self, key: &str) -> CacheResult<bool> {
        Ok(self.get_value(key)?.is_some())
    }

    /// Values for several keys, each resolved through the index separately.
    pub fn many<T, I, K>(&self, keys: I) -> CacheResult<BTreeMap<String, Option<T>>>
    where
        T: DeserializeOwned,
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        keys.into_iter()
            .map(|key| -> CacheResult<(String, Option<T>)> {
                let key = key.as_ref();
                Ok((key.to_string(), self.get(key)?))
            })
            .collect()
    }

    /// Store `value` under the current tags.
    ///
    /// The index entry is recorded and persisted before the value is written,
    /// inside one critical section.
    pub fn put<T: Serialize>(&self, key: &str, value: &T, expiry: Expiry) -> CacheResult<()> {
        self.ensure_not_reserved(key)?;
        let value = to_value(value)?;
        let tags = self.tags().to_vec();
        self.dump("put", key, &tags);
        self.index.set_with(key, tags.clone(), || {
            self.store.put(&tags, key, value, expiry)
        })
    }

    /// Store `value` with the default expiry.
    pub fn put_default<T: Serialize>(&self, key: &str, value: &T) -> CacheResult<()> {
        self.put(key, value, self.default_expiry)
    }

    /// Store `value` without expiration.
    pub fn forever<T: Serialize>(&self, key: &str, value: &T) -> CacheResult<()> {
        self.put(key, value, Expiry::Never)
    }

    /// Store several values under the current tags.
    pub fn put_many<T, I, K>(&self, entries: I, expiry: Expiry) -> CacheResult<()>
    where
        T: Serialize,
        I: IntoIterator<Item = (K, T)>,
        K: Into<String>,
    {
        let entries = entries
            .into_iter()
            .map(|(key, value)| -> CacheResult<(String, Value)> {
                let key: String = key.into();
                self.ensure_not_reserved(&key)?;
                Ok((key, to_value(&value)?))
            })
            .collect::<CacheResult<Vec<_>>>()?;
        if entries.is_empty() {
            return Ok(());
        }

        let keys: Vec<String> = entries.iter().map(|(key, _)| key.clone()).collect();
        let tags = self.tags().to_vec();
        self.dump("put_many", &keys.join(","), &tags);
        self.index.set_many_with(&keys, tags.clone(), || {
            self.store.put_many(&tags, entries, expiry)
        })
    }

    /// Add `by` to the integer under `key`.
    ///
    /// A key without an index entry is recorded under the current tags so a
    /// later plain read finds it.
    pub fn increment(&self, key: &str, by: i64) -> CacheResult<i64> {
        self.ensure_not_reserved(key)?;
        let indexed = self.index.get(key)?;
        self.dump("increment", key, indexed.as_deref().unwrap_or(self.tags()));
        match indexed {
            Some(tags) => self.store.increment(&tags, key, by),
            None => {
                let tags = self.tags().to_vec();
                self.index.set_with(key, tags.clone(), || {
                    self.store.increment(&tags, key, by)
                })
            }
        }
    }

    /// Subtract `by` from the integer under `key`.
    pub fn decrement(&self, key: &str, by: i64) -> CacheResult<i64> {
        self.increment(key, by.saturating_neg())
    }

    /// Remove `key` from the index, then delete its value.
    ///
    /// The value is deleted under the tags the index held for it, falling back
    /// to the current tags. Returns true if a value was deleted.
    pub fn forget(&self, key: &str) -> CacheResult<bool> {
        self.ensure_not_reserved(key)?;
        self.index.delete_with(key, |previous| {
            let tags = previous.unwrap_or(self.tags());
            self.dump("forget", key, tags);
            self.store.forget(tags, key)
        })
    }

    /// Delete every value carrying any of the current tags.
    ///
    /// The index is left as is; entries for flushed keys simply resolve to
    /// tags whose values are gone.
    pub fn flush(&self) -> CacheResult<u64> {
        let tags = self.tags();
        self.dump("flush", "", tags);
        if tags.is_empty() {
            return Ok(0);
        }
        self.store.flush(tags)
    }

    /// Key prefix of the underlying store.
    pub fn prefix(&self) -> &str {
        self.store.prefix()
    }

    fn ensure_not_reserved(&self, key: &str) -> CacheResult<()> {
        if key == self.index.index_key() {
            return Err(ValidationError::InvalidIdentifier {
                field: "key".to_string(),
                value: key.to_string(),
                reason: "reserved for the key/tags index".to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn dump(&self, op: &'static str, key: &str, tags: &[String]) {
        if self.debug.load(Ordering::Relaxed) {
            info!(target: DEBUG_TARGET, op, key, tags = ?tags, "Cache operation tags");
        }
    }
}

fn to_value<T: Serialize>(value: &T) -> CacheResult<Value> {
    serde_json::to_value(value).map_err(|e| {
        StorageError::Serialization {
            reason: e.to_string(),
        }
        .into()
    })
}

fn from_value<T: DeserializeOwned>(key: &str, value: Value) -> CacheResult<T> {
    serde_json::from_value(value).map_err(|e| {
        StorageError::Serialization {
            reason: format!("{key}: {e}"),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::InMemoryTaggedStore;
    use std::cell::Cell;
    use tagcache_core::{CacheError, RecordTypes};

    const INDEX_KEY: &str = "TagCache_TagMap";

    struct Fixture {
        store: Arc<InMemoryTaggedStore>,
        index: Arc<KeyTagIndex>,
        types: Arc<RecordTypes>,
    }

    impl Fixture {
        fn new() -> Self {
            let store = Arc::new(InMemoryTaggedStore::new());
            let index = Arc::new(KeyTagIndex::open(store.clone(), INDEX_KEY));
            let types = Arc::new(RecordTypes::with_types(["Order", "Customer"]).unwrap());
            Self {
                store,
                index,
                types,
            }
        }

        fn set(&self) -> ConditionSet {
            ConditionSet::new(self.types.clone())
        }

        fn cache(&self, conditions: ConditionSet) -> TaggedCache {
            TaggedCache::new(self.store.clone(), self.index.clone(), conditions)
        }

        fn plain(&self) -> TaggedCache {
            self.cache(self.set())
        }
    }

    #[test]
    fn test_tags_are_memoized_until_mutation() {
        let f = Fixture::new();
        let mut cache = f.cache(f.set().entity_created("Order").unwrap());
        assert_eq!(cache.tags(), ["TagCache:created-Order"]);

        cache.add_conditions(f.set().entity_updated("Order", Some(5)).unwrap());
        assert_eq!(
            cache.tags(),
            ["TagCache:created-Order", "TagCache:updated-Order(5)"]
        );

        cache.set_conditions(f.set().entity_deleted("Customer", None).unwrap());
        assert_eq!(cache.tags(), ["TagCache:deleted-Customer"]);
    }

    #[test]
    fn test_read_after_write_without_tags() {
        let f = Fixture::new();
        f.cache(f.set().entity_updated("Order", Some(5)).unwrap())
            .put("k", &"v", Expiry::Never)
            .unwrap();

        let value: Option<String> = f.plain().get("k").unwrap();
        assert_eq!(value.as_deref(), Some("v"));
        assert_eq!(
            f.index.get("k").unwrap(),
            Some(vec!["TagCache:updated-Order(5)".to_string()])
        );
    }

    #[test]
    fn test_unindexed_key_uses_current_tags() {
        let f = Fixture::new();
        let tags = vec!["TagCache:created-Order".to_string()];
        f.store
            .put(&tags, "k", serde_json::json!(1), Expiry::Never)
            .unwrap();

        assert_eq!(f.plain().get::<i64>("k").unwrap(), None);
        let tagged = f.cache(f.set().entity_created("Order").unwrap());
        assert_eq!(tagged.get::<i64>("k").unwrap(), Some(1));
    }

    #[test]
    fn test_flush_evicts_tagged_values() {
        let f = Fixture::new();
        let cache = f.cache(f.set().entity_updated("Order", Some(5)).unwrap());
        cache.put("k", &1, Expiry::Never).unwrap();

        assert_eq!(cache.flush().unwrap(), 1);
        assert_eq!(f.plain().get_or("k", 0).unwrap(), 0);
        assert_eq!(cache.flush().unwrap(), 0);
    }

    #[test]
    fn test_flush_without_conditions_is_noop() {
        let f = Fixture::new();
        f.plain().put("k", &1, Expiry::Never).unwrap();
        assert_eq!(f.plain().flush().unwrap(), 0);
        assert_eq!(f.plain().get::<i64>("k").unwrap(), Some(1));
    }

    #[test]
    fn test_default_is_lazy() {
        let f = Fixture::new();
        let cache = f.plain();
        cache.put("present", &"stored", Expiry::Never).unwrap();

        let calls = Cell::new(0);
        let expensive = || {
            calls.set(calls.get() + 1);
            "computed".to_string()
        };

        assert_eq!(cache.get_or_else("missing", expensive).unwrap(), "computed");
        assert_eq!(calls.get(), 1);

        let value = cache
            .get_or_else("present", || {
                calls.set(calls.get() + 1);
                "computed".to_string()
            })
            .unwrap();
        assert_eq!(value, "stored");
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_forget_uses_indexed_tags() {
        let f = Fixture::new();
        f.cache(f.set().entity_saved("Order", None).unwrap())
            .put("k", &1, Expiry::Never)
            .unwrap();

        assert!(f.plain().forget("k").unwrap());
        assert_eq!(f.index.get("k").unwrap(), None);
        // Only the index blob is left
        assert_eq!(f.store.len(), 1);
        assert!(!f.plain().has("k").unwrap());
    }

    #[test]
    fn test_many_resolves_each_key() {
        let f = Fixture::new();
        f.cache(f.set().entity_created("Order").unwrap())
            .put("a", &1, Expiry::Never)
            .unwrap();
        f.plain().put("b", &2, Expiry::Never).unwrap();

        let values: BTreeMap<String, Option<i64>> = f.plain().many(["a", "b", "c"]).unwrap();
        assert_eq!(values["a"], Some(1));
        assert_eq!(values["b"], Some(2));
        assert_eq!(values["c"], None);
    }

    #[test]
    fn test_put_many_records_index() {
        let f = Fixture::new();
        let cache = f.cache(f.set().entity_created("Customer").unwrap());
        cache
            .put_many(vec![("x", 1), ("y", 2)], Expiry::Never)
            .unwrap();

        assert_eq!(f.plain().get::<i64>("x").unwrap(), Some(1));
        assert_eq!(f.plain().get::<i64>("y").unwrap(), Some(2));
        assert_eq!(cache.flush().unwrap(), 2);
    }

    #[test]
    fn test_increment_records_index_once() {
        let f = Fixture::new();
        let cache = f.cache(f.set().entity_created("Order").unwrap());
        assert_eq!(cache.increment("n", 2).unwrap(), 2);
        assert_eq!(f.plain().increment("n", 3).unwrap(), 5);
        assert_eq!(f.plain().decrement("n", 1).unwrap(), 4);
        assert_eq!(f.plain().get::<i64>("n").unwrap(), Some(4));
    }

    #[test]
    fn test_forever_and_put_default() {
        let f = Fixture::new();
        let cache = f.plain().with_default_expiry(Expiry::secs(0));
        cache.put_default("gone", &1).unwrap();
        cache.forever("kept", &2).unwrap();

        assert_eq!(cache.get::<i64>("gone").unwrap(), None);
        assert_eq!(cache.get::<i64>("kept").unwrap(), Some(2));
    }

    #[test]
    fn test_reserved_key_rejected() {
        let f = Fixture::new();
        let err = f.plain().put(INDEX_KEY, &1, Expiry::Never).unwrap_err();
        assert!(matches!(
            err,
            CacheError::Validation(ValidationError::InvalidIdentifier { .. })
        ));
        assert!(f.plain().forget(INDEX_KEY).is_err());

        // The index blob exists but is never handed out as a value
        f.plain().put("k", &1, Expiry::Never).unwrap();
        let err = f.plain().get::<Value>(INDEX_KEY).unwrap_err();
        assert!(matches!(
            err,
            CacheError::Validation(ValidationError::InvalidIdentifier { .. })
        ));
        assert!(f.plain().has(INDEX_KEY).is_err());
    }

    #[test]
    fn test_type_mismatch_is_serialization_error() {
        let f = Fixture::new();
        f.plain().put("k", &"text", Expiry::Never).unwrap();
        let err = f.plain().get::<i64>("k").unwrap_err();
        assert!(matches!(
            err,
            CacheError::Storage(StorageError::Serialization { .. })
        ));
    }

    #[test]
    fn test_prefix_passthrough() {
        let store = Arc::new(InMemoryTaggedStore::with_prefix("app:"));
        let index = Arc::new(KeyTagIndex::open(store.clone(), INDEX_KEY));
        let types = Arc::new(RecordTypes::new());
        let cache = TaggedCache::new(store, index, ConditionSet::new(types));
        assert_eq!(cache.prefix(), "app:");
    }
}
