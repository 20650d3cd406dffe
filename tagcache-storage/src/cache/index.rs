//! Key→Tags index.
//!
//! Callers read by key alone, but the store needs the tag sequence a value
//! was stored under to address it. The index records `key → tags` for every
//! tagged write and is itself persisted in the store, as one JSON object
//! under a reserved key with no tags and no expiration.
//!
//! # Lifecycle
//!
//! - `open`: create a handle; nothing is read yet
//! - first access: load the persisted map (a corrupt blob is replaced by an
//!   empty map and a warning)
//! - `set` / `delete`: mutate and re-persist the full map immediately
//! - `close`: re-persist the in-memory map
//! - `reload`: drop the in-memory copy; the next access loads again
//!
//! Every load-mutate-persist cycle runs under one mutex, so two writers in
//! the same process cannot overwrite each other's update.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tagcache_core::{CacheResult, Expiry, StorageError};
use tracing::{debug, warn};

use super::traits::TaggedStore;
use crate::lock::mutex_lock;

const LOCK_TARGET: &str = "cache::index";

type TagMap = BTreeMap<String, Vec<String>>;

/// Persisted reverse lookup from cache key to the tags it was stored under.
pub struct KeyTagIndex {
    store: Arc<dyn TaggedStore>,
    index_key: String,
    /// `None` until loaded from the store.
    state: Mutex<Option<TagMap>>,
}

impl std::fmt::Debug for KeyTagIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyTagIndex")
            .field("index_key", &self.index_key)
            .finish_non_exhaustive()
    }
}

impl KeyTagIndex {
    /// Create an index persisted under `index_key` in `store`.
    pub fn open(store: Arc<dyn TaggedStore>, index_key: impl Into<String>) -> Self {
        Self {
            store,
            index_key: index_key.into(),
            state: Mutex::new(None),
        }
    }

    /// The reserved store key holding the index.
    pub fn index_key(&self) -> &str {
        &self.index_key
    }

    /// Tags recorded for `key`, if any.
    pub fn get(&self, key: &str) -> CacheResult<Option<Vec<String>>> {
        let mut guard = self.lock("get");
        Ok(self.loaded(&mut guard)?.get(key).cloned())
    }

    /// Record `key → tags` and persist.
    pub fn set(&self, key: &str, tags: Vec<String>) -> CacheResult<()> {
        self.set_with(key, tags, || Ok(()))
    }

    /// Record `key → tags`, persist, then run `write` in the same critical
    /// section.
    ///
    /// A concurrent reader in this process never sees the new value without
    /// its index entry. If persisting fails, the in-memory map is rolled back
    /// and `write` is not called.
    pub fn set_with<T, F>(&self, key: &str, tags: Vec<String>, write: F) -> CacheResult<T>
    where
        F: FnOnce() -> CacheResult<T>,
    {
        self.set_many_with(&[key], tags, write)
    }

    /// Record the same tags for several keys with a single persist, then run
    /// `write` in the same critical section.
    pub fn set_many_with<K, T, F>(&self, keys: &[K], tags: Vec<String>, write: F) -> CacheResult<T>
    where
        K: AsRef<str>,
        F: FnOnce() -> CacheResult<T>,
    {
        let mut guard = self.lock("set");
        let map = self.loaded(&mut guard)?;

        let previous: Vec<(String, Option<Vec<String>>)> = keys
            .iter()
            .map(|key| {
                let key = key.as_ref().to_string();
                let old = map.insert(key.clone(), tags.clone());
                (key, old)
            })
            .collect();

        if let Err(err) = self.persist(map) {
            for (key, old) in previous {
                match old {
                    Some(old) => map.insert(key, old),
                    None => map.remove(&key),
                };
            }
            return Err(err);
        }

        debug!(keys = keys.len(), tags = ?tags, "Recorded index entries");
        write()
    }

    /// Remove `key` from the index and persist. Returns true if it was present.
    pub fn delete(&self, key: &str) -> CacheResult<bool> {
        self.delete_with(key, |previous| Ok(previous.is_some()))
    }

    /// Remove `key`, persist, then run `then` with the removed tags in the
    /// same critical section.
    pub fn delete_with<T, F>(&self, key: &str, then: F) -> CacheResult<T>
    where
        F: FnOnce(Option<&[String]>) -> CacheResult<T>,
    {
        let mut guard = self.lock("delete");
        let map = self.loaded(&mut guard)?;

        let removed = map.remove(key);
        if removed.is_some() {
            if let Err(err) = self.persist(map) {
                if let Some(tags) = removed {
                    map.insert(key.to_string(), tags);
                }
                return Err(err);
            }
            debug!(key, "Removed index entry");
        }
        then(removed.as_deref())
    }

    /// Number of keys in the index.
    pub fn len(&self) -> CacheResult<usize> {
        let mut guard = self.lock("len");
        Ok(self.loaded(&mut guard)?.len())
    }

    pub fn is_empty(&self) -> CacheResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Re-persist the in-memory map. A never-loaded index is left untouched.
    pub fn close(&self) -> CacheResult<()> {
        let guard = self.lock("close");
        match guard.as_ref() {
            Some(map) => self.persist(map),
            None => Ok(()),
        }
    }

    /// Drop the in-memory copy so the next access reads the store again.
    pub fn reload(&self) {
        *self.lock("reload") = None;
    }

    fn lock(&self, op: &'static str) -> MutexGuard<'_, Option<TagMap>> {
        mutex_lock(&self.state, LOCK_TARGET, op)
    }

    /// Load the map into `state` on first access.
    fn loaded<'a>(&self, state: &'a mut Option<TagMap>) -> CacheResult<&'a mut TagMap> {
        let map = match state.take() {
            Some(map) => map,
            None => self.load()?,
        };
        Ok(state.insert(map))
    }

    fn load(&self) -> CacheResult<TagMap> {
        let map = match self.store.get(&[], &self.index_key)? {
            Some(blob) => decode(blob).unwrap_or_else(|err| {
                warn!(
                    index_key = %self.index_key,
                    error = %err,
                    "Key/tags index corrupt, starting empty"
                );
                TagMap::new()
            }),
            None => TagMap::new(),
        };
        debug!(index_key = %self.index_key, entries = map.len(), "Loaded key/tags index");
        Ok(map)
    }

    fn persist(&self, map: &TagMap) -> CacheResult<()> {
        let blob = serde_json::to_value(map).map_err(|e| StorageError::Serialization {
            reason: e.to_string(),
        })?;
        self.store.put(&[], &self.index_key, blob, Expiry::Never)
    }
}

fn decode(blob: Value) -> Result<TagMap, StorageError> {
    serde_json::from_value(blob).map_err(|e| StorageError::IndexCorrupt {
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::InMemoryTaggedStore;
    use serde_json::json;

    const INDEX_KEY: &str = "TagCache_TagMap";

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    fn index() -> (KeyTagIndex, Arc<InMemoryTaggedStore>) {
        let store = Arc::new(InMemoryTaggedStore::new());
        (KeyTagIndex::open(store.clone(), INDEX_KEY), store)
    }

    #[test]
    fn test_set_then_get() {
        let (index, _) = index();
        index.set("k", tags(&["a", "b"])).unwrap();
        assert_eq!(index.get("k").unwrap(), Some(tags(&["a", "b"])));
        assert_eq!(index.get("other").unwrap(), None);
        assert_eq!(index.len().unwrap(), 1);
    }

    #[test]
    fn test_every_mutation_is_persisted() {
        let (index, store) = index();
        index.set("k", tags(&["a"])).unwrap();
        assert_eq!(
            store.get(&[], INDEX_KEY).unwrap(),
            Some(json!({"k": ["a"]}))
        );

        assert!(index.delete("k").unwrap());
        assert_eq!(store.get(&[], INDEX_KEY).unwrap(), Some(json!({})));
        assert!(!index.delete("k").unwrap());
    }

    #[test]
    fn test_second_handle_sees_persisted_map() {
        let (index, store) = index();
        index.set("k", tags(&["a"])).unwrap();

        let other = KeyTagIndex::open(store, INDEX_KEY);
        assert_eq!(other.get("k").unwrap(), Some(tags(&["a"])));
    }

    #[test]
    fn test_corrupt_blob_recovers_as_empty() {
        let (index, store) = index();
        store
            .put(&[], INDEX_KEY, json!("not a map"), Expiry::Never)
            .unwrap();

        assert_eq!(index.get("k").unwrap(), None);
        assert!(index.is_empty().unwrap());

        // Subsequent writes rebuild the index
        index.set("k", tags(&["a"])).unwrap();
        assert_eq!(index.get("k").unwrap(), Some(tags(&["a"])));
    }

    #[test]
    fn test_reload_rereads_store() {
        let (index, store) = index();
        index.set("k", tags(&["a"])).unwrap();

        store
            .put(&[], INDEX_KEY, json!({"x": ["b"]}), Expiry::Never)
            .unwrap();
        assert_eq!(index.get("x").unwrap(), None);

        index.reload();
        assert_eq!(index.get("x").unwrap(), Some(tags(&["b"])));
        assert_eq!(index.get("k").unwrap(), None);
    }

    #[test]
    fn test_close_repersists() {
        let (index, store) = index();
        index.close().unwrap();
        assert_eq!(store.get(&[], INDEX_KEY).unwrap(), None);

        index.set("k", tags(&["a"])).unwrap();
        store.forget(&[], INDEX_KEY).unwrap();
        index.close().unwrap();
        assert_eq!(
            store.get(&[], INDEX_KEY).unwrap(),
            Some(json!({"k": ["a"]}))
        );
    }

    #[test]
    fn test_set_with_runs_write_after_recording() {
        let (index, _) = index();
        let seen = index
            .set_with("k", tags(&["a"]), || Ok(42))
            .unwrap();
        assert_eq!(seen, 42);
        assert_eq!(index.get("k").unwrap(), Some(tags(&["a"])));
    }

    #[test]
    fn test_set_many_with_single_persist() {
        let (index, store) = index();
        index
            .set_many_with(&["x", "y"], tags(&["a"]), || Ok(()))
            .unwrap();
        assert_eq!(
            store.get(&[], INDEX_KEY).unwrap(),
            Some(json!({"x": ["a"], "y": ["a"]}))
        );
    }

    #[test]
    fn test_delete_with_passes_removed_tags() {
        let (index, _) = index();
        index.set("k", tags(&["a"])).unwrap();

        let removed = index
            .delete_with("k", |previous| Ok(previous.map(<[String]>::to_vec)))
            .unwrap();
        assert_eq!(removed, Some(tags(&["a"])));

        let removed = index.delete_with("k", |previous| Ok(previous.is_none())).unwrap();
        assert!(removed);
    }

    #[test]
    fn test_concurrent_sets_do_not_lose_updates() {
        let (index, store) = index();
        let index = Arc::new(index);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let index = Arc::clone(&index);
                std::thread::spawn(move || {
                    for j in 0..10 {
                        index
                            .set(&format!("k{i}-{j}"), vec![format!("t{i}")])
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(index.len().unwrap(), 80);
        let fresh = KeyTagIndex::open(store, INDEX_KEY);
        assert_eq!(fresh.len().unwrap(), 80);
    }
}
