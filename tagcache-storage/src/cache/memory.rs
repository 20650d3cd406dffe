//! In-process tagged store.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;
use serde_json::Value;
use tagcache_core::{CacheResult, Expiry};
use tracing::debug;

use super::entry::{incremented, StoredEntry};
use super::scoped_key::TagScopedKey;
use super::traits::TaggedStore;
use crate::lock::{rw_read, rw_write};

const LOCK_TARGET: &str = "cache::memory";

/// A `TaggedStore` backed by a hash map.
///
/// Values are lost when the store is dropped. Expired entries are treated as
/// absent, replaced by a write to the same key and swept by every `flush`.
#[derive(Debug, Default)]
pub struct InMemoryTaggedStore {
    prefix: String,
    entries: RwLock<HashMap<Vec<u8>, StoredEntry>>,
}

impl InMemoryTaggedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that prepends `prefix` to every key.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        let now = Utc::now();
        rw_read(&self.entries, LOCK_TARGET, "len")
            .values()
            .filter(|entry| !entry.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn scoped_key(&self, tags: &[String], key: &str) -> TagScopedKey {
        TagScopedKey::new(tags, format!("{}{}", self.prefix, key))
    }

    fn scoped(&self, tags: &[String], key: &str) -> Vec<u8> {
        self.scoped_key(tags, key).encode()
    }
}

impl TaggedStore for InMemoryTaggedStore {
    fn get(&self, tags: &[String], key: &str) -> CacheResult<Option<Value>> {
        let scoped = self.scoped(tags, key);
        let entries = rw_read(&self.entries, LOCK_TARGET, "get");
        Ok(entries
            .get(&scoped)
            .filter(|entry| !entry.is_expired(Utc::now()))
            .map(|entry| entry.value.clone()))
    }

    fn put(&self, tags: &[String], key: &str, value: Value, expiry: Expiry) -> CacheResult<()> {
        let scoped = self.scoped_key(tags, key);
        let entry = StoredEntry::new(tags, value, expiry, Utc::now());
        rw_write(&self.entries, LOCK_TARGET, "put").insert(scoped.encode(), entry);

        debug!(namespace = %scoped.namespace_hex(), key = scoped.key(), "Stored in-memory entry");
        Ok(())
    }

    fn put_many(
        &self,
        tags: &[String],
        entries: Vec<(String, Value)>,
        expiry: Expiry,
    ) -> CacheResult<()> {
        let now = Utc::now();
        let mut map = rw_write(&self.entries, LOCK_TARGET, "put_many");
        for (key, value) in entries {
            map.insert(
                self.scoped(tags, &key),
                StoredEntry::new(tags, value, expiry, now),
            );
        }
        Ok(())
    }

    fn increment(&self, tags: &[String], key: &str, by: i64) -> CacheResult<i64> {
        let scoped = self.scoped(tags, key);
        let now = Utc::now();
        let mut map = rw_write(&self.entries, LOCK_TARGET, "increment");

        let live = map.get(&scoped).filter(|entry| !entry.is_expired(now));
        let next = incremented(live.map(|entry| &entry.value), key, by)?;

        match map.get_mut(&scoped).filter(|entry| !entry.is_expired(now)) {
            Some(entry) => entry.value = Value::from(next),
            None => {
                map.insert(
                    scoped,
                    StoredEntry::new(tags, Value::from(next), Expiry::Never, now),
                );
            }
        }
        Ok(next)
    }

    fn forget(&self, tags: &[String], key: &str) -> CacheResult<bool> {
        let scoped = self.scoped_key(tags, key);
        let removed = rw_write(&self.entries, LOCK_TARGET, "forget").remove(&scoped.encode());
        let forgotten = removed.is_some_and(|entry| !entry.is_expired(Utc::now()));

        debug!(namespace = %scoped.namespace_hex(), key = scoped.key(), forgotten, "Forgot in-memory entry");
        Ok(forgotten)
    }

    fn flush(&self, tags: &[String]) -> CacheResult<u64> {
        let now = Utc::now();
        let mut map = rw_write(&self.entries, LOCK_TARGET, "flush");
        let mut flushed = 0u64;
        let mut swept = 0usize;
        map.retain(|_, entry| {
            if entry.carries_any(tags) {
                flushed += 1;
                false
            } else if entry.is_expired(now) {
                swept += 1;
                false
            } else {
                true
            }
        });

        debug!(tags = ?tags, flushed, swept, "Flushed in-memory entries");
        Ok(flushed)
    }

    fn prefix(&self) -> &str {
        &self.prefix
    }
}
