//! The underlying tagging-capable store.
//!
//! This trait is the narrow interface the engine consumes. Implementations
//! must be thread-safe and support concurrent access.
//!
//! # Tag Scoping
//!
//! Every keyed operation takes the ordered tag sequence the value lives
//! under. A value stored under tags `T` is only visible to reads made under
//! exactly `T`; the empty sequence is the plain, untagged namespace.
//! `flush(tags)` deletes every value whose tag sequence contains any of
//! `tags`, regardless of key.

use serde_json::Value;
use tagcache_core::{CacheResult, Expiry};

/// Tagging-capable key/value store.
///
/// All operations fail with `StoreUnavailable` when the backend cannot be
/// reached. Implementations never retry internally.
pub trait TaggedStore: Send + Sync {
    /// Get a value stored under `tags`, or `None` if absent or expired.
    fn get(&self, tags: &[String], key: &str) -> CacheResult<Option<Value>>;

    /// Store a value under `tags`, replacing any previous value.
    fn put(&self, tags: &[String], key: &str, value: Value, expiry: Expiry) -> CacheResult<()>;

    /// Store several values under the same tags.
    fn put_many(
        &self,
        tags: &[String],
        entries: Vec<(String, Value)>,
        expiry: Expiry,
    ) -> CacheResult<()> {
        for (key, value) in entries {
            self.put(tags, &key, value, expiry)?;
        }
        Ok(())
    }

    /// Add `by` to an integer value and return the new value.
    ///
    /// A missing value starts from zero and is stored without expiration.
    fn increment(&self, tags: &[String], key: &str, by: i64) -> CacheResult<i64>;

    /// Subtract `by` from an integer value and return the new value.
    fn decrement(&self, tags: &[String], key: &str, by: i64) -> CacheResult<i64> {
        self.increment(tags, key, by.saturating_neg())
    }

    /// Delete a value stored under `tags`. Returns true if one existed.
    fn forget(&self, tags: &[String], key: &str) -> CacheResult<bool>;

    /// Delete every value carrying any of `tags`. Returns the number deleted.
    ///
    /// Flushing an already flushed tag is a no-op, never an error.
    fn flush(&self, tags: &[String]) -> CacheResult<u64>;

    /// Key prefix applied by this store.
    fn prefix(&self) -> &str;
}
