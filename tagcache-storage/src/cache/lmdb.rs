//! LMDB-backed tagged store.
//!
//! Uses the heed crate (Rust bindings for LMDB) to provide a persistent,
//! memory-mapped tagged store. Values and the key/tags index survive a
//! process restart.
//!
//! # Layout
//!
//! Two named databases live in one environment:
//! - `entries`: encoded [`TagScopedKey`] → encoded [`StoredEntry`]
//! - `refs`: `tag \0 entry-key` → empty, one row per tag of each entry
//!
//! Flushing a tag walks only the `tag \0` prefix range of `refs`, deletes the entries
//! it points at and every ref row those entries own.
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. Reads use read transactions; every
//! mutation (including the read-modify-write of `increment`) runs in a single
//! write transaction.

use std::path::Path;

use chrono::Utc;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions, RwTxn};
use serde_json::Value;
use tagcache_core::{CacheConfig, CacheError, CacheResult, Expiry};
use tracing::debug;

use super::entry::{incremented, StoredEntry};
use super::scoped_key::TagScopedKey;
use super::traits::TaggedStore;

const ENTRIES_DB: &str = "entries";
const REFS_DB: &str = "refs";
const REF_SEPARATOR: u8 = 0;

/// Error type for LMDB store operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbStoreError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open a database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Backend failures surface as an unreachable store.
impl From<LmdbStoreError> for CacheError {
    fn from(e: LmdbStoreError) -> Self {
        CacheError::store_unavailable(e.to_string())
    }
}

fn txn_error(e: heed::Error) -> LmdbStoreError {
    LmdbStoreError::Transaction(e.to_string())
}

/// LMDB-backed `TaggedStore`.
///
/// # Example
///
/// ```ignore
/// use tagcache_storage::cache::LmdbTaggedStore;
///
/// let store = LmdbTaggedStore::open("/var/cache/app", 64)?;
/// store.put(&tags, "orders:recent", value, Expiry::Never)?;
/// ```
pub struct LmdbTaggedStore {
    env: Env,
    entries: Database<Bytes, Bytes>,
    refs: Database<Bytes, Bytes>,
    prefix: String,
}

impl LmdbTaggedStore {
    /// Open (or create) a store in `path`.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created
    /// - LMDB environment cannot be opened
    /// - A database cannot be created
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbStoreError> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(2)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbStoreError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_error)?;
        let entries: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, Some(ENTRIES_DB))
            .map_err(|e| LmdbStoreError::DbOpen(e.to_string()))?;
        let refs: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, Some(REFS_DB))
            .map_err(|e| LmdbStoreError::DbOpen(e.to_string()))?;
        wtxn.commit().map_err(txn_error)?;

        debug!(path = %path.as_ref().display(), max_size_mb, "Opened LMDB tagged store");

        Ok(Self {
            env,
            entries,
            refs,
            prefix: String::new(),
        })
    }

    /// Open a store sized by `config.lmdb_max_size_mb`.
    pub fn open_with_config<P: AsRef<Path>>(path: P, config: &CacheConfig) -> CacheResult<Self> {
        config.validate()?;
        Ok(Self::open(path, config.lmdb_max_size_mb)?)
    }

    /// Prepend `prefix` to every key.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn scoped_key(&self, tags: &[String], key: &str) -> TagScopedKey {
        TagScopedKey::new(tags, format!("{}{}", self.prefix, key))
    }

    fn scoped(&self, tags: &[String], key: &str) -> Vec<u8> {
        self.scoped_key(tags, key).encode()
    }

    fn ref_key(tag: &str, entry_key: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(tag.len() + 1 + entry_key.len());
        bytes.extend_from_slice(tag.as_bytes());
        bytes.push(REF_SEPARATOR);
        bytes.extend_from_slice(entry_key);
        bytes
    }

    /// Read and decode an entry inside an open transaction.
    fn read_entry(&self, txn: &heed::RoTxn, entry_key: &[u8]) -> CacheResult<Option<StoredEntry>> {
        match self.entries.get(txn, entry_key).map_err(txn_error)? {
            Some(bytes) => Ok(Some(StoredEntry::decode(bytes)?)),
            None => Ok(None),
        }
    }

    /// Write an entry and its ref rows.
    fn write_entry(
        &self,
        wtxn: &mut RwTxn,
        entry_key: &[u8],
        entry: &StoredEntry,
    ) -> CacheResult<()> {
        // Drop refs of a previous value under the same key
        self.delete_entry(wtxn, entry_key)?;

        let bytes = entry.encode()?;
        self.entries
            .put(wtxn, entry_key, &bytes)
            .map_err(txn_error)?;
        for tag in &entry.tags {
            self.refs
                .put(wtxn, &Self::ref_key(tag, entry_key), &[])
                .map_err(txn_error)?;
        }
        Ok(())
    }

    /// Delete an entry and its ref rows. Returns the removed entry.
    fn delete_entry(&self, wtxn: &mut RwTxn, entry_key: &[u8]) -> CacheResult<Option<StoredEntry>> {
        let Some(entry) = self.read_entry(wtxn, entry_key)? else {
            return Ok(None);
        };
        self.entries.delete(wtxn, entry_key).map_err(txn_error)?;
        for tag in &entry.tags {
            self.refs
                .delete(wtxn, &Self::ref_key(tag, entry_key))
                .map_err(txn_error)?;
        }
        Ok(Some(entry))
    }

    /// Collect the entry keys of the ref rows under `prefix`.
    ///
    /// Positions a cursor at the prefix, so the cost follows the number of
    /// matching rows rather than the size of `refs`.
    fn collect_entries_with_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>, LmdbStoreError> {
        let rtxn = self.env.read_txn().map_err(txn_error)?;

        let mut keys = Vec::new();
        let iter = self.refs.prefix_iter(&rtxn, prefix).map_err(txn_error)?;
        for result in iter {
            let (key, _) = result.map_err(txn_error)?;
            keys.push(key[prefix.len()..].to_vec());
        }

        Ok(keys)
    }
}

impl TaggedStore for LmdbTaggedStore {
    fn get(&self, tags: &[String], key: &str) -> CacheResult<Option<Value>> {
        let rtxn = self.env.read_txn().map_err(txn_error)?;
        let entry = self.read_entry(&rtxn, &self.scoped(tags, key))?;
        Ok(entry
            .filter(|entry| !entry.is_expired(Utc::now()))
            .map(|entry| entry.value))
    }

    fn put(&self, tags: &[String], key: &str, value: Value, expiry: Expiry) -> CacheResult<()> {
        let scoped = self.scoped_key(tags, key);
        let entry = StoredEntry::new(tags, value, expiry, Utc::now());
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        self.write_entry(&mut wtxn, &scoped.encode(), &entry)?;
        wtxn.commit().map_err(txn_error)?;

        debug!(namespace = %scoped.namespace_hex(), key = scoped.key(), "Stored LMDB entry");
        Ok(())
    }

    fn put_many(
        &self,
        tags: &[String],
        entries: Vec<(String, Value)>,
        expiry: Expiry,
    ) -> CacheResult<()> {
        let now = Utc::now();
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        for (key, value) in entries {
            let entry = StoredEntry::new(tags, value, expiry, now);
            self.write_entry(&mut wtxn, &self.scoped(tags, &key), &entry)?;
        }
        wtxn.commit().map_err(txn_error)?;
        Ok(())
    }

    fn increment(&self, tags: &[String], key: &str, by: i64) -> CacheResult<i64> {
        let now = Utc::now();
        let scoped = self.scoped(tags, key);
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;

        let current = self
            .read_entry(&wtxn, &scoped)?
            .filter(|entry| !entry.is_expired(now));
        let next = incremented(current.as_ref().map(|entry| &entry.value), key, by)?;

        let entry = match current {
            Some(mut entry) => {
                entry.value = Value::from(next);
                entry
            }
            None => StoredEntry::new(tags, Value::from(next), Expiry::Never, now),
        };
        self.write_entry(&mut wtxn, &scoped, &entry)?;
        wtxn.commit().map_err(txn_error)?;
        Ok(next)
    }

    fn forget(&self, tags: &[String], key: &str) -> CacheResult<bool> {
        let scoped = self.scoped_key(tags, key);
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let removed = self.delete_entry(&mut wtxn, &scoped.encode())?;
        wtxn.commit().map_err(txn_error)?;
        let forgotten = removed.is_some_and(|entry| !entry.is_expired(Utc::now()));

        debug!(namespace = %scoped.namespace_hex(), key = scoped.key(), forgotten, "Forgot LMDB entry");
        Ok(forgotten)
    }

    fn flush(&self, tags: &[String]) -> CacheResult<u64> {
        let mut targets = Vec::new();
        for tag in tags {
            targets.extend(self.collect_entries_with_prefix(&Self::ref_key(tag, &[]))?);
        }

        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let mut flushed = 0u64;
        for entry_key in &targets {
            if self.delete_entry(&mut wtxn, entry_key)?.is_some() {
                flushed += 1;
            }
        }
        wtxn.commit().map_err(txn_error)?;

        debug!(tags = ?tags, flushed, "Flushed LMDB entries");
        Ok(flushed)
    }

    fn prefix(&self) -> &str {
        &self.prefix
    }
}
