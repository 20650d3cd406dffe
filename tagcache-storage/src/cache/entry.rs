//! Stored entry format shared by the store backends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tagcache_core::{CacheResult, Expiry, StorageError};

/// Header value meaning "no expiration".
const NEVER_EXPIRES: i64 = i64::MAX;

/// A value together with the tag sequence it was stored under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEntry {
    pub tags: Vec<String>,
    pub value: Value,
    #[serde(skip)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredEntry {
    pub fn new(tags: &[String], value: Value, expiry: Expiry, now: DateTime<Utc>) -> Self {
        Self {
            tags: tags.to_vec(),
            value,
            expires_at: expiry.deadline(now),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }

    /// Returns true if the entry was stored under any of `tags`.
    pub fn carries_any(&self, tags: &[String]) -> bool {
        self.tags.iter().any(|t| tags.contains(t))
    }

    /// Encode as `[expires_at millis: 8 bytes LE][json {tags, value}]`.
    pub fn encode(&self) -> CacheResult<Vec<u8>> {
        let header = self
            .expires_at
            .map(|deadline| deadline.timestamp_millis())
            .unwrap_or(NEVER_EXPIRES);
        let body = serde_json::to_vec(self).map_err(|e| StorageError::Serialization {
            reason: e.to_string(),
        })?;

        let mut bytes = Vec::with_capacity(8 + body.len());
        bytes.extend_from_slice(&header.to_le_bytes());
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> CacheResult<Self> {
        if bytes.len() < 8 {
            return Err(StorageError::Serialization {
                reason: format!("entry too short: {} bytes", bytes.len()),
            }
            .into());
        }

        let mut header = [0u8; 8];
        header.copy_from_slice(&bytes[..8]);
        let millis = i64::from_le_bytes(header);

        let mut entry: StoredEntry =
            serde_json::from_slice(&bytes[8..]).map_err(|e| StorageError::Serialization {
                reason: e.to_string(),
            })?;
        entry.expires_at = if millis == NEVER_EXPIRES {
            None
        } else {
            Some(DateTime::from_timestamp_millis(millis).ok_or_else(|| {
                StorageError::Serialization {
                    reason: format!("invalid expiry timestamp {millis}"),
                }
            })?)
        };
        Ok(entry)
    }
}

/// Compute the result of adding `by` to the current value of `key`.
///
/// A missing value counts as zero. Integers and decimal strings are numeric;
/// anything else fails with `NotNumeric`.
pub fn incremented(current: Option<&Value>, key: &str, by: i64) -> CacheResult<i64> {
    let not_numeric = || StorageError::NotNumeric {
        key: key.to_string(),
    };
    let base = match current {
        None => 0,
        Some(Value::Number(n)) => n.as_i64().ok_or_else(not_numeric)?,
        Some(Value::String(s)) => s.trim().parse::<i64>().map_err(|_| not_numeric())?,
        Some(_) => return Err(not_numeric().into()),
    };
    Ok(base.saturating_add(by))
}
