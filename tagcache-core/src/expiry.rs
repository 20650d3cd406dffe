//! Expiration policy for stored values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How long a stored value lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expiry {
    /// Never expires
    Never,
    /// Expires after the given duration
    After(Duration),
}

impl Expiry {
    /// Expire after `secs` seconds.
    pub fn secs(secs: u64) -> Self {
        Expiry::After(Duration::from_secs(secs))
    }

    /// Expire after `minutes` minutes. Saturates on overflow.
    pub fn minutes(minutes: u64) -> Self {
        Expiry::After(Duration::from_secs(minutes.saturating_mul(60)))
    }

    /// Absolute expiration instant relative to `now`, or `None` for `Never`.
    ///
    /// Durations too large for chrono saturate to "never".
    pub fn deadline(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Expiry::Never => None,
            Expiry::After(duration) => chrono::Duration::from_std(*duration)
                .ok()
                .and_then(|d| now.checked_add_signed(d)),
        }
    }

    pub fn is_never(&self) -> bool {
        matches!(self, Expiry::Never)
    }
}

impl Default for Expiry {
    fn default() -> Self {
        Expiry::Never
    }
}
