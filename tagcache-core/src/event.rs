//! Lifecycle event names observed by the invalidation engine.
//!
//! The set is closed: every condition names one of these events, and the
//! event router only subscribes to these names. Each variant has a stable
//! wire name that appears both in event identifiers (`"created: Order"`)
//! and in rendered tags (`"TagCache:created-Order(5)"`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A record lifecycle or relation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleEvent {
    Created,
    Updated,
    Saved,
    Deleted,
    Restored,
    Attached,
    Detached,
}

impl LifecycleEvent {
    /// Every observable event, in subscription order.
    pub const ALL: [LifecycleEvent; 7] = [
        LifecycleEvent::Created,
        LifecycleEvent::Updated,
        LifecycleEvent::Saved,
        LifecycleEvent::Deleted,
        LifecycleEvent::Restored,
        LifecycleEvent::Attached,
        LifecycleEvent::Detached,
    ];

    /// Wire name used in event identifiers and tags.
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleEvent::Created => "created",
            LifecycleEvent::Updated => "updated",
            LifecycleEvent::Saved => "saved",
            LifecycleEvent::Deleted => "deleted",
            LifecycleEvent::Restored => "restored",
            LifecycleEvent::Attached => "attached",
            LifecycleEvent::Detached => "detached",
        }
    }

    /// Parse a wire name. Matching is exact (case-sensitive).
    pub fn from_wire(s: &str) -> Result<Self, LifecycleEventParseError> {
        LifecycleEvent::ALL
            .iter()
            .copied()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| LifecycleEventParseError(s.to_string()))
    }

    /// Relation event emitted for foreign keys of a record hit by `self`.
    ///
    /// Deleting a record detaches it from everything it references; any
    /// other lifecycle event (re)attaches it.
    pub fn relation_event(&self) -> LifecycleEvent {
        match self {
            LifecycleEvent::Deleted => LifecycleEvent::Detached,
            _ => LifecycleEvent::Attached,
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleEvent {
    type Err = LifecycleEventParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_wire(s)
    }
}

/// Error when parsing an unknown lifecycle event name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEventParseError(pub String);

impl fmt::Display for LifecycleEventParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown lifecycle event: {}", self.0)
    }
}

impl std::error::Error for LifecycleEventParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_roundtrip() {
        for event in LifecycleEvent::ALL {
            assert_eq!(LifecycleEvent::from_wire(event.as_str()), Ok(event));
            assert_eq!(event.to_string().parse::<LifecycleEvent>(), Ok(event));
        }
    }

    #[test]
    fn test_unknown_name_rejected() {
        let err = LifecycleEvent::from_wire("Created").unwrap_err();
        assert_eq!(err, LifecycleEventParseError("Created".to_string()));
        assert!(LifecycleEvent::from_wire("creating").is_err());
    }

    #[test]
    fn test_wire_names_have_no_tag_delimiters() {
        for event in LifecycleEvent::ALL {
            assert!(!event.as_str().contains(['-', '(', ')', ':', ' ']));
        }
    }

    #[test]
    fn test_relation_event() {
        assert_eq!(
            LifecycleEvent::Deleted.relation_event(),
            LifecycleEvent::Detached
        );
        assert_eq!(
            LifecycleEvent::Created.relation_event(),
            LifecycleEvent::Attached
        );
        assert_eq!(
            LifecycleEvent::Restored.relation_event(),
            LifecycleEvent::Attached
        );
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&LifecycleEvent::Restored).unwrap();
        assert_eq!(json, "\"restored\"");
    }
}
