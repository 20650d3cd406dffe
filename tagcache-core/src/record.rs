//! Record abstraction consumed by the engine.
//!
//! The engine never owns domain records. It only needs three things from
//! them: a type name, an optional numeric identifier and the raw attribute
//! map (for foreign-key inference). `RecordTypes` is the registry that
//! decides which type names are valid in a condition.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CacheResult, ValidationError};

/// Numeric record identifier.
pub type RecordId = u64;

/// Attribute map of a record, keyed by attribute name.
pub type Attributes = BTreeMap<String, Value>;

/// Characters that are part of the tag grammar and may never appear in a
/// type name.
const RESERVED_CHARS: [char; 3] = ['-', '(', ')'];

/// A domain record as seen by the invalidation engine.
pub trait Record: Send + Sync {
    /// Name of the record's type, e.g. `"Order"`.
    fn type_name(&self) -> &str;

    /// Identifier, or `None` for records that were never persisted.
    fn identifier(&self) -> Option<RecordId>;

    /// Raw attributes of the record.
    fn attributes(&self) -> Attributes;
}

/// A schemaless record, useful when events arrive from outside the process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicRecord {
    pub type_name: String,
    pub id: Option<RecordId>,
    #[serde(default)]
    pub attributes: Attributes,
}

impl DynamicRecord {
    pub fn new(type_name: impl Into<String>, id: Option<RecordId>) -> Self {
        Self {
            type_name: type_name.into(),
            id,
            attributes: Attributes::new(),
        }
    }

    /// Set an attribute, builder style.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

impl Record for DynamicRecord {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn identifier(&self) -> Option<RecordId> {
        self.id
    }

    fn attributes(&self) -> Attributes {
        self.attributes.clone()
    }
}

/// Check that `value` can appear inside a tag without breaking the grammar.
///
/// Allowed: ASCII alphanumerics plus `_ . : \ /`. The grammar delimiters
/// `-`, `(` and `)` and all whitespace are rejected.
pub fn validate_name(field: &str, value: &str) -> CacheResult<()> {
    let invalid = |reason: String| ValidationError::InvalidIdentifier {
        field: field.to_string(),
        value: value.to_string(),
        reason,
    };

    if value.is_empty() {
        return Err(invalid("must not be empty".to_string()).into());
    }
    if let Some(c) = value.chars().find(|c| RESERVED_CHARS.contains(c)) {
        return Err(invalid(format!("contains tag delimiter {c:?}")).into());
    }
    if let Some(c) = value
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '\\' | '/')))
    {
        return Err(invalid(format!("contains unsupported character {c:?}")).into());
    }
    Ok(())
}

/// Registry of record type names that may appear as a condition's entity type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordTypes {
    names: BTreeSet<String>,
}

impl RecordTypes {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type name. Fails if the name breaks the tag grammar.
    pub fn register(&mut self, name: impl Into<String>) -> CacheResult<()> {
        let name = name.into();
        validate_name("entity_type", &name)?;
        self.names.insert(name);
        Ok(())
    }

    /// Builder-style registration for a list of names.
    pub fn with_types<I, S>(names: I) -> CacheResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut types = Self::new();
        for name in names {
            types.register(name)?;
        }
        Ok(types)
    }

    /// Returns true if `name` is a registered record type.
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Fail with `InvalidEntityType` unless `name` is registered.
    pub fn ensure(&self, name: &str) -> CacheResult<()> {
        if self.contains(name) {
            Ok(())
        } else {
            Err(ValidationError::InvalidEntityType {
                name: name.to_string(),
            }
            .into())
        }
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
