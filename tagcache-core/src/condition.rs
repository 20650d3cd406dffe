//! Invalidation conditions and their canonical tag encoding.
//!
//! A `Condition` is the only notion of "what invalidates this value" the
//! engine has. Its rendered tag string is the sole equality used against
//! the underlying store, so the encoding must be injective.
//!
//! # Tag Format
//!
//! ```text
//! tag          := PREFIX event ( "-" modelPart ( "-" relationPart )? )?
//! modelPart    := entityType ( "(" entityId ")" )?
//! relationPart := relatedType ( "(" relatedId ")" )?
//! ```
//!
//! Injectivity holds because event wire names and validated type names
//! never contain `-`, `(` or `)`, and identifiers are unsigned integers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CacheResult, ValidationError};
use crate::event::LifecycleEvent;
use crate::record::{validate_name, RecordId, RecordTypes};

/// Namespace marker prepended to every tag.
pub const TAG_PREFIX: &str = "TagCache:";

const SEPARATOR: char = '-';
const ID_OPEN: char = '(';
const ID_CLOSE: char = ')';

/// The related side of a relation condition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
struct RelatedPart {
    type_name: String,
    id: Option<RecordId>,
}

/// The entity side of a condition, optionally carrying a relation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
struct EntityPart {
    type_name: String,
    id: Option<RecordId>,
    related: Option<RelatedPart>,
}

/// One invalidation trigger: an event, optionally narrowed to an entity
/// type, a single entity, and a related entity.
///
/// The nesting of the private parts encodes the field invariants: an id
/// cannot exist without its type, and a relation cannot exist without an
/// entity type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Condition {
    event: LifecycleEvent,
    entity: Option<EntityPart>,
}

impl Condition {
    /// Build a condition from its flat field list.
    ///
    /// # Errors
    ///
    /// - `InvalidEntityType` if `entity_type` is not registered in `types`
    /// - `InvalidIdentifier` if an id or relation is given without the type
    ///   it belongs to, or if `related_type` breaks the tag grammar
    pub fn new(
        types: &RecordTypes,
        event: LifecycleEvent,
        entity_type: Option<&str>,
        entity_id: Option<RecordId>,
        related_type: Option<&str>,
        related_id: Option<RecordId>,
    ) -> CacheResult<Self> {
        let Some(entity_type) = entity_type else {
            if entity_id.is_some() || related_type.is_some() || related_id.is_some() {
                return Err(orphan_field("entity_type", "entity fields require an entity type"));
            }
            return Ok(Self::event_class(event));
        };
        types.ensure(entity_type)?;

        let related = match (related_type, related_id) {
            (Some(name), id) => {
                validate_name("related_entity_type", name)?;
                Some(RelatedPart {
                    type_name: name.to_string(),
                    id,
                })
            }
            (None, Some(_)) => {
                return Err(orphan_field(
                    "related_entity_type",
                    "related id requires a related type",
                ))
            }
            (None, None) => None,
        };

        Ok(Self {
            event,
            entity: Some(EntityPart {
                type_name: entity_type.to_string(),
                id: entity_id,
                related,
            }),
        })
    }

    /// A condition matching every occurrence of `event`, regardless of type.
    pub fn event_class(event: LifecycleEvent) -> Self {
        Self {
            event,
            entity: None,
        }
    }

    /// A condition on every record of `entity_type`.
    pub fn for_type(
        types: &RecordTypes,
        event: LifecycleEvent,
        entity_type: &str,
    ) -> CacheResult<Self> {
        Self::new(types, event, Some(entity_type), None, None, None)
    }

    /// A condition on a single record.
    pub fn for_entity(
        types: &RecordTypes,
        event: LifecycleEvent,
        entity_type: &str,
        entity_id: RecordId,
    ) -> CacheResult<Self> {
        Self::new(types, event, Some(entity_type), Some(entity_id), None, None)
    }

    pub fn event(&self) -> LifecycleEvent {
        self.event
    }

    pub fn entity_type(&self) -> Option<&str> {
        self.entity.as_ref().map(|e| e.type_name.as_str())
    }

    pub fn entity_id(&self) -> Option<RecordId> {
        self.entity.as_ref().and_then(|e| e.id)
    }

    pub fn related_entity_type(&self) -> Option<&str> {
        self.related().map(|r| r.type_name.as_str())
    }

    pub fn related_entity_id(&self) -> Option<RecordId> {
        self.related().and_then(|r| r.id)
    }

    fn related(&self) -> Option<&RelatedPart> {
        self.entity.as_ref().and_then(|e| e.related.as_ref())
    }

    /// Render the canonical tag string.
    pub fn render(&self) -> String {
        let mut tag = String::with_capacity(48);
        tag.push_str(TAG_PREFIX);
        tag.push_str(self.event.as_str());

        if let Some(entity) = &self.entity {
            tag.push(SEPARATOR);
            push_part(&mut tag, &entity.type_name, entity.id);
            if let Some(related) = &entity.related {
                tag.push(SEPARATOR);
                push_part(&mut tag, &related.type_name, related.id);
            }
        }
        tag
    }

    /// Parse a rendered tag back into a condition.
    ///
    /// The entity type is checked against `types` exactly as in [`Condition::new`].
    pub fn parse(tag: &str, types: &RecordTypes) -> CacheResult<Self> {
        let malformed = |reason: &str| ValidationError::MalformedTag {
            tag: tag.to_string(),
            reason: reason.to_string(),
        };

        let body = tag
            .strip_prefix(TAG_PREFIX)
            .ok_or_else(|| malformed("missing prefix"))?;

        let (event_name, rest) = match body.split_once(SEPARATOR) {
            Some((event_name, rest)) => (event_name, Some(rest)),
            None => (body, None),
        };
        let event =
            LifecycleEvent::from_wire(event_name).map_err(|_| malformed("unknown event"))?;

        let Some(rest) = rest else {
            return Ok(Self::event_class(event));
        };

        let (model, relation) = match rest.split_once(SEPARATOR) {
            Some((model, relation)) => (model, Some(relation)),
            None => (rest, None),
        };
        let (entity_type, entity_id) =
            split_part(model).ok_or_else(|| malformed("invalid entity part"))?;
        let (related_type, related_id) = match relation {
            Some(relation) => {
                let (name, id) =
                    split_part(relation).ok_or_else(|| malformed("invalid relation part"))?;
                (Some(name), id)
            }
            None => (None, None),
        };

        Self::new(
            types,
            event,
            Some(entity_type),
            entity_id,
            related_type,
            related_id,
        )
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

fn orphan_field(field: &str, reason: &str) -> crate::error::CacheError {
    ValidationError::InvalidIdentifier {
        field: field.to_string(),
        value: String::new(),
        reason: reason.to_string(),
    }
    .into()
}

fn push_part(tag: &mut String, name: &str, id: Option<RecordId>) {
    tag.push_str(name);
    if let Some(id) = id {
        tag.push(ID_OPEN);
        tag.push_str(&id.to_string());
        tag.push(ID_CLOSE);
    }
}

/// Split `Name` or `Name(42)` into its name and optional id.
fn split_part(part: &str) -> Option<(&str, Option<RecordId>)> {
    match part.strip_suffix(ID_CLOSE) {
        Some(inner) => {
            let (name, id) = inner.split_once(ID_OPEN)?;
            if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            Some((name, Some(id.parse().ok()?)))
        }
        None if part.contains(ID_OPEN) => None,
        None => Some((part, None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;

    fn types() -> RecordTypes {
        RecordTypes::with_types(["Order", "Customer", "app::User"]).unwrap()
    }

    #[test]
    fn test_render_event_only() {
        let condition = Condition::event_class(LifecycleEvent::Created);
        assert_eq!(condition.render(), "TagCache:created");
    }

    #[test]
    fn test_render_type_only() {
        let condition = Condition::for_type(&types(), LifecycleEvent::Updated, "Order").unwrap();
        assert_eq!(condition.render(), "TagCache:updated-Order");
    }

    #[test]
    fn test_render_type_and_id() {
        let condition =
            Condition::for_entity(&types(), LifecycleEvent::Updated, "Order", 5).unwrap();
        assert_eq!(condition.render(), "TagCache:updated-Order(5)");
    }

    #[test]
    fn test_render_relation_variants() {
        let t = types();
        let cases = [
            (None, None, "TagCache:attached-Order-customer"),
            (None, Some(42), "TagCache:attached-Order-customer(42)"),
            (Some(7), None, "TagCache:attached-Order(7)-customer"),
            (Some(7), Some(42), "TagCache:attached-Order(7)-customer(42)"),
        ];
        for (id, related_id, expected) in cases {
            let condition = Condition::new(
                &t,
                LifecycleEvent::Attached,
                Some("Order"),
                id,
                Some("customer"),
                related_id,
            )
            .unwrap();
            assert_eq!(condition.render(), expected);
        }
    }

    #[test]
    fn test_render_is_deterministic() {
        let condition =
            Condition::for_entity(&types(), LifecycleEvent::Saved, "app::User", 9).unwrap();
        assert_eq!(condition.render(), condition.render());
        assert_eq!(condition.to_string(), condition.render());
    }

    #[test]
    fn test_unregistered_type_fails_at_construction() {
        let err = Condition::for_type(&types(), LifecycleEvent::Created, "Invoice").unwrap_err();
        assert!(err.is_invalid_entity_type());
    }

    #[test]
    fn test_orphan_fields_rejected() {
        let t = types();
        let err = Condition::new(&t, LifecycleEvent::Created, None, Some(1), None, None)
            .unwrap_err();
        assert!(matches!(
            err,
            CacheError::Validation(ValidationError::InvalidIdentifier { .. })
        ));

        let err = Condition::new(&t, LifecycleEvent::Created, Some("Order"), None, None, Some(3))
            .unwrap_err();
        assert!(matches!(
            err,
            CacheError::Validation(ValidationError::InvalidIdentifier { .. })
        ));
    }

    #[test]
    fn test_related_type_must_respect_grammar() {
        let err = Condition::new(
            &types(),
            LifecycleEvent::Attached,
            Some("Order"),
            None,
            Some("line-item"),
            None,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CacheError::Validation(ValidationError::InvalidIdentifier { .. })
        ));
    }

    #[test]
    fn test_accessors() {
        let condition = Condition::new(
            &types(),
            LifecycleEvent::Detached,
            Some("Order"),
            Some(1),
            Some("customer"),
            Some(2),
        )
        .unwrap();
        assert_eq!(condition.event(), LifecycleEvent::Detached);
        assert_eq!(condition.entity_type(), Some("Order"));
        assert_eq!(condition.entity_id(), Some(1));
        assert_eq!(condition.related_entity_type(), Some("customer"));
        assert_eq!(condition.related_entity_id(), Some(2));
    }

    #[test]
    fn test_parse_known_tags() {
        let t = types();
        let condition = Condition::parse("TagCache:updated-Order(5)", &t).unwrap();
        assert_eq!(
            condition,
            Condition::for_entity(&t, LifecycleEvent::Updated, "Order", 5).unwrap()
        );

        let condition = Condition::parse("TagCache:restored", &t).unwrap();
        assert_eq!(condition, Condition::event_class(LifecycleEvent::Restored));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        let t = types();
        for bad in [
            "updated-Order",
            "TagCache:",
            "TagCache:bogus-Order",
            "TagCache:updated-Order(",
            "TagCache:updated-Order()",
            "TagCache:updated-Order(x)",
            "TagCache:updated-Order(1)(2)",
            "TagCache:updated-Or(der",
        ] {
            assert!(Condition::parse(bad, &t).is_err(), "expected error for {bad:?}");
        }
    }

    #[test]
    fn test_parse_rejects_unregistered_type() {
        let err = Condition::parse("TagCache:updated-Invoice(1)", &types()).unwrap_err();
        assert!(err.is_invalid_entity_type());
    }
}
