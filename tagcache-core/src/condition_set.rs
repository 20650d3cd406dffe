//! Fluent accumulation of conditions.
//!
//! # Subject Resolution
//!
//! Builder methods take a [`Subject`]: either a concrete record or a bare
//! type name. For a record, its own identifier is authoritative and any
//! explicitly passed id is ignored, even when the record has no identifier
//! yet. For a type name, the explicit id is used as given.

use std::sync::Arc;

use tracing::debug;

use crate::condition::Condition;
use crate::error::CacheResult;
use crate::event::LifecycleEvent;
use crate::record::{DynamicRecord, Record, RecordId, RecordTypes};

/// What a builder method is about: a record instance or a type name.
#[derive(Clone, Copy)]
pub enum Subject<'a> {
    Record(&'a dyn Record),
    Type(&'a str),
}

impl<'a> Subject<'a> {
    /// Wrap any record.
    pub fn record<R: Record>(record: &'a R) -> Self {
        Subject::Record(record)
    }

    /// Wrap a bare type name.
    pub fn of_type(name: &'a str) -> Self {
        Subject::Type(name)
    }

    /// Resolve to `(type name, id)` following the module-level rule.
    pub fn resolve(&self, explicit_id: Option<RecordId>) -> (&'a str, Option<RecordId>) {
        match *self {
            Subject::Record(record) => {
                if explicit_id.is_some() && explicit_id != record.identifier() {
                    debug!(
                        entity_type = record.type_name(),
                        explicit_id = ?explicit_id,
                        record_id = ?record.identifier(),
                        "Explicit id ignored in favour of record identifier"
                    );
                }
                (record.type_name(), record.identifier())
            }
            Subject::Type(name) => (name, explicit_id),
        }
    }
}

impl std::fmt::Debug for Subject<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Subject::Record(record) => f
                .debug_struct("Record")
                .field("type_name", &record.type_name())
                .field("id", &record.identifier())
                .finish(),
            Subject::Type(name) => f.debug_tuple("Type").field(name).finish(),
        }
    }
}

impl<'a> From<&'a str> for Subject<'a> {
    fn from(name: &'a str) -> Self {
        Subject::Type(name)
    }
}

impl<'a> From<&'a String> for Subject<'a> {
    fn from(name: &'a String) -> Self {
        Subject::Type(name.as_str())
    }
}

impl<'a> From<&'a dyn Record> for Subject<'a> {
    fn from(record: &'a dyn Record) -> Self {
        Subject::Record(record)
    }
}

impl<'a> From<&'a DynamicRecord> for Subject<'a> {
    fn from(record: &'a DynamicRecord) -> Self {
        Subject::Record(record)
    }
}

/// Ordered collection of conditions attached to one cache operation.
///
/// Insertion order is preserved; duplicates are allowed.
#[derive(Debug, Clone)]
pub struct ConditionSet {
    types: Arc<RecordTypes>,
    conditions: Vec<Condition>,
}

impl ConditionSet {
    /// Create an empty set validating entity types against `types`.
    pub fn new(types: Arc<RecordTypes>) -> Self {
        Self {
            types,
            conditions: Vec::new(),
        }
    }

    /// The registry this set validates against.
    pub fn types(&self) -> &Arc<RecordTypes> {
        &self.types
    }

    /// Append an already built condition.
    pub fn push(&mut self, condition: Condition) {
        self.conditions.push(condition);
    }

    /// Append all conditions of `other`, keeping their order.
    pub fn extend(&mut self, other: ConditionSet) {
        self.conditions.extend(other.conditions);
    }

    /// Invalidate when a record of `entity_type` is created.
    pub fn entity_created(mut self, entity_type: &str) -> CacheResult<Self> {
        let condition = Condition::for_type(&self.types, LifecycleEvent::Created, entity_type)?;
        self.conditions.push(condition);
        Ok(self)
    }

    /// Invalidate when the subject (or any record of its type) is updated.
    pub fn entity_updated<'a>(
        self,
        subject: impl Into<Subject<'a>>,
        id: Option<RecordId>,
    ) -> CacheResult<Self> {
        self.entity_event(LifecycleEvent::Updated, subject.into(), id)
    }

    /// Invalidate when the subject (or any record of its type) is saved.
    pub fn entity_saved<'a>(
        self,
        subject: impl Into<Subject<'a>>,
        id: Option<RecordId>,
    ) -> CacheResult<Self> {
        self.entity_event(LifecycleEvent::Saved, subject.into(), id)
    }

    /// Invalidate when the subject (or any record of its type) is deleted.
    pub fn entity_deleted<'a>(
        self,
        subject: impl Into<Subject<'a>>,
        id: Option<RecordId>,
    ) -> CacheResult<Self> {
        self.entity_event(LifecycleEvent::Deleted, subject.into(), id)
    }

    /// Invalidate when the subject (or any record of its type) is restored.
    pub fn entity_restored<'a>(
        self,
        subject: impl Into<Subject<'a>>,
        id: Option<RecordId>,
    ) -> CacheResult<Self> {
        self.entity_event(LifecycleEvent::Restored, subject.into(), id)
    }

    /// Invalidate when a related record is attached to the subject.
    pub fn related_entity_attached<'a, 'b>(
        self,
        subject: impl Into<Subject<'a>>,
        id: Option<RecordId>,
        related: impl Into<Subject<'b>>,
        related_id: Option<RecordId>,
    ) -> CacheResult<Self> {
        self.relation_event(
            LifecycleEvent::Attached,
            subject.into(),
            id,
            related.into(),
            related_id,
        )
    }

    /// Invalidate when a related record is detached from the subject.
    pub fn related_entity_detached<'a, 'b>(
        self,
        subject: impl Into<Subject<'a>>,
        id: Option<RecordId>,
        related: impl Into<Subject<'b>>,
        related_id: Option<RecordId>,
    ) -> CacheResult<Self> {
        self.relation_event(
            LifecycleEvent::Detached,
            subject.into(),
            id,
            related.into(),
            related_id,
        )
    }

    /// Invalidate when the subject is updated through a relation.
    pub fn related_entity_updated<'a, 'b>(
        self,
        subject: impl Into<Subject<'a>>,
        id: Option<RecordId>,
        related: impl Into<Subject<'b>>,
        related_id: Option<RecordId>,
    ) -> CacheResult<Self> {
        self.relation_event(
            LifecycleEvent::Updated,
            subject.into(),
            id,
            related.into(),
            related_id,
        )
    }

    fn entity_event(
        mut self,
        event: LifecycleEvent,
        subject: Subject<'_>,
        id: Option<RecordId>,
    ) -> CacheResult<Self> {
        let (entity_type, id) = subject.resolve(id);
        let condition = Condition::new(&self.types, event, Some(entity_type), id, None, None)?;
        self.conditions.push(condition);
        Ok(self)
    }

    fn relation_event(
        mut self,
        event: LifecycleEvent,
        subject: Subject<'_>,
        id: Option<RecordId>,
        related: Subject<'_>,
        related_id: Option<RecordId>,
    ) -> CacheResult<Self> {
        let (entity_type, id) = subject.resolve(id);
        let (related_type, related_id) = related.resolve(related_id);
        let condition = Condition::new(
            &self.types,
            event,
            Some(entity_type),
            id,
            Some(related_type),
            related_id,
        )?;
        self.conditions.push(condition);
        Ok(self)
    }

    /// Iterate conditions in insertion order. Each call starts over.
    pub fn iter(&self) -> std::slice::Iter<'_, Condition> {
        self.conditions.iter()
    }

    /// Render every condition to its tag, in order.
    pub fn render_tags(&self) -> Vec<String> {
        self.conditions.iter().map(Condition::render).collect()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

impl<'a> IntoIterator for &'a ConditionSet {
    type Item = &'a Condition;
    type IntoIter = std::slice::Iter<'a, Condition>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl IntoIterator for ConditionSet {
    type Item = Condition;
    type IntoIter = std::vec::IntoIter<Condition>;

    fn into_iter(self) -> Self::IntoIter {
        self.conditions.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set() -> ConditionSet {
        let types = RecordTypes::with_types(["Order", "Customer"]).unwrap();
        ConditionSet::new(Arc::new(types))
    }

    #[test]
    fn test_chain_preserves_insertion_order() {
        let conditions = set()
            .entity_created("Order")
            .and_then(|s| s.entity_updated("Order", Some(5)))
            .and_then(|s| s.entity_deleted("Customer", None))
            .unwrap();

        assert_eq!(
            conditions.render_tags(),
            vec![
                "TagCache:created-Order",
                "TagCache:updated-Order(5)",
                "TagCache:deleted-Customer",
            ]
        );
    }

    #[test]
    fn test_iteration_is_restartable() {
        let conditions = set().entity_saved("Order", None).unwrap();
        let first: Vec<_> = conditions.iter().map(Condition::render).collect();
        let second: Vec<_> = (&conditions).into_iter().map(Condition::render).collect();
        assert_eq!(first, second);
        assert_eq!(conditions.len(), 1);
    }

    #[test]
    fn test_record_identifier_wins_over_explicit_id() {
        let order = DynamicRecord::new("Order", Some(7));
        let conditions = set().entity_updated(&order, Some(99)).unwrap();
        assert_eq!(conditions.render_tags(), vec!["TagCache:updated-Order(7)"]);
    }

    #[test]
    fn test_record_without_identifier_ignores_explicit_id() {
        let draft = DynamicRecord::new("Order", None);
        let conditions = set().entity_restored(&draft, Some(99)).unwrap();
        assert_eq!(conditions.render_tags(), vec!["TagCache:restored-Order"]);
    }

    #[test]
    fn test_type_name_uses_explicit_id() {
        let conditions = set()
            .entity_updated("Order", Some(99))
            .and_then(|s| s.entity_updated("Order", None))
            .unwrap();
        assert_eq!(
            conditions.render_tags(),
            vec!["TagCache:updated-Order(99)", "TagCache:updated-Order"]
        );
    }

    #[test]
    fn test_relation_methods() {
        let order = DynamicRecord::new("Order", Some(1));
        let customer = DynamicRecord::new("Customer", Some(42));

        let conditions = set()
            .related_entity_attached(&order, None, &customer, Some(5))
            .and_then(|s| s.related_entity_detached("Order", Some(2), "Customer", Some(3)))
            .and_then(|s| s.related_entity_updated("Order", None, "Customer", None))
            .unwrap();

        assert_eq!(
            conditions.render_tags(),
            vec![
                "TagCache:attached-Order(1)-Customer(42)",
                "TagCache:detached-Order(2)-Customer(3)",
                "TagCache:updated-Order-Customer",
            ]
        );
    }

    #[test]
    fn test_invalid_type_fails_fast() {
        let err = set().entity_created("Invoice").unwrap_err();
        assert!(err.is_invalid_entity_type());
    }

    #[test]
    fn test_duplicates_permitted() {
        let conditions = set()
            .entity_created("Order")
            .and_then(|s| s.entity_created("Order"))
            .unwrap();
        assert_eq!(conditions.len(), 2);
    }

    #[test]
    fn test_push_and_extend() {
        let mut conditions = set();
        conditions.push(Condition::event_class(LifecycleEvent::Saved));
        conditions.extend(set().entity_created("Customer").unwrap());
        assert_eq!(
            conditions.render_tags(),
            vec!["TagCache:saved", "TagCache:created-Customer"]
        );
        assert_eq!(conditions.into_iter().count(), 2);
    }

    #[test]
    fn test_subject_resolution() {
        let order = DynamicRecord::new("Order", Some(3));
        assert_eq!(Subject::record(&order).resolve(Some(8)), ("Order", Some(3)));
        assert_eq!(Subject::of_type("Order").resolve(Some(8)), ("Order", Some(8)));
        assert_eq!(Subject::from("Order").resolve(None), ("Order", None));
    }
}
