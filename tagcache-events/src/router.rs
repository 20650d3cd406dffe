//! Event router.
//!
//! Turns lifecycle events into flushes. For an event `"<name>: <Type>"`
//! carrying records, the router builds one condition set:
//!
//! 1. `(name, Type)` always
//! 2. `(name, Type, id)` for each record with a non-empty identifier
//! 3. for each record with a non-empty identifier and each related entity
//!    inferred from its attributes, `(attached|detached, Type, id, related,
//!    related_id)`; `detached` when the event is `deleted`, `attached`
//!    otherwise
//!
//! and flushes it in one call. Events with an unknown shape or an
//! unregistered type are ignored. The router holds no state between events.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tagcache_core::{
    CacheResult, Condition, ConditionSet, EventError, LifecycleEvent, Record, RecordId,
};
use tagcache_storage::ManagedCache;
use tracing::{debug, warn};

use crate::bus::{DomainEvent, EventBus};
use crate::foreign_keys::infer_related_entities;

static IDENTIFIER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(created|updated|saved|deleted|restored|attached|detached): ([A-Za-z0-9_.:\\/]+)$")
        .expect("Failed to compile event identifier regex")
});

/// Identifier of a persisted record; zero counts as empty.
fn present_id(record: &dyn Record) -> Option<RecordId> {
    record.identifier().filter(|id| *id != 0)
}

/// Routes lifecycle events to cache flushes.
#[derive(Debug, Clone)]
pub struct EventRouter {
    cache: Arc<ManagedCache>,
}

impl EventRouter {
    pub fn new(cache: Arc<ManagedCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<ManagedCache> {
        &self.cache
    }

    /// Split `"<name>: <Type>"` into its event and entity type.
    pub fn parse_identifier(identifier: &str) -> Result<(LifecycleEvent, &str), EventError> {
        let malformed = || EventError::MalformedEventIdentifier {
            identifier: identifier.to_string(),
        };
        let captures = IDENTIFIER_RE.captures(identifier).ok_or_else(malformed)?;
        let (Some(name), Some(entity_type)) = (captures.get(1), captures.get(2)) else {
            return Err(malformed());
        };
        let event = LifecycleEvent::from_wire(name.as_str()).map_err(|_| malformed())?;
        Ok((event, entity_type.as_str()))
    }

    /// Build the condition set for `event` on `entity_type` carrying `records`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidEntityType` if `entity_type` is not registered. A
    /// related entity whose name breaks the tag grammar is skipped with a
    /// warning.
    pub fn conditions_for(
        &self,
        event: LifecycleEvent,
        entity_type: &str,
        records: &[Arc<dyn Record>],
    ) -> CacheResult<ConditionSet> {
        let types = self.cache.types();
        let mut conditions = self.cache.conditions();
        conditions.push(Condition::for_type(types, event, entity_type)?);

        for record in records {
            if let Some(id) = present_id(record.as_ref()) {
                conditions.push(Condition::for_entity(types, event, entity_type, id)?);
            }
        }

        let relation_event = event.relation_event();
        for record in records {
            // A record without an identifier links to nothing in particular
            let Some(id) = present_id(record.as_ref()) else {
                continue;
            };
            for (related, related_id) in infer_related_entities(&record.attributes()) {
                match Condition::new(
                    types,
                    relation_event,
                    Some(entity_type),
                    Some(id),
                    Some(related.as_str()),
                    Some(related_id),
                ) {
                    Ok(condition) => conditions.push(condition),
                    Err(err) => warn!(
                        entity_type,
                        related = %related,
                        error = %err,
                        "Skipping related entity"
                    ),
                }
            }
        }

        Ok(conditions)
    }

    /// Handle one event.
    ///
    /// Returns `Ok(None)` if the event was ignored, otherwise the number of
    /// flushed values. Store failures propagate.
    pub fn handle(&self, event: &DomainEvent) -> CacheResult<Option<u64>> {
        let (lifecycle, entity_type) = match Self::parse_identifier(&event.identifier) {
            Ok(parsed) => parsed,
            Err(err) => {
                debug!(error = %err, "Ignoring event");
                return Ok(None);
            }
        };
        if !self.cache.types().contains(entity_type) {
            debug!(
                event = %lifecycle,
                entity_type,
                "Ignoring event for unregistered record type"
            );
            return Ok(None);
        }

        let conditions = self.conditions_for(lifecycle, entity_type, event.records())?;
        debug!(
            event = %lifecycle,
            entity_type,
            records = event.records().len(),
            tags = ?conditions.render_tags(),
            "Routing event"
        );
        self.cache.flush_conditions(conditions).map(Some)
    }

    /// Subscribe to every observable event on `bus`.
    pub fn register(self: &Arc<Self>, bus: &dyn EventBus) {
        for event in LifecycleEvent::ALL {
            let router = Arc::clone(self);
            bus.subscribe(
                &format!("{}:*", event.as_str()),
                Arc::new(move |domain_event: &DomainEvent| -> CacheResult<()> {
                    router.handle(domain_event).map(|_| ())
                }),
            );
        }
    }
}
