//! Domain event bus.
//!
//! The engine only needs to subscribe to lifecycle notifications. The
//! [`EventBus`] trait is that seam; [`InMemoryEventBus`] is an in-process
//! implementation for applications without a bus of their own and for tests.

use std::fmt;
use std::sync::{Arc, RwLock};

use tagcache_core::{CacheResult, LifecycleEvent, Record};
use tagcache_storage::lock::{rw_read, rw_write};
use tracing::debug;

const LOCK_TARGET: &str = "events::bus";

/// Event payload: one record or several.
#[derive(Clone)]
pub enum EventPayload {
    One(Arc<dyn Record>),
    Many(Vec<Arc<dyn Record>>),
}

impl EventPayload {
    /// The payload as a sequence; a single record is a sequence of one.
    pub fn records(&self) -> &[Arc<dyn Record>] {
        match self {
            EventPayload::One(record) => std::slice::from_ref(record),
            EventPayload::Many(records) => records,
        }
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }
}

impl fmt::Debug for EventPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(
                self.records()
                    .iter()
                    .map(|r| (r.type_name().to_string(), r.identifier())),
            )
            .finish()
    }
}

/// A lifecycle notification as delivered by the bus.
#[derive(Debug, Clone)]
pub struct DomainEvent {
    /// Event identifier, e.g. `"updated: Order"`.
    pub identifier: String,
    pub payload: EventPayload,
}

impl DomainEvent {
    /// An event about a single record.
    pub fn single(identifier: impl Into<String>, record: Arc<dyn Record>) -> Self {
        Self {
            identifier: identifier.into(),
            payload: EventPayload::One(record),
        }
    }

    /// An event about several records.
    pub fn many(identifier: impl Into<String>, records: Vec<Arc<dyn Record>>) -> Self {
        Self {
            identifier: identifier.into(),
            payload: EventPayload::Many(records),
        }
    }

    /// The canonical event for `record`: identifier `"<event>: <type>"`.
    pub fn for_record<R: Record + 'static>(event: LifecycleEvent, record: R) -> Self {
        let name = identifier(event, record.type_name());
        Self::single(name, Arc::new(record))
    }

    pub fn records(&self) -> &[Arc<dyn Record>] {
        self.payload.records()
    }
}

/// Build an event identifier: `"<event>: <type>"`.
pub fn identifier(event: LifecycleEvent, entity_type: &str) -> String {
    format!("{}: {}", event.as_str(), entity_type)
}

/// Handler invoked for each matching event.
pub type EventHandler = Arc<dyn Fn(&DomainEvent) -> CacheResult<()> + Send + Sync>;

/// Subscription seam between the engine and a domain event bus.
pub trait EventBus: Send + Sync {
    /// Register `handler` for identifiers matching `pattern`.
    ///
    /// A pattern is either an exact identifier or a prefix followed by `*`.
    fn subscribe(&self, pattern: &str, handler: EventHandler);

    /// Deliver `event` to every matching handler in subscription order.
    ///
    /// Stops at and returns the first handler error. Returns the number of
    /// handlers invoked otherwise.
    fn publish(&self, event: &DomainEvent) -> CacheResult<usize>;
}

/// Convenience methods for any [`EventBus`].
pub trait EventBusExt: EventBus {
    /// Publish the canonical event for `record`.
    fn publish_record<R: Record + 'static>(
        &self,
        event: LifecycleEvent,
        record: R,
    ) -> CacheResult<usize> {
        self.publish(&DomainEvent::for_record(event, record))
    }
}

impl<T: EventBus + ?Sized> EventBusExt for T {}

/// Returns true if `identifier` matches a subscription pattern.
pub fn pattern_matches(pattern: &str, identifier: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => identifier.starts_with(prefix),
        None => pattern == identifier,
    }
}

/// In-process event bus.
#[derive(Default)]
pub struct InMemoryEventBus {
    subscriptions: RwLock<Vec<(String, EventHandler)>>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscription_count(&self) -> usize {
        rw_read(&self.subscriptions, LOCK_TARGET, "subscription_count").len()
    }
}

impl fmt::Debug for InMemoryEventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let patterns: Vec<String> = rw_read(&self.subscriptions, LOCK_TARGET, "debug")
            .iter()
            .map(|(pattern, _)| pattern.clone())
            .collect();
        f.debug_struct("InMemoryEventBus")
            .field("patterns", &patterns)
            .finish()
    }
}

impl EventBus for InMemoryEventBus {
    fn subscribe(&self, pattern: &str, handler: EventHandler) {
        rw_write(&self.subscriptions, LOCK_TARGET, "subscribe").push((pattern.to_string(), handler));
        debug!(pattern, "Subscribed event handler");
    }

    fn publish(&self, event: &DomainEvent) -> CacheResult<usize> {
        // Handlers run outside the lock so they may subscribe or publish
        let handlers: Vec<EventHandler> = rw_read(&self.subscriptions, LOCK_TARGET, "publish")
            .iter()
            .filter(|(pattern, _)| pattern_matches(pattern, &event.identifier))
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        for handler in &handlers {
            handler(event)?;
        }
        Ok(handlers.len())
    }
}
