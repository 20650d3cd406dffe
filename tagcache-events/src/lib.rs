//! TagCache Events - Lifecycle Event Routing
//!
//! This crate connects domain lifecycle events to cache invalidation.
//!
//! # Flow
//!
//! ```text
//! "updated: Order" + [Order#5 {customer_id: 42}]
//!        │
//!        ▼
//!   EventRouter ── updated-Order, updated-Order(5),
//!        │         attached-Order(5)-customer(42)
//!        ▼
//!   ManagedCache::flush_conditions
//! ```
//!
//! # Key Types
//!
//! - `DomainEvent`: identifier plus one or more records
//! - `EventBus`: subscription seam, with `InMemoryEventBus` for in-process use
//! - `EventRouter`: derives the condition set for an event and flushes it
//! - `infer_related_entities`: the `<name>_id` foreign-key heuristic

mod bus;
mod foreign_keys;
mod router;

pub use bus::{
    identifier, pattern_matches, DomainEvent, EventBus, EventBusExt, EventHandler, EventPayload,
    InMemoryEventBus,
};
pub use foreign_keys::infer_related_entities;
pub use router::EventRouter;

// Re-export core types for convenience
pub use tagcache_core::{DynamicRecord, LifecycleEvent, Record, RecordId};
