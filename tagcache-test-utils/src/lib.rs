//! TagCache Test Utilities
//!
//! Shared test infrastructure for the TagCache workspace:
//! - Proptest generators for conditions and type names
//! - A store wrapper that can be switched offline
//! - Record and cache fixtures for common scenarios
//! - Assertions on `CacheError` variants

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Once;

use serde_json::Value;
use tracing::debug;

// Re-export core types for convenience
pub use tagcache_core::{
    CacheConfig, CacheError, CacheResult, Condition, ConditionSet, DynamicRecord, Expiry,
    LifecycleEvent, Record, RecordId, RecordTypes, StorageError, ValidationError, TAG_PREFIX,
};
pub use tagcache_storage::{InMemoryTaggedStore, ManagedCache, TaggedStore};

// ============================================================================
// FLAKY STORE
// ============================================================================

/// A [`TaggedStore`] wrapper whose backend can be taken offline.
///
/// While offline every operation fails with `StoreUnavailable` and the
/// inner store is not touched.
#[derive(Debug, Default)]
pub struct FlakyStore<S> {
    inner: S,
    offline: AtomicBool,
    failures: AtomicUsize,
}

impl<S: TaggedStore> FlakyStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            offline: AtomicBool::new(false),
            failures: AtomicUsize::new(0),
        }
    }

    pub fn set_offline(&self, offline: bool) {
        debug!(offline, "Switching flaky store");
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    /// Number of operations rejected while offline.
    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn check(&self, op: &str) -> CacheResult<()> {
        if self.is_offline() {
            self.failures.fetch_add(1, Ordering::SeqCst);
            return Err(CacheError::store_unavailable(format!(
                "flaky store offline during {op}"
            )));
        }
        Ok(())
    }
}

impl<S: TaggedStore> TaggedStore for FlakyStore<S> {
    fn get(&self, tags: &[String], key: &str) -> CacheResult<Option<Value>> {
        self.check("get")?;
        self.inner.get(tags, key)
    }

    fn put(&self, tags: &[String], key: &str, value: Value, expiry: Expiry) -> CacheResult<()> {
        self.check("put")?;
        self.inner.put(tags, key, value, expiry)
    }

    fn increment(&self, tags: &[String], key: &str, by: i64) -> CacheResult<i64> {
        self.check("increment")?;
        self.inner.increment(tags, key, by)
    }

    fn forget(&self, tags: &[String], key: &str) -> CacheResult<bool> {
        self.check("forget")?;
        self.inner.forget(tags, key)
    }

    fn flush(&self, tags: &[String]) -> CacheResult<u64> {
        self.check("flush")?;
        self.inner.flush(tags)
    }

    fn prefix(&self) -> &str {
        self.inner.prefix()
    }
}

// ============================================================================
// TRACING
// ============================================================================

static TRACING: Once = Once::new();

/// Install a test subscriber honouring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest generators for condition fields.

    use super::*;
    use proptest::prelude::*;

    /// Any lifecycle event.
    pub fn arb_event() -> impl Strategy<Value = LifecycleEvent> {
        prop::sample::select(LifecycleEvent::ALL.to_vec())
    }

    /// A name that satisfies the tag grammar.
    pub fn arb_type_name() -> impl Strategy<Value = String> {
        "[A-Za-z][A-Za-z0-9_.:/\\\\]{0,23}"
    }

    /// Optional identifier, absent about a third of the time.
    pub fn arb_id() -> impl Strategy<Value = Option<RecordId>> {
        prop_oneof![
            1 => Just(None),
            2 => (1u64..1_000_000).prop_map(Some),
        ]
    }

    /// A registry of one to four type names.
    pub fn arb_record_types() -> impl Strategy<Value = RecordTypes> {
        prop::collection::btree_set(arb_type_name(), 1..4).prop_map(|names| {
            let mut types = RecordTypes::new();
            for name in names {
                // Names come from arb_type_name and always validate
                let _ = types.register(name);
            }
            types
        })
    }

    /// A valid condition over a registered type, with its registry.
    pub fn arb_condition() -> impl Strategy<Value = (RecordTypes, Condition)> {
        arb_record_types().prop_flat_map(|types| {
            let names: Vec<String> = types.names().map(str::to_string).collect();
            (
                Just(types),
                arb_event(),
                prop::option::of(prop::sample::select(names)),
                arb_id(),
                prop::option::of(arb_type_name()),
                arb_id(),
            )
                .prop_filter_map(
                    "fields must nest",
                    |(types, event, entity_type, id, related, related_id)| {
                        let condition = Condition::new(
                            &types,
                            event,
                            entity_type.as_deref(),
                            entity_type.as_ref().and(id),
                            entity_type.as_ref().and(related.as_deref()),
                            entity_type.as_ref().and(related.as_ref()).and(related_id),
                        )
                        .ok()?;
                        Some((types, condition))
                    },
                )
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built records and caches for common scenarios.

    use super::*;
    use std::sync::Arc;

    /// Registry with `Order`, `Customer` and a namespaced `App\Models\Invoice`.
    pub fn record_types() -> RecordTypes {
        RecordTypes::with_types(["Order", "Customer", "App\\Models\\Invoice"])
            .expect("fixture type names are valid")
    }

    /// An `Order` referencing a customer.
    pub fn order(id: Option<RecordId>, customer_id: RecordId) -> DynamicRecord {
        DynamicRecord::new("Order", id)
            .with_attribute("customer_id", customer_id)
            .with_attribute("total", 100)
    }

    /// A `Customer` with no foreign keys.
    pub fn customer(id: RecordId) -> DynamicRecord {
        DynamicRecord::new("Customer", Some(id)).with_attribute("name", "Ada")
    }

    /// A managed cache over a fresh in-memory store.
    pub fn memory_cache() -> Arc<ManagedCache> {
        Arc::new(ManagedCache::in_memory(record_types()).expect("default config is valid"))
    }

    /// A managed cache whose store can be taken offline.
    pub fn flaky_cache() -> (Arc<FlakyStore<InMemoryTaggedStore>>, Arc<ManagedCache>) {
        let store = Arc::new(FlakyStore::new(InMemoryTaggedStore::new()));
        let cache = ManagedCache::new(store.clone(), record_types(), CacheConfig::default())
            .expect("default config is valid");
        (store, Arc::new(cache))
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions on TagCache error variants.

    use super::*;

    /// Assert that a CacheResult is a StoreUnavailable storage error.
    #[track_caller]
    pub fn assert_store_unavailable<T: std::fmt::Debug>(result: &CacheResult<T>) {
        match result {
            Err(err) if err.is_store_unavailable() => {}
            other => panic!("Expected StoreUnavailable, got: {:?}", other),
        }
    }

    /// Assert that a CacheResult is an InvalidEntityType validation error.
    #[track_caller]
    pub fn assert_invalid_entity_type<T: std::fmt::Debug>(result: &CacheResult<T>, name: &str) {
        match result {
            Err(CacheError::Validation(ValidationError::InvalidEntityType { name: n })) => {
                assert_eq!(n, name, "Wrong type name in InvalidEntityType error");
            }
            other => panic!("Expected InvalidEntityType for {name:?}, got: {:?}", other),
        }
    }

    /// Assert that a CacheResult is an InvalidIdentifier validation error.
    #[track_caller]
    pub fn assert_invalid_identifier<T: std::fmt::Debug>(result: &CacheResult<T>) {
        match result {
            Err(CacheError::Validation(ValidationError::InvalidIdentifier { .. })) => {}
            other => panic!("Expected InvalidIdentifier, got: {:?}", other),
        }
    }

    /// Assert that a CacheResult is a NotNumeric storage error.
    #[track_caller]
    pub fn assert_not_numeric<T: std::fmt::Debug>(result: &CacheResult<T>) {
        match result {
            Err(CacheError::Storage(StorageError::NotNumeric { .. })) => {}
            other => panic!("Expected NotNumeric, got: {:?}", other),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_flaky_store_toggles() {
        let store = FlakyStore::new(InMemoryTaggedStore::new());
        store.put(&[], "k", Value::from(1), Expiry::Never).unwrap();

        store.set_offline(true);
        assertions::assert_store_unavailable(&store.get(&[], "k"));
        assertions::assert_store_unavailable(&store.flush(&["t".to_string()]));
        assert_eq!(store.failures(), 2);

        store.set_offline(false);
        assert_eq!(store.get(&[], "k").unwrap(), Some(Value::from(1)));
    }

    #[test]
    fn test_fixtures() {
        let types = fixtures::record_types();
        assert!(types.contains("Order"));
        assert!(types.contains("App\\Models\\Invoice"));

        let order = fixtures::order(Some(7), 42);
        assert_eq!(order.identifier(), Some(7));
        assert_eq!(order.attributes()["customer_id"], Value::from(42));
    }

    proptest! {
        #[test]
        fn prop_generated_conditions_render(generated in generators::arb_condition()) {
            let (_, condition) = generated;
            prop_assert!(condition.render().starts_with(TAG_PREFIX));
        }
    }
}
