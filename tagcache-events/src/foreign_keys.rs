//! Foreign-key naming heuristic.
//!
//! An attribute named `<something>_id` is taken to reference a related
//! entity. The related name is the last `_`-separated segment before the
//! suffix, lower-cased: `customer_id` → `customer`,
//! `billing_Address_id` → `address`. This is a naming convention, nothing
//! more; no schema is consulted.

use std::collections::BTreeMap;

use serde_json::Value;
use tagcache_core::{Attributes, RecordId};
use tracing::warn;

const SUFFIX: &str = "_id";

/// Related entities referenced by `attributes`, sorted by name.
///
/// Null values are skipped silently. Values that are neither a non-negative
/// integer nor a decimal string are skipped with a warning. When two
/// attributes map to the same name after lower-casing, the one that sorts
/// last wins.
pub fn infer_related_entities(attributes: &Attributes) -> Vec<(String, RecordId)> {
    let mut related = BTreeMap::new();

    for (attribute, value) in attributes {
        let Some(name) = related_name(attribute) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        match related_id(value) {
            Some(id) => {
                related.insert(name, id);
            }
            None => warn!(
                attribute = %attribute,
                value = %value,
                "Skipping foreign key with non-integer value"
            ),
        }
    }

    related.into_iter().collect()
}

/// `customer_id` → `customer`; `None` if the name does not follow the
/// convention.
fn related_name(attribute: &str) -> Option<String> {
    let stem = attribute.strip_suffix(SUFFIX)?;
    let segment = stem.rsplit('_').next()?;
    if segment.is_empty() {
        return None;
    }
    Some(segment.to_lowercase())
}

fn related_id(value: &Value) -> Option<RecordId> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => {
            s.parse().ok()
        }
        _ => None,
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    proptest! {
        /// Property: output is sorted by name and names are unique.
        #[test]
        fn prop_output_sorted_and_unique(
            pairs in proptest::collection::btree_map("[a-zA-Z_]{0,12}(_id)?", 0u64..1000, 0..12)
        ) {
            let attributes: Attributes = pairs
                .into_iter()
                .map(|(k, v)| (k, json!(v)))
                .collect();
            let related = infer_related_entities(&attributes);
            prop_assert!(related.windows(2).all(|w| w[0].0 < w[1].0));
        }

        /// Property: every integer foreign key is found.
        #[test]
        fn prop_simple_foreign_keys_found(name in "[a-z]{1,10}", id in any::<u64>()) {
            let mut attributes = Attributes::new();
            attributes.insert(format!("{name}_id"), json!(id));
            prop_assert_eq!(infer_related_entities(&attributes), vec![(name, id)]);
        }
    }
}
