//! Tag-scoped store keys.
//!
//! A value stored under tag sequence `T` lives in the namespace derived from
//! `T`, so reading the same key under a different tag sequence misses. This
//! mirrors the tagged caches the engine sits on.

use sha2::{Digest, Sha256};

/// Separator byte between the namespace and the key. Never valid UTF-8.
const SEPARATOR: u8 = 0xFF;

/// Length of a namespace digest in bytes.
pub const NAMESPACE_LEN: usize = 32;

/// Namespace digest for an ordered tag sequence.
///
/// The tags are joined by `|`, which the tag grammar never produces, and
/// hashed with SHA-256. Order matters: `[a, b]` and `[b, a]` are different
/// namespaces.
pub fn tag_namespace(tags: &[String]) -> [u8; NAMESPACE_LEN] {
    let mut hasher = Sha256::new();
    for (i, tag) in tags.iter().enumerate() {
        if i > 0 {
            hasher.update(b"|");
        }
        hasher.update(tag.as_bytes());
    }
    hasher.finalize().into()
}

/// A store key scoped to the namespace of a tag sequence.
///
/// # Binary Format
///
/// - Bytes 0-31: namespace (SHA-256 of the joined tags)
/// - Byte 32: separator (0xFF)
/// - Bytes 33..: key as UTF-8
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TagScopedKey {
    inner: ScopedKeyInner,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ScopedKeyInner {
    namespace: [u8; NAMESPACE_LEN],
    key: String,
}

impl TagScopedKey {
    /// Scope `key` to the namespace of `tags`.
    pub fn new(tags: &[String], key: impl Into<String>) -> Self {
        Self {
            inner: ScopedKeyInner {
                namespace: tag_namespace(tags),
                key: key.into(),
            },
        }
    }

    /// Namespace as lowercase hex, for logs.
    pub fn namespace_hex(&self) -> String {
        hex::encode(self.inner.namespace)
    }

    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// Encode for storage.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(NAMESPACE_LEN + 1 + self.inner.key.len());
        bytes.extend_from_slice(&self.inner.namespace);
        bytes.push(SEPARATOR);
        bytes.extend_from_slice(self.inner.key.as_bytes());
        bytes
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn tag_list() -> impl Strategy<Value = Vec<String>> {
        proptest::collection::vec("TagCache:[a-z]{1,8}(-[A-Z][a-z]{0,6})?", 0..4)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Property: the key bytes follow the namespace and separator unchanged.
        #[test]
        fn prop_encoded_key_suffix(tags in tag_list(), key in "\\PC{0,32}") {
            let scoped = TagScopedKey::new(&tags, key.clone());
            let encoded = scoped.encode();
            prop_assert_eq!(encoded[NAMESPACE_LEN], SEPARATOR);
            prop_assert_eq!(&encoded[NAMESPACE_LEN + 1..], key.as_bytes());
        }

        /// Property: different tag sequences give different encoded keys.
        #[test]
        fn prop_tag_sequences_isolate(a in tag_list(), b in tag_list(), key in "[a-z]{1,8}") {
            prop_assume!(a != b);
            let left = TagScopedKey::new(&a, key.clone());
            let right = TagScopedKey::new(&b, key);
            prop_assert_ne!(left.encode(), right.encode());
        }
    }
}
