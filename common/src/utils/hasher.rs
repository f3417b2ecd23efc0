use sha2::{Digest, Sha256};

/// SHA-256 over the UTF-8 bytes of `content`, optionally extended with the
/// UTF-8 bytes of a stable serialization of `context` (spec.md §4.3).
///
/// Returns `None` when `content` is empty — nil/empty content yields no hash.
pub fn hash_content(content: &str, context: Option<&str>) -> Option<String> {
    if content.is_empty() {
        return None;
    }

    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    if let Some(context) = context {
        hasher.update(context.as_bytes());
    }
    Some(format!("{:x}", hasher.finalize()))
}

/// Stable serialization of a facets map for context hashing: `BTreeMap`'s
/// deterministic key order means `serde_json::to_string` is already stable,
/// so this is a thin, documented wrapper rather than a hand-rolled canonicalizer.
pub fn stable_context_string(facets: &std::collections::BTreeMap<String, serde_json::Value>) -> String {
    serde_json::to_string(facets).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_content_has_no_hash() {
        assert_eq!(hash_content("", None), None);
    }

    #[test]
    fn hash_is_stable() {
        let a = hash_content("hello world", None);
        let b = hash_content("hello world", None);
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_content_hashes_differ() {
        let a = hash_content("hello", None);
        let b = hash_content("world", None);
        assert_ne!(a, b);
    }

    #[test]
    fn context_changes_the_hash() {
        let without = hash_content("hello", None);
        let with = hash_content("hello", Some("ctx"));
        assert_ne!(without, with);
    }

    #[test]
    fn stable_context_string_is_order_independent_of_insertion() {
        let mut a = std::collections::BTreeMap::new();
        a.insert("b".to_string(), serde_json::json!(1));
        a.insert("a".to_string(), serde_json::json!(2));

        let mut b = std::collections::BTreeMap::new();
        b.insert("a".to_string(), serde_json::json!(2));
        b.insert("b".to_string(), serde_json::json!(1));

        assert_eq!(stable_context_string(&a), stable_context_string(&b));
    }
}
