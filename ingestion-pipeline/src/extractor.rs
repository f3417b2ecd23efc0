//! Recursive document-tree walk producing content `Item`s with an inherited
//! envelope and facet map (spec.md §4.1).

use common::storage::types::envelope::{Envelope, Facets};
use common::storage::types::cleansed_batch::Item;
use serde_json::Value;

use crate::cleanser;

/// Fixed keyword table for event tagging, preserved verbatim per spec.md §9(b)
/// (first match wins against the lowercased cleansed content).
const EVENT_KEYWORDS: &[(&str, &str)] = &[
    ("valentine", "Valentine day"),
    ("father's day", "Father's day"),
    ("tax", "Tax"),
    ("christmas", "Christmas"),
    ("mother", "Mother's day"),
];

/// Field names recognized as content-bearing (spec.md §4.1).
const CONTENT_FIELDS: &[&str] = &["copy", "disclaimers", "disclaimer", "analytics"];

/// Error raised when the root payload cannot be walked at all (spec.md §4.1
/// "Failure semantics" — distinct from per-item skips, which are silent).
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("root payload is not a JSON object")]
    RootNotAnObject,
}

/// Walk `root` starting from `seed` and return items in tree traversal order.
pub fn extract(root: &Value, seed: Envelope) -> Result<Vec<Item>, ExtractionError> {
    if !root.is_object() {
        return Err(ExtractionError::RootNotAnObject);
    }
    let mut items = Vec::new();
    walk_object(root, &seed, &Facets::new(), None, &mut items);
    Ok(items)
}

/// Overlay `_path`/`_model`/`_usagePath`/`_provenance` from `node` onto `parent`,
/// producing the envelope in effect for this node and its children.
fn overlay_envelope(node: &Value, parent: &Envelope) -> Envelope {
    let mut envelope = parent.clone();

    if let Some(path) = node.get("_path").and_then(Value::as_str) {
        envelope.source_path = path.to_string();
        envelope.usage_path = path.to_string();
        envelope.path_hierarchy = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect();
        if let Some((locale, language, country)) = derive_locale(path) {
            envelope.locale = Some(locale);
            envelope.language = Some(language);
            envelope.country = Some(country);
        }
        envelope.section_name = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .next_back()
            .map(str::to_string);
    }

    if let Some(model) = node.get("_model").and_then(Value::as_str) {
        envelope.model = Some(model.to_string());
    }

    if let Some(usage_path) = node.get("_usagePath").and_then(Value::as_str) {
        envelope.usage_path = usage_path.to_string();
    }

    if let Some(provenance) = node.get("_provenance") {
        if let Some(map) = provenance.as_object() {
            envelope.provenance = map
                .iter()
                .filter_map(|(key, value)| value.as_str().map(|value| (key.clone(), value.to_string())))
                .collect();
        }
        // Non-object `_provenance` is carried over unchanged from the parent
        // (spec.md §4.1: "carried over from the parent with a warning").
    }

    envelope
}

/// Derive `(locale, language, country)` from a path segment matching
/// `xx-XX`/`xx_XX` surrounded by `/` or end-of-string.
///
/// Rust's `regex` crate has no lookaround, so the spec's
/// `(?<=/)([a-z]{2})[-_]([A-Z]{2})(?=/|$)` is reproduced by scanning each
/// `/`-delimited path segment for a full-segment match instead.
fn derive_locale(path: &str) -> Option<(String, String, String)> {
    for segment in path.split('/') {
        if let Some((language, country)) = locale_segment(segment) {
            let locale = format!("{language}_{country}");
            return Some((locale, language.to_string(), country.to_string()));
        }
    }
    None
}

fn locale_segment(segment: &str) -> Option<(&str, &str)> {
    let bytes = segment.as_bytes();
    if bytes.len() != 5 {
        return None;
    }
    let language = &segment[0..2];
    let separator = bytes[2];
    let country = &segment[3..5];
    let is_lower_alpha = |s: &str| s.chars().all(|c| c.is_ascii_lowercase());
    let is_upper_alpha = |s: &str| s.chars().all(|c| c.is_ascii_uppercase());
    if (separator == b'-' || separator == b'_') && is_lower_alpha(language) && is_upper_alpha(country) {
        Some((language, country))
    } else {
        None
    }
}

/// Shallow-copy `parent` and add every scalar field on `node` whose name does
/// not start with `_` (spec.md §4.1 "currentFacets").
fn overlay_facets(node: &Value, parent: &Facets) -> Facets {
    let mut facets = parent.clone();
    if let Some(map) = node.as_object() {
        for (key, value) in map {
            if key.starts_with('_') {
                continue;
            }
            if is_scalar(value) {
                facets.insert(key.clone(), value.clone());
            }
        }
    }
    facets
}

fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_) | Value::Null)
}

/// Section detection: when `envelope.model` ends with `-section`, add
/// `sectionModel`, `sectionPath`, and the last path segment as `sectionKey`.
fn apply_section_detection(envelope: &Envelope, facets: &mut Facets) {
    let Some(model) = envelope.model.as_deref() else {
        return;
    };
    if !model.ends_with("-section") {
        return;
    }
    facets.insert("sectionModel".to_string(), Value::String(model.to_string()));
    facets.insert("sectionPath".to_string(), Value::String(envelope.source_path.clone()));
    if let Some(key) = envelope
        .source_path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .next_back()
    {
        facets.insert("sectionKey".to_string(), Value::String(key.to_string()));
    }
}

/// usagePath assembly (spec.md §4.1): when the parent's envelope records a
/// different sourcePath than this node's own (post-overlay) sourcePath, the
/// emitted usagePath records container and fragment together.
fn compute_usage_path(parent: &Envelope, current: &Envelope) -> String {
    if parent.source_path != current.source_path && !parent.source_path.is_empty() {
        format!("{}{}{}", parent.source_path, Envelope::REF_DELIMITER, current.source_path)
    } else {
        current.usage_path.clone()
    }
}

fn apply_event_tagging(cleansed_content: &str, facets: &mut Facets) {
    let lowered = cleansed_content.to_lowercase();
    for (keyword, label) in EVENT_KEYWORDS {
        if lowered.contains(keyword) {
            facets.insert("eventType".to_string(), Value::String((*label).to_string()));
            break;
        }
    }
}

/// Build and push one `Item`, snapshotting `envelope` and `facets` at this
/// emit point (spec.md §9 "Tree walk with inherited state").
#[allow(clippy::too_many_arguments)]
fn emit_item(
    parent_envelope: &Envelope,
    node_envelope: &Envelope,
    item_type: &str,
    original_field_name: &str,
    raw_content: &str,
    facets: &Facets,
    items: &mut Vec<Item>,
) {
    let cleansed_content = cleanser::cleanse(raw_content);
    if cleansed_content.is_empty() {
        return;
    }

    let mut item_facets = facets.clone();
    apply_event_tagging(&cleansed_content, &mut item_facets);

    let mut envelope = node_envelope.clone();
    envelope.usage_path = compute_usage_path(parent_envelope, node_envelope);

    let content_hash = common::utils::hasher::hash_content(&cleansed_content, None);
    let context_string = common::utils::hasher::stable_context_string(&item_facets);
    let context_hash = common::utils::hasher::hash_content(&context_string, None);

    items.push(Item {
        source_path: envelope.source_path.clone(),
        item_type: item_type.to_string(),
        original_field_name: original_field_name.to_string(),
        cleansed_content,
        model: envelope.model.clone(),
        content_hash: content_hash.unwrap_or_default(),
        context_hash,
        envelope,
        facets: item_facets,
    });
}

/// Walk one object node. `arriving_field_name` is the field name that pointed
/// to this node from its parent (used for "copy" inheriting the parent field
/// name), `None` at the tree root.
fn walk_object(
    node: &Value,
    parent_envelope: &Envelope,
    parent_facets: &Facets,
    arriving_field_name: Option<&str>,
    items: &mut Vec<Item>,
) {
    let Some(map) = node.as_object() else {
        return;
    };

    let mut envelope = overlay_envelope(node, parent_envelope);
    let mut facets = overlay_facets(node, parent_facets);
    apply_section_detection(&envelope, &mut facets);

    // disclaimers: {items: [{copy: ...}, ...]} — special-cased so each leaf
    // `copy` emits once as itemType "disclaimer" without the generic object
    // recursion below also walking into the consumed `items` array.
    if let Some(disclaimers) = map.get("disclaimers") {
        if let Some(entries) = disclaimers.get("items").and_then(Value::as_array) {
            for entry in entries {
                if let Some(copy) = entry.get("copy").and_then(Value::as_str) {
                    emit_item(parent_envelope, &envelope, "disclaimer", "copy", copy, &facets, items);
                }
            }
        }
    }

    // analytics: {name, value} — special-cased scalar pair.
    if let Some(analytics) = map.get("analytics") {
        if let (Some(name), Some(value)) = (
            analytics.get("name").and_then(Value::as_str),
            analytics.get("value"),
        ) {
            if let Some(value) = value.as_str() {
                let mut analytics_facets = facets.clone();
                analytics_facets.insert("analyticsName".to_string(), Value::String(name.to_string()));
                emit_item(parent_envelope, &envelope, "analytics", "analytics", value, &analytics_facets, items);
            }
        }
    }

    for field_name in CONTENT_FIELDS {
        if *field_name == "disclaimers" || *field_name == "analytics" {
            continue;
        }
        let Some(value) = map.get(*field_name) else {
            continue;
        };

        if let Some(text) = value.as_str() {
            let item_type = if *field_name == "copy" {
                arriving_field_name.unwrap_or("copy")
            } else {
                field_name
            };
            emit_item(parent_envelope, &envelope, item_type, field_name, text, &facets, items);
        } else if let Some(copy) = value.get("copy").and_then(Value::as_str) {
            emit_item(parent_envelope, &envelope, field_name, "copy", copy, &facets, items);
        }
    }

    // Container nodes are always recursed into, regardless of emission above,
    // so nested content under any field is never lost.
    for (field_name, value) in map {
        if field_name.starts_with('_') || field_name == "disclaimers" || field_name == "analytics" {
            continue;
        }
        walk_value(value, &envelope, &facets, field_name, items);
    }
}

fn walk_value(value: &Value, envelope: &Envelope, facets: &Facets, field_name: &str, items: &mut Vec<Item>) {
    match value {
        Value::Object(_) => walk_object(value, envelope, facets, Some(field_name), items),
        Value::Array(entries) => {
            for (index, entry) in entries.iter().enumerate() {
                let mut element_facets = facets.clone();
                element_facets.insert("sectionIndex".to_string(), Value::from(index));
                walk_value(entry, envelope, &element_facets, field_name, items);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seed() -> Envelope {
        Envelope::seed("api-payload-1")
    }

    #[test]
    fn e1_hero_section_nested_copy() {
        let payload = json!({
            "content": {
                "sections": [
                    {"_model": "hero-section", "_path": "/en_US/hero", "copy": "Hello {%nbsp%}world"}
                ]
            }
        });

        let items = extract(&payload, seed()).expect("extract");
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.cleansed_content, "Hello world");
        assert_eq!(item.envelope.locale.as_deref(), Some("en_US"));
        assert_eq!(item.envelope.language.as_deref(), Some("en"));
        assert_eq!(item.envelope.country.as_deref(), Some("US"));
        assert_eq!(item.envelope.section_name.as_deref(), Some("hero"));
        assert_eq!(item.facets.get("sectionModel").and_then(Value::as_str), Some("hero-section"));
        assert_eq!(item.facets.get("sectionPath").and_then(Value::as_str), Some("/en_US/hero"));
        assert_eq!(item.facets.get("sectionKey").and_then(Value::as_str), Some("hero"));
    }

    #[test]
    fn e2_disclaimers_pattern_preserves_order() {
        let payload = json!({
            "disclaimers": {"items": [{"copy": "A"}, {"copy": "B"}]}
        });

        let items = extract(&payload, seed()).expect("extract");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].item_type, "disclaimer");
        assert_eq!(items[0].cleansed_content, "A");
        assert_eq!(items[1].item_type, "disclaimer");
        assert_eq!(items[1].cleansed_content, "B");
    }

    #[test]
    fn e6_valentine_event_tag() {
        let payload = json!({"copy": "Happy Valentine to you"});
        let items = extract(&payload, seed()).expect("extract");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].facets.get("eventType").and_then(Value::as_str), Some("Valentine day"));
    }

    #[test]
    fn copy_inherits_parent_field_name() {
        let payload = json!({"headline": {"copy": "Welcome"}});
        let items = extract(&payload, seed()).expect("extract");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].item_type, "headline");
    }

    #[test]
    fn analytics_object_emits_with_name_facet() {
        let payload = json!({"analytics": {"name": "cta_click", "value": "buy-now"}});
        let items = extract(&payload, seed()).expect("extract");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].item_type, "analytics");
        assert_eq!(items[0].facets.get("analyticsName").and_then(Value::as_str), Some("cta_click"));
    }

    #[test]
    fn array_elements_get_section_index_facet() {
        let payload = json!({
            "sections": [
                {"copy": "first"},
                {"copy": "second"}
            ]
        });
        let items = extract(&payload, seed()).expect("extract");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].facets.get("sectionIndex").and_then(Value::as_i64), Some(0));
        assert_eq!(items[1].facets.get("sectionIndex").and_then(Value::as_i64), Some(1));
    }

    #[test]
    fn usage_path_records_container_and_fragment_when_paths_differ() {
        let payload = json!({
            "_path": "/en_US/page",
            "sections": [
                {"_path": "/fragments/hero", "copy": "Reused hero"}
            ]
        });
        let items = extract(&payload, seed()).expect("extract");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].envelope.usage_path, "/en_US/page ::ref:: /fragments/hero");
    }

    #[test]
    fn empty_cleansed_content_is_skipped() {
        let payload = json!({"copy": "   {% nbsp %}   "});
        let items = extract(&payload, seed()).expect("extract");
        assert!(items.is_empty());
    }

    #[test]
    fn non_object_root_is_an_extraction_error() {
        let payload = json!("just a string");
        let err = extract(&payload, seed()).expect_err("should error");
        assert!(matches!(err, ExtractionError::RootNotAnObject));
    }

    #[test]
    fn container_nodes_recurse_even_without_emitting() {
        let payload = json!({
            "wrapper": {
                "nested": {"copy": "deep content"}
            }
        });
        let items = extract(&payload, seed()).expect("extract");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].cleansed_content, "deep content");
    }
}
