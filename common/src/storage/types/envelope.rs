use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lateral key/value metadata inherited down the document tree (spec.md §3, GLOSSARY).
///
/// `BTreeMap` rather than `HashMap` so that serializing a `Facets` map for
/// context hashing (see `crate::utils::hasher`) is deterministic regardless
/// of insertion order.
pub type Facets = BTreeMap<String, Value>;

/// Structural context describing where a content unit lives: path, locale,
/// model, provenance, usagePath (spec.md §3/GLOSSARY).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Envelope {
    pub source_path: String,
    /// Either `fragmentPath` or `containerPath ::ref:: fragmentPath`.
    pub usage_path: String,
    pub path_hierarchy: Vec<String>,
    pub model: Option<String>,
    pub locale: Option<String>,
    pub language: Option<String>,
    pub country: Option<String>,
    pub section_name: Option<String>,
    pub provenance: BTreeMap<String, String>,
}

impl Envelope {
    /// Seed envelope for the root of a document tree.
    pub fn seed(source_uri: &str) -> Self {
        Self {
            source_path: source_uri.to_string(),
            usage_path: source_uri.to_string(),
            path_hierarchy: Vec::new(),
            ..Default::default()
        }
    }

    /// The delimiter used to join container and fragment paths into a usagePath.
    pub const REF_DELIMITER: &'static str = " ::ref:: ";

    /// Split a usagePath into (sectionPath, sectionUri) per the Consolidator (§4.9).
    ///
    /// Absent delimiter => both equal the usagePath.
    pub fn split_usage_path(usage_path: &str) -> (String, String) {
        match usage_path.split_once(Self::REF_DELIMITER) {
            Some((container, fragment)) => (container.to_string(), fragment.to_string()),
            None => (usage_path.to_string(), usage_path.to_string()),
        }
    }
}
