use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(ConsolidatedSection, "consolidated_enriched_sections", {
    source_uri: String,
    version: i64,
    section_path: String,
    section_uri: String,
    original_field_name: String,
    cleansed_text: String,
    content_hash: Option<String>,
    summary: Option<String>,
    keywords: Vec<String>,
    tags: Vec<String>,
    sentiment: Option<String>,
    classification: Option<String>,
    context: serde_json::Value,
    saved_at: DateTime<Utc>
});

impl ConsolidatedSection {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source_uri: String,
        version: i64,
        section_path: String,
        section_uri: String,
        original_field_name: String,
        cleansed_text: String,
        content_hash: Option<String>,
        summary: Option<String>,
        keywords: Vec<String>,
        tags: Vec<String>,
        sentiment: Option<String>,
        classification: Option<String>,
        context: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            source_uri,
            version,
            section_path,
            section_uri,
            original_field_name,
            cleansed_text,
            content_hash,
            summary,
            keywords,
            tags,
            sentiment,
            classification,
            context,
            saved_at: now,
        }
    }

    /// Existence check for the consolidator's optional dedup guard (spec.md §4.9
    /// step 3): uniqueness on (sectionUri, sectionPath, originalFieldName,
    /// cleansedText, version).
    pub async fn exists(
        db: &SurrealDbClient,
        section_uri: &str,
        section_path: &str,
        original_field_name: &str,
        cleansed_text: &str,
        version: i64,
    ) -> Result<bool, AppError> {
        let mut response = db
            .query(
                "SELECT id FROM consolidated_enriched_sections \
                 WHERE section_uri = $section_uri AND section_path = $section_path \
                   AND original_field_name = $field AND cleansed_text = $text \
                   AND version = $version LIMIT 1",
            )
            .bind(("section_uri", section_uri.to_owned()))
            .bind(("section_path", section_path.to_owned()))
            .bind(("field", original_field_name.to_owned()))
            .bind(("text", cleansed_text.to_owned()))
            .bind(("version", version))
            .await?;
        let rows: Vec<serde_json::Value> = response.take(0)?;
        Ok(!rows.is_empty())
    }
}
