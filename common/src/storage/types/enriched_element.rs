use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

/// Outcome of one AI enrichment attempt for one item (spec.md §3/§4.8).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum EnrichmentStatus {
    Enriched,
    ErrorValidationFailed,
    ErrorProviderFailure,
    ErrorUnexpected,
}

impl EnrichmentStatus {
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Enriched)
    }
}

stored_object!(EnrichedElement, "enriched_content_elements", {
    cleansed_data_id: String,
    version: i64,
    item_source_path: String,
    item_original_field_name: String,
    cleansed_text: String,
    enriched_at: DateTime<Utc>,
    summary: Option<String>,
    keywords: Vec<String>,
    tags: Vec<String>,
    sentiment: Option<String>,
    classification: Option<String>,
    model_used: Option<String>,
    enrichment_metadata: Value,
    status: EnrichmentStatus,
    context: Value
});

impl EnrichedElement {
    #[allow(clippy::too_many_arguments)]
    pub fn success(
        cleansed_data_id: String,
        version: i64,
        item_source_path: String,
        item_original_field_name: String,
        cleansed_text: String,
        model_used: String,
        summary: String,
        keywords: Vec<String>,
        tags: Vec<String>,
        sentiment: String,
        classification: String,
        context: Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            cleansed_data_id,
            version,
            item_source_path,
            item_original_field_name,
            cleansed_text,
            enriched_at: now,
            summary: Some(summary),
            keywords,
            tags,
            sentiment: Some(sentiment),
            classification: Some(classification),
            enrichment_metadata: serde_json::json!({
                "enrichedWithModel": model_used,
                "enrichmentTimestamp": now,
            }),
            model_used: Some(model_used),
            status: EnrichmentStatus::Enriched,
            context,
        }
    }

    pub fn error(
        cleansed_data_id: String,
        version: i64,
        item_source_path: String,
        item_original_field_name: String,
        cleansed_text: String,
        status: EnrichmentStatus,
        error_message: String,
        context: Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            cleansed_data_id,
            version,
            item_source_path,
            item_original_field_name,
            cleansed_text,
            enriched_at: now,
            summary: None,
            keywords: Vec::new(),
            tags: Vec::new(),
            sentiment: None,
            classification: None,
            model_used: None,
            enrichment_metadata: serde_json::json!({ "enrichmentError": error_message }),
            status,
            context,
        }
    }

    pub async fn for_cleansed_batch(
        db: &SurrealDbClient,
        cleansed_data_id: &str,
        version: i64,
    ) -> Result<Vec<Self>, AppError> {
        let mut response = db
            .query(
                "SELECT * FROM enriched_content_elements \
                 WHERE cleansed_data_id = $id AND version = $version \
                 ORDER BY created_at ASC",
            )
            .bind(("id", cleansed_data_id.to_owned()))
            .bind(("version", version))
            .await?;
        Ok(response.take(0)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_elements_for_job_in_creation_order() {
        let db = SurrealDbClient::memory("enriched_element_test", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");

        for i in 0..3 {
            let el = EnrichedElement::success(
                "batch1".into(),
                1,
                format!("/p{i}"),
                "copy".into(),
                "text".into(),
                "model-x".into(),
                "summary".into(),
                vec!["k".into()],
                vec!["t".into()],
                "neutral".into(),
                "classy".into(),
                serde_json::json!({}),
            );
            db.store_item(el).await.expect("store");
        }

        let rows = EnrichedElement::for_cleansed_batch(&db, "batch1", 1)
            .await
            .expect("query");
        assert_eq!(rows.len(), 3);
    }
}
