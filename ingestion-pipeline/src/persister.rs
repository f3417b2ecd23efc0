//! Enrichment Persister (C11): validate, write an enriched element, write
//! error rows (spec.md §4.8).

use common::error::AppError;
use common::storage::db::SurrealDbClient;
use common::storage::types::enriched_element::{EnrichedElement, EnrichmentStatus};
use serde_json::Value;

use crate::ai_client::StandardEnrichments;

/// Persist a successful enrichment (spec.md §4.8 "both fields from §3").
#[allow(clippy::too_many_arguments)]
pub async fn persist_success(
    db: &SurrealDbClient,
    cleansed_data_id: &str,
    version: i64,
    item_source_path: &str,
    item_original_field_name: &str,
    cleansed_text: &str,
    model_used: &str,
    enrichment: StandardEnrichments,
    context: Value,
) -> Result<EnrichedElement, AppError> {
    let element = EnrichedElement::success(
        cleansed_data_id.to_string(),
        version,
        item_source_path.to_string(),
        item_original_field_name.to_string(),
        cleansed_text.to_string(),
        model_used.to_string(),
        enrichment.summary,
        enrichment.keywords,
        enrichment.tags,
        enrichment.sentiment,
        enrichment.classification,
        context,
    );
    let stored = db.store_item(element.clone()).await?;
    Ok(stored.unwrap_or(element))
}

/// Persist an error row. `status` must be one of the `Error*` variants; the
/// error message is encoded into `enrichmentMetadata.enrichmentError`
/// (spec.md §4.8 "Error path").
#[allow(clippy::too_many_arguments)]
pub async fn persist_error(
    db: &SurrealDbClient,
    cleansed_data_id: &str,
    version: i64,
    item_source_path: &str,
    item_original_field_name: &str,
    cleansed_text: &str,
    status: EnrichmentStatus,
    error_message: &str,
    context: Value,
) -> Result<EnrichedElement, AppError> {
    let element = EnrichedElement::error(
        cleansed_data_id.to_string(),
        version,
        item_source_path.to_string(),
        item_original_field_name.to_string(),
        cleansed_text.to_string(),
        status,
        error_message.to_string(),
        context,
    );
    let stored = db.store_item(element.clone()).await?;
    Ok(stored.unwrap_or(element))
}

/// The enrichment result classified from an `AppError` raised by the AI
/// Client (spec.md §7). `Throttled` is handled separately by the worker and
/// never reaches this mapping.
pub fn status_for_error(error: &AppError) -> EnrichmentStatus {
    match error {
        AppError::ValidationFailed(_) => EnrichmentStatus::ErrorValidationFailed,
        AppError::Provider(_) => EnrichmentStatus::ErrorProviderFailure,
        _ => EnrichmentStatus::ErrorUnexpected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn persists_success_with_all_fields() {
        let db = SurrealDbClient::memory("persister_test", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");

        let enrichment = StandardEnrichments {
            summary: "a summary".into(),
            keywords: vec!["k".into()],
            sentiment: "neutral".into(),
            classification: "c".into(),
            tags: vec!["t".into()],
        };

        let element = persist_success(
            &db,
            "batch1",
            1,
            "/p",
            "copy",
            "hello",
            "model-x",
            enrichment,
            serde_json::json!({}),
        )
        .await
        .expect("persist");

        assert_eq!(element.status, EnrichmentStatus::Enriched);
        assert_eq!(element.summary.as_deref(), Some("a summary"));
        assert_eq!(
            element.enrichment_metadata.get("enrichedWithModel").and_then(Value::as_str),
            Some("model-x")
        );
    }

    #[tokio::test]
    async fn persists_error_with_message_in_metadata() {
        let db = SurrealDbClient::memory("persister_test2", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");

        let element = persist_error(
            &db,
            "batch1",
            1,
            "/p",
            "copy",
            "hello",
            EnrichmentStatus::ErrorProviderFailure,
            "boom",
            serde_json::json!({}),
        )
        .await
        .expect("persist");

        assert_eq!(element.status, EnrichmentStatus::ErrorProviderFailure);
        assert_eq!(
            element.enrichment_metadata.get("enrichmentError").and_then(Value::as_str),
            Some("boom")
        );
    }

    #[test]
    fn maps_error_kinds_to_statuses() {
        assert_eq!(
            status_for_error(&AppError::ValidationFailed("x".into())),
            EnrichmentStatus::ErrorValidationFailed
        );
        assert_eq!(
            status_for_error(&AppError::Provider("x".into())),
            EnrichmentStatus::ErrorProviderFailure
        );
        assert_eq!(
            status_for_error(&AppError::InternalError("x".into())),
            EnrichmentStatus::ErrorUnexpected
        );
    }
}
