//! Consolidator (C13): enriched → section merge, splitting the composite
//! usage path into container/fragment (spec.md §4.9).

use common::error::AppError;
use common::storage::db::SurrealDbClient;
use common::storage::types::consolidated_section::ConsolidatedSection;
use common::storage::types::content_hash::ContentHashRow;
use common::storage::types::enriched_element::EnrichedElement;
use common::storage::types::envelope::Envelope;
use common::utils::config::AppConfig;

/// Consolidate every `EnrichedElement` of a (cleansedDataId, version) pair
/// into `ConsolidatedSection` rows.
pub async fn consolidate(
    db: &SurrealDbClient,
    config: &AppConfig,
    source_uri: &str,
    cleansed_data_id: &str,
    version: i64,
) -> Result<Vec<ConsolidatedSection>, AppError> {
    let elements = EnrichedElement::for_cleansed_batch(db, cleansed_data_id, version).await?;
    let mut sections = Vec::new();

    for element in elements {
        if !element.status.is_success() {
            continue;
        }

        let usage_path = element
            .context
            .get("envelope")
            .and_then(|envelope| envelope.get("usagePath"))
            .and_then(serde_json::Value::as_str)
            .unwrap_or(&element.item_source_path);

        let (section_path, section_uri) = Envelope::split_usage_path(usage_path);

        if config.deduplicate_consolidated
            && ConsolidatedSection::exists(
                db,
                &section_uri,
                &section_path,
                &element.item_original_field_name,
                &element.cleansed_text,
                version,
            )
            .await?
        {
            continue;
        }

        let item_type = element
            .context
            .get("itemType")
            .and_then(serde_json::Value::as_str)
            .unwrap_or(&element.item_original_field_name);
        let content_hash = ContentHashRow::find(db, &element.item_source_path, item_type, usage_path)
            .await?
            .map(|row| row.content_hash);

        let section = ConsolidatedSection::new(
            source_uri.to_string(),
            version,
            section_path,
            section_uri,
            element.item_original_field_name,
            element.cleansed_text,
            content_hash,
            element.summary,
            element.keywords,
            element.tags,
            element.sentiment,
            element.classification,
            element.context,
        );
        let stored = db.store_item(section.clone()).await?;
        sections.push(stored.unwrap_or(section));
    }

    Ok(sections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::types::enriched_element::EnrichmentStatus;
    use uuid::Uuid;

    #[tokio::test]
    async fn consolidates_only_successful_elements_and_splits_usage_path() {
        let db = SurrealDbClient::memory("consolidator_test", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        let config = AppConfig::default();

        let success = EnrichedElement::success(
            "batch1".into(),
            1,
            "/fragments/hero".into(),
            "copy".into(),
            "hello".into(),
            "model-x".into(),
            "summary".into(),
            vec!["k".into()],
            vec!["t".into()],
            "neutral".into(),
            "c".into(),
            serde_json::json!({"envelope": {"usagePath": "/page ::ref:: /fragments/hero"}}),
        );
        db.store_item(success).await.expect("store success");

        let error = EnrichedElement::error(
            "batch1".into(),
            1,
            "/other".into(),
            "copy".into(),
            "text".into(),
            EnrichmentStatus::ErrorProviderFailure,
            "boom".into(),
            serde_json::json!({}),
        );
        db.store_item(error).await.expect("store error");

        let sections = consolidate(&db, &config, "src1", "batch1", 1).await.expect("consolidate");
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].section_path, "/page");
        assert_eq!(sections[0].section_uri, "/fragments/hero");
    }

    #[tokio::test]
    async fn dedup_skips_identical_section_on_second_run() {
        let db = SurrealDbClient::memory("consolidator_test2", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        let config = AppConfig::default();

        let success = EnrichedElement::success(
            "batch1".into(),
            1,
            "/p".into(),
            "copy".into(),
            "hello".into(),
            "model-x".into(),
            "summary".into(),
            vec![],
            vec![],
            "neutral".into(),
            "c".into(),
            serde_json::json!({"envelope": {"usagePath": "/p"}}),
        );
        db.store_item(success).await.expect("store");

        let first = consolidate(&db, &config, "src1", "batch1", 1).await.expect("first");
        assert_eq!(first.len(), 1);
        let second = consolidate(&db, &config, "src1", "batch1", 1).await.expect("second");
        assert_eq!(second.len(), 0);
    }
}
