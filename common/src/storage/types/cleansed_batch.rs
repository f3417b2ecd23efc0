use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

use super::envelope::{Envelope, Facets};

/// One content unit extracted from a document tree (spec.md §3 "Item").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Item {
    pub source_path: String,
    pub item_type: String,
    pub original_field_name: String,
    pub cleansed_content: String,
    pub model: Option<String>,
    pub content_hash: String,
    pub context_hash: Option<String>,
    pub envelope: Envelope,
    pub facets: Facets,
}

/// Lifecycle status of a `CleansedBatch`. Covers the pre-enrichment states
/// (§4.4), the in-flight states (§4.7), and the final states computed from
/// enrichment counters (§4.12).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum CleansedBatchStatus {
    ExtractionFailed,
    ProcessedNoChanges,
    CleansedPendingEnrichment,
    EnrichmentInProgress,
    Finalizing,
    EnrichedNoItemsToProcess,
    EnrichedAllSkippedEmptyText,
    EnrichedComplete,
    PartiallyEnriched,
    EnrichmentFailedAllAttempted,
    EnrichmentSkippedAllRateLimit,
    EnrichmentIssuesDetected,
}

/// Per-job summary persisted into a `CleansedBatch`'s diagnostics once
/// enrichment finalizes (spec.md §4.12).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobSummary {
    pub total_deserialized_items: u32,
    pub items_attempted: u32,
    pub successfully_enriched: u32,
    pub failed_enrichment_attempts: u32,
    pub skipped_by_rate_limit: u32,
    pub item_processing_error_messages: Vec<String>,
}

const MAX_ERROR_MESSAGE_LEN: usize = 255;

impl JobSummary {
    /// Append an error message, truncated to 255 chars as spec.md §7 requires.
    pub fn push_error_message(&mut self, message: &str) {
        let truncated: String = message.chars().take(MAX_ERROR_MESSAGE_LEN).collect();
        self.item_processing_error_messages.push(truncated);
    }
}

stored_object!(CleansedBatch, "cleansed_data_store", {
    raw_source_id: String,
    source_uri: String,
    version: i64,
    items: Vec<Item>,
    status: CleansedBatchStatus,
    cleansed_at: Option<DateTime<Utc>>,
    cleansing_errors: Option<String>,
    diagnostics: Option<JobSummary>
});

impl CleansedBatch {
    pub fn new(
        raw_source_id: String,
        source_uri: String,
        version: i64,
        items: Vec<Item>,
        status: CleansedBatchStatus,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            raw_source_id,
            source_uri,
            version,
            items,
            status,
            cleansed_at: Some(now),
            cleansing_errors: None,
            diagnostics: None,
        }
    }

    /// The most recent `CleansedBatch` for a `sourceUri` (any version), used
    /// by the orchestrator when re-ingestion finds no changes (spec.md §4.4
    /// step 5/E3).
    pub async fn find_latest_for_source(
        db: &SurrealDbClient,
        source_uri: &str,
    ) -> Result<Option<Self>, AppError> {
        let mut response = db
            .query(
                "SELECT * FROM cleansed_data_store WHERE source_uri = $uri \
                 ORDER BY version DESC LIMIT 1",
            )
            .bind(("uri", source_uri.to_owned()))
            .await?;
        let rows: Vec<Self> = response.take(0)?;
        Ok(rows.into_iter().next())
    }

    pub async fn find_by_raw_source(
        db: &SurrealDbClient,
        raw_source_id: &str,
    ) -> Result<Option<Self>, AppError> {
        let mut response = db
            .query("SELECT * FROM cleansed_data_store WHERE raw_source_id = $id LIMIT 1")
            .bind(("id", raw_source_id.to_owned()))
            .await?;
        let rows: Vec<Self> = response.take(0)?;
        Ok(rows.into_iter().next())
    }

    /// Count of items whose cleansed content is non-empty (the Cleanser
    /// already dropped empty ones before they reach a CleansedBatch, but this
    /// stays defensive for callers constructing items directly).
    pub fn non_empty_item_count(&self) -> usize {
        self.items
            .iter()
            .filter(|item| !item.cleansed_content.is_empty())
            .count()
    }

    pub async fn get_by_id(db: &SurrealDbClient, id: &str) -> Result<Option<Self>, AppError> {
        db.get_item(id).await.map_err(AppError::from)
    }

    /// Settle the final status and diagnostics computed at job finalization
    /// (spec.md §4.12), persisting both in one update.
    pub async fn finalize(
        &self,
        db: &SurrealDbClient,
        status: CleansedBatchStatus,
        diagnostics: JobSummary,
    ) -> Result<(), AppError> {
        db.query(
            "UPDATE type::thing('cleansed_data_store', $id) SET status = $status, diagnostics = $diagnostics",
        )
        .bind(("id", self.id.clone()))
        .bind(("status", status))
        .bind(("diagnostics", diagnostics))
        .await?;
        Ok(())
    }
}
