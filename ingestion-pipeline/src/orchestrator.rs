//! Ingestion Orchestrator (C6): ties the Cleanser, Hasher, Extractor, Dedup
//! Store, and Raw/Cleansed Repo together per input (spec.md §4.4).

use std::sync::Arc;

use common::error::AppError;
use common::storage::db::SurrealDbClient;
use common::storage::types::cleansed_batch::{CleansedBatch, CleansedBatchStatus, Item};
use common::storage::types::content_hash::ContentHashRow;
use common::storage::types::envelope::Envelope;
use common::storage::types::job_tracker::JobTracker;
use common::storage::types::queue_message::{QueueMessage, QueuedItem};
use common::storage::types::raw_source::{RawSource, RawSourceStatus};
use common::utils::hasher;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::extractor::{self, ExtractionError};

/// Outcome of one `ingest` call: either a fresh/updated CleansedBatch, or a
/// terminal status reached before any enrichment could be scheduled.
pub enum IngestOutcome {
    Cleansed(CleansedBatch),
    Terminal { status: RawSourceStatus, cleansed_batch: Option<CleansedBatch> },
}

pub struct IngestionOrchestrator {
    db: Arc<SurrealDbClient>,
}

impl IngestionOrchestrator {
    pub fn new(db: Arc<SurrealDbClient>) -> Self {
        Self { db }
    }

    /// Ingest a payload for `source_uri` (spec.md §4.4 steps 1-6).
    pub async fn ingest(&self, source_uri: &str, payload_bytes: &[u8]) -> Result<IngestOutcome, AppError> {
        if payload_bytes.is_empty() {
            let raw = RawSource::insert_new_version(
                &self.db,
                source_uri,
                None,
                None,
                None,
                RawSourceStatus::EmptyContentLoaded,
            )
            .await?;
            return Ok(IngestOutcome::Terminal { status: raw.status, cleansed_batch: None });
        }

        let content_text = String::from_utf8_lossy(payload_bytes).into_owned();
        let payload_hash = hasher::hash_content(&content_text, None);

        let previous = RawSource::find_latest(&self.db, source_uri).await?;
        if let (Some(previous), Some(payload_hash)) = (previous.as_ref(), payload_hash.as_deref()) {
            if previous.content_hash.as_deref() == Some(payload_hash) {
                info!(%source_uri, "payload hash unchanged, reusing raw source");
                let existing_batch = CleansedBatch::find_by_raw_source(&self.db, &previous.id).await?;
                return match existing_batch {
                    Some(batch) => Ok(IngestOutcome::Terminal { status: RawSourceStatus::Loaded, cleansed_batch: Some(batch) }),
                    None => self.process_raw_source(previous, &content_text).await,
                };
            }
        }

        let raw = RawSource::insert_new_version(
            &self.db,
            source_uri,
            Some(content_text.clone()),
            None,
            payload_hash,
            RawSourceStatus::Loaded,
        )
        .await?;

        self.process_raw_source(&raw, &content_text).await
    }

    /// Parse, extract, dedup, and persist a CleansedBatch for one RawSource
    /// (spec.md §4.4 steps 3-6).
    async fn process_raw_source(&self, raw: &RawSource, content_text: &str) -> Result<IngestOutcome, AppError> {
        let root: Value = match serde_json::from_str(content_text) {
            Ok(value) => value,
            Err(err) => {
                warn!(source_uri = %raw.source_uri, error = %err, "payload failed JSON parse");
                return Ok(IngestOutcome::Terminal { status: RawSourceStatus::JsonParseError, cleansed_batch: None });
            }
        };

        let seed = Envelope::seed(&raw.source_uri);
        let extracted = match extractor::extract(&root, seed) {
            Ok(items) => items,
            Err(ExtractionError::RootNotAnObject) => {
                warn!(source_uri = %raw.source_uri, "extraction failed: root payload is not an object");
                return Ok(IngestOutcome::Terminal { status: RawSourceStatus::ExtractionFailed, cleansed_batch: None });
            }
        };

        let kept_items = self.apply_dedup(&extracted).await?;

        if kept_items.is_empty() {
            info!(source_uri = %raw.source_uri, "no items changed since last ingestion");
            let previous_batch = CleansedBatch::find_latest_for_source(&self.db, &raw.source_uri).await?;
            let batch = CleansedBatch::new(
                raw.id.clone(),
                raw.source_uri.clone(),
                raw.version,
                Vec::new(),
                CleansedBatchStatus::ProcessedNoChanges,
            );
            self.db.store_item(batch).await?;
            return Ok(IngestOutcome::Terminal {
                status: RawSourceStatus::Loaded,
                cleansed_batch: previous_batch,
            });
        }

        let batch = CleansedBatch::new(
            raw.id.clone(),
            raw.source_uri.clone(),
            raw.version,
            kept_items,
            CleansedBatchStatus::CleansedPendingEnrichment,
        );
        let stored = self.db.store_item(batch.clone()).await?;
        Ok(IngestOutcome::Cleansed(stored.unwrap_or(batch)))
    }

    /// Consult the Dedup Store for each extracted item, keeping only those
    /// whose hashes changed, and upsert the dedup row for every kept item
    /// (spec.md §4.4 step 4).
    async fn apply_dedup(&self, items: &[Item]) -> Result<Vec<Item>, AppError> {
        let mut kept = Vec::with_capacity(items.len());
        for item in items {
            let existing = ContentHashRow::find(
                &self.db,
                &item.source_path,
                &item.item_type,
                &item.envelope.usage_path,
            )
            .await?;

            if ContentHashRow::is_changed(existing.as_ref(), &item.content_hash, item.context_hash.as_deref()) {
                ContentHashRow::upsert(
                    &self.db,
                    &item.source_path,
                    &item.item_type,
                    &item.envelope.usage_path,
                    &item.content_hash,
                    item.context_hash.as_deref(),
                )
                .await?;
                kept.push(item.clone());
            }
        }
        Ok(kept)
    }
}

/// Transition a `CleansedBatch` from `CleansedPendingEnrichment` to
/// `EnrichmentInProgress`, publishing one `QueueMessage` per non-empty item
/// and creating the job's `JobTracker` (spec.md §4.7 "Producer publishes...").
pub async fn schedule_enrichment(db: &SurrealDbClient, batch: &CleansedBatch) -> Result<JobTracker, AppError> {
    let non_empty_items: Vec<&Item> =
        batch.items.iter().filter(|item| !item.cleansed_content.is_empty()).collect();

    #[allow(clippy::cast_possible_truncation)]
    let total_items = non_empty_items.len() as u32;
    let tracker = JobTracker::create_and_store(db, batch.id.clone(), total_items).await?;

    for item in non_empty_items {
        let message = QueueMessage {
            job_id: tracker.id.clone(),
            cleansed_data_store_id: batch.id.clone(),
            source_path: item.source_path.clone(),
            original_field_name: item.original_field_name.clone(),
            cleansed_content: item.cleansed_content.clone(),
            model: item.model.clone(),
            context: json!({
                "envelope": item.envelope,
                "facets": item.facets,
                "itemType": item.item_type,
            }),
            total_items,
        };
        QueuedItem::publish(db, message).await?;
    }

    db.query("UPDATE type::thing('cleansed_data_store', $id) SET status = $status")
        .bind(("id", batch.id.clone()))
        .bind(("status", CleansedBatchStatus::EnrichmentInProgress))
        .await?;

    Ok(tracker)
}
