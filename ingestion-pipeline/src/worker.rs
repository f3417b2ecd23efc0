//! Worker Pool (C10): per-message lifecycle for the enrichment queue
//! (spec.md §4.7).

use std::sync::Arc;

use common::error::AppError;
use common::storage::db::SurrealDbClient;
use common::storage::types::cleansed_batch::{CleansedBatch, CleansedBatchStatus};
use common::storage::types::job_tracker::JobTracker;
use common::storage::types::queue_message::QueuedItem;
use common::utils::config::AppConfig;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::ai_client::AiClient;
use crate::consolidator;
use crate::persister;
use crate::progress::{ProgressEvent, ProgressNotifier};
use crate::vector_writer;

pub struct EnrichmentWorker {
    db: Arc<SurrealDbClient>,
    ai_client: Arc<AiClient>,
    progress: Arc<ProgressNotifier>,
    config: AppConfig,
}

impl EnrichmentWorker {
    pub fn new(db: Arc<SurrealDbClient>, ai_client: Arc<AiClient>, progress: Arc<ProgressNotifier>, config: AppConfig) -> Self {
        Self { db, ai_client, progress, config }
    }

    /// Claim and process the next visible message, if any. Returns `true`
    /// when a message was claimed (regardless of outcome), so the caller's
    /// loop can skip its idle backoff.
    pub async fn run_once(&self) -> Result<bool, AppError> {
        let claimed = QueuedItem::claim_next(
            &self.db,
            self.config.queue_visibility_sec,
            self.config.queue_max_receive_count,
        )
        .await?;

        let Some(queued) = claimed else {
            return Ok(false);
        };

        if let Err(err) = self.process_message(&queued).await {
            error!(message_id = %queued.id, error = %err, "failed to process enrichment message");
        }

        Ok(true)
    }

    async fn process_message(&self, queued: &QueuedItem) -> Result<(), AppError> {
        let message = &queued.message;

        let Some(batch) = CleansedBatch::get_by_id(&self.db, &message.cleansed_data_store_id).await? else {
            warn!(cleansed_data_store_id = %message.cleansed_data_store_id, "cleansed batch missing, dropping message");
            QueuedItem::delete(&self.db, &queued.id).await?;
            return Ok(());
        };

        JobTracker::mark_running(&self.db, &message.job_id).await?;

        let mut context = message.context.clone();
        if let Value::Object(map) = &mut context {
            map.insert(
                "fullContextId".to_string(),
                Value::String(format!("{}::{}", message.source_path, message.original_field_name)),
            );
            map.insert("sourcePath".to_string(), Value::String(message.source_path.clone()));
            let model_id = message.model.clone().unwrap_or_else(|| self.config.model_id.clone());
            map.insert("provenance".to_string(), json!({"modelId": model_id}));
        }

        match self.ai_client.enrich_item(&message.cleansed_content, &context).await {
            Err(AppError::Throttled) => {
                self.handle_throttled(queued).await
            }
            Err(err) => {
                let status = persister::status_for_error(&err);
                persister::persist_error(
                    &self.db,
                    &message.cleansed_data_store_id,
                    batch.version,
                    &message.source_path,
                    &message.original_field_name,
                    &message.cleansed_content,
                    status,
                    &err.to_string(),
                    context,
                )
                .await?;
                QueuedItem::delete(&self.db, &queued.id).await?;
                self.record_progress_and_maybe_finalize(&message.job_id, false, &batch).await
            }
            Ok(enrichment) => {
                let model_used = message.model.clone().unwrap_or_else(|| self.config.model_id.clone());
                persister::persist_success(
                    &self.db,
                    &message.cleansed_data_store_id,
                    batch.version,
                    &message.source_path,
                    &message.original_field_name,
                    &message.cleansed_content,
                    &model_used,
                    enrichment,
                    context,
                )
                .await?;
                QueuedItem::delete(&self.db, &queued.id).await?;
                self.record_progress_and_maybe_finalize(&message.job_id, true, &batch).await
            }
        }
    }

    /// Throttled → extend visibility by `throttleDelaySec`; do not delete the
    /// message or touch the JobTracker (spec.md §4.7 step 3). If this was the
    /// message's last allowed delivery attempt, it is permanently abandoned
    /// to rate limiting and counted via `record_rate_limited` instead.
    async fn handle_throttled(&self, queued: &QueuedItem) -> Result<(), AppError> {
        if queued.receive_count >= self.config.queue_max_receive_count {
            warn!(message_id = %queued.id, "message exhausted redelivery attempts while throttled");
            let outcome = JobTracker::record_rate_limited(&self.db, &queued.message.job_id).await?;
            QueuedItem::delete(&self.db, &queued.id).await?;
            if outcome.should_finalize {
                self.finalize(&queued.message.job_id, &queued.message.cleansed_data_store_id).await?;
            }
            return Ok(());
        }

        QueuedItem::extend_visibility(&self.db, &queued.id, self.config.throttle_delay_sec).await?;
        Ok(())
    }

    async fn record_progress_and_maybe_finalize(
        &self,
        job_id: &str,
        success: bool,
        batch: &CleansedBatch,
    ) -> Result<(), AppError> {
        let outcome = JobTracker::record_progress(&self.db, job_id, success).await?;
        self.progress
            .publish(
                job_id,
                ProgressEvent::Progress {
                    processed_items: outcome.tracker.processed_items,
                    total_items: outcome.tracker.total_items,
                    success_count: outcome.tracker.success_count,
                    failure_count: outcome.tracker.failure_count,
                },
            )
            .await;

        if outcome.should_finalize {
            self.finalize(job_id, &batch.id).await?;
        }
        Ok(())
    }

    /// Finalize a job: consolidate, write vectors, compute the final
    /// CleansedBatch status, and mark the JobTracker completed (spec.md
    /// §4.9/§4.11/§4.12). Vector-write failures are recorded as warnings and
    /// never roll back job completion (spec.md §9).
    async fn finalize(&self, job_id: &str, cleansed_data_store_id: &str) -> Result<(), AppError> {
        let Some(batch) = CleansedBatch::get_by_id(&self.db, cleansed_data_store_id).await? else {
            return Err(AppError::NotFound(format!("cleansed batch {cleansed_data_store_id} missing at finalize")));
        };
        let Some(tracker) = self.db.get_item::<JobTracker>(job_id).await? else {
            return Err(AppError::NotFound(format!("job tracker {job_id} missing at finalize")));
        };

        let sections = consolidator::consolidate(
            &self.db,
            &self.config,
            &batch.source_uri,
            cleansed_data_store_id,
            batch.version,
        )
        .await?;

        let mut diagnostics = common::storage::types::cleansed_batch::JobSummary {
            total_deserialized_items: tracker.total_items,
            items_attempted: tracker.processed_items,
            successfully_enriched: tracker.success_count,
            failed_enrichment_attempts: tracker.failure_count,
            skipped_by_rate_limit: tracker.rate_limited_count,
            item_processing_error_messages: Vec::new(),
        };

        match vector_writer::write_vectors(&self.db, &self.ai_client, &self.config, &sections).await {
            Ok(summary) => {
                if let Some(warning) = summary.size_mismatch_warning {
                    diagnostics.push_error_message(&warning);
                }
            }
            Err(err) => {
                warn!(error = %err, "vector write failed during finalization; job still completes");
                diagnostics.push_error_message(&format!("vector write failed: {err}"));
            }
        }

        let final_status = compute_final_status(&tracker);
        batch.finalize(&self.db, final_status.clone(), diagnostics).await?;
        JobTracker::mark_completed(&self.db, job_id).await?;

        self.progress
            .publish(job_id, ProgressEvent::Complete { status: format!("{final_status:?}") })
            .await;

        info!(%job_id, status = ?final_status, "job finalized");
        Ok(())
    }
}

/// Final status computation (spec.md §4.12).
fn compute_final_status(tracker: &JobTracker) -> CleansedBatchStatus {
    if tracker.total_items == 0 {
        return CleansedBatchStatus::EnrichedNoItemsToProcess;
    }

    let attempted = tracker.success_count + tracker.failure_count + tracker.rate_limited_count;
    if attempted == 0 {
        return CleansedBatchStatus::EnrichedAllSkippedEmptyText;
    }
    if tracker.failure_count == 0 && tracker.rate_limited_count == 0 && tracker.success_count == attempted {
        return CleansedBatchStatus::EnrichedComplete;
    }
    if tracker.success_count > 0 && (tracker.failure_count > 0 || tracker.rate_limited_count > 0) {
        return CleansedBatchStatus::PartiallyEnriched;
    }
    if tracker.failure_count == attempted {
        return CleansedBatchStatus::EnrichmentFailedAllAttempted;
    }
    if tracker.rate_limited_count == attempted {
        return CleansedBatchStatus::EnrichmentSkippedAllRateLimit;
    }
    CleansedBatchStatus::EnrichmentIssuesDetected
}
