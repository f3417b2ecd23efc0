use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

/// Transport object published to the queue, one per cleansed `Item` (spec.md §6
/// "Queue message").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueMessage {
    pub job_id: String,
    pub cleansed_data_store_id: String,
    pub source_path: String,
    pub original_field_name: String,
    pub cleansed_content: String,
    pub model: Option<String>,
    pub context: Value,
    pub total_items: u32,
}

stored_object!(QueuedItem, "enrichment_queue", {
    message: QueueMessage,
    visible_at: DateTime<Utc>,
    receive_count: u32
});

/// Durable work queue with per-message visibility timeout (spec.md §4.7/§C9).
///
/// Backed by the same SurrealDB instance as everything else rather than a
/// dedicated broker — spec.md §1 scopes the queue as an external collaborator
/// only at the interface level, so this is the concrete stand-in used for
/// tests and for running the worker pool against the in-memory database.
pub const DEFAULT_VISIBILITY_SECS: i64 = 300;
pub const DEFAULT_MAX_RECEIVE_COUNT: u32 = 5;

impl QueuedItem {
    pub async fn publish(db: &SurrealDbClient, message: QueueMessage) -> Result<Self, AppError> {
        let now = Utc::now();
        let item = Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            message,
            visible_at: now,
            receive_count: 0,
        };
        let stored = db.store_item(item.clone()).await?;
        Ok(stored.unwrap_or(item))
    }

    /// Claim the oldest currently-visible message and make it invisible for
    /// `visibility_secs` (long-poll emulated as a single best-effort pass;
    /// callers loop with their own idle backoff, as the worker pool does).
    pub async fn claim_next(
        db: &SurrealDbClient,
        visibility_secs: i64,
        max_receive_count: u32,
    ) -> Result<Option<Self>, AppError> {
        let now = Utc::now();

        let mut response = db
            .query(
                "SELECT * FROM enrichment_queue \
                 WHERE visible_at <= $now AND receive_count < $max_receive \
                 ORDER BY created_at ASC LIMIT 1",
            )
            .bind(("now", now))
            .bind(("max_receive", max_receive_count))
            .await?;
        let candidates: Vec<Self> = response.take(0)?;
        let Some(candidate) = candidates.into_iter().next() else {
            return Ok(None);
        };

        let next_visible = now + chrono::Duration::seconds(visibility_secs);
        let updated: Option<Self> = db
            .client
            .update((Self::table_name(), candidate.id.clone()))
            .merge(serde_json::json!({
                "visible_at": next_visible,
                "receive_count": candidate.receive_count + 1,
            }))
            .await?;

        Ok(updated)
    }

    pub async fn delete(db: &SurrealDbClient, id: &str) -> Result<(), AppError> {
        let _: Option<Self> = db.delete_item(id).await?;
        Ok(())
    }

    /// Extend visibility without deleting — used when the AI client reports
    /// `Throttled` so redelivery happens later instead of immediately
    /// (spec.md §4.7 step 3 "Throttled").
    pub async fn extend_visibility(
        db: &SurrealDbClient,
        id: &str,
        delay_secs: i64,
    ) -> Result<(), AppError> {
        let next_visible = Utc::now() + chrono::Duration::seconds(delay_secs);
        db.query("UPDATE type::thing('enrichment_queue', $id) SET visible_at = $next_visible")
            .bind(("id", id.to_owned()))
            .bind(("next_visible", next_visible))
            .await?;
        Ok(())
    }

    /// Messages that exceeded `max_receive_count` are considered dead-lettered;
    /// exposed for diagnostics rather than a separate DLQ table.
    pub async fn dead_lettered(
        db: &SurrealDbClient,
        max_receive_count: u32,
    ) -> Result<Vec<Self>, AppError> {
        let mut response = db
            .query("SELECT * FROM enrichment_queue WHERE receive_count >= $max")
            .bind(("max", max_receive_count))
            .await?;
        Ok(response.take(0)?)
    }
}
