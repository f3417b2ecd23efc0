use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Finalizing,
    Completed,
}

stored_object!(JobTracker, "job_tracker", {
    cleansed_data_store_id: String,
    total_items: u32,
    processed_items: u32,
    success_count: u32,
    failure_count: u32,
    /// Items permanently abandoned to rate limiting (retries and queue
    /// redelivery both exhausted), counted toward `processedItems` per
    /// spec.md §4.12's `attempted = success + failure + rateLimited`.
    rate_limited_count: u32,
    status: JobStatus
});

/// Result of incrementing a `JobTracker`'s counters.
#[derive(Debug, Clone)]
pub struct ProgressOutcome {
    pub tracker: JobTracker,
    /// `true` exactly once per job: for the single worker whose increment
    /// made `processed_items == total_items` (spec.md §4.7 `updateJobProgress`,
    /// invariant 4).
    pub should_finalize: bool,
}

impl JobTracker {
    pub fn new(cleansed_data_store_id: String, total_items: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            cleansed_data_store_id,
            total_items,
            processed_items: 0,
            success_count: 0,
            failure_count: 0,
            rate_limited_count: 0,
            status: if total_items == 0 {
                JobStatus::Finalizing
            } else {
                JobStatus::Pending
            },
        }
    }

    pub async fn create_and_store(
        db: &SurrealDbClient,
        cleansed_data_store_id: String,
        total_items: u32,
    ) -> Result<Self, AppError> {
        let tracker = Self::new(cleansed_data_store_id, total_items);
        let stored = db.store_item(tracker.clone()).await?;
        Ok(stored.unwrap_or(tracker))
    }

    /// Mark the job as actively being worked (Pending -> Running). Idempotent.
    pub async fn mark_running(db: &SurrealDbClient, job_id: &str) -> Result<(), AppError> {
        db.query(
            "UPDATE type::thing('job_tracker', $id) SET status = 'Running' WHERE status = 'Pending'",
        )
        .bind(("id", job_id.to_owned()))
        .await?;
        Ok(())
    }

    /// Atomically increment the processed/success/failure counters for a job
    /// and detect whether this call is the one that completed the job.
    ///
    /// SurrealDB applies a single `UPDATE` statement to a record atomically;
    /// concurrent updates to the same record serialize at the storage layer,
    /// which gives the row-level pessimistic-lock semantics spec.md §4.7/§5
    /// describe without a separate `SELECT ... FOR UPDATE` step.
    pub async fn record_progress(
        db: &SurrealDbClient,
        job_id: &str,
        success: bool,
    ) -> Result<ProgressOutcome, AppError> {
        let mut response = db
            .query(
                "UPDATE type::thing('job_tracker', $id) SET \
                    processed_items += 1, \
                    success_count += (IF $success THEN 1 ELSE 0 END), \
                    failure_count += (IF $success THEN 0 ELSE 1 END), \
                    status = (IF processed_items >= total_items AND status != 'Finalizing' AND status != 'Completed' \
                        THEN 'Finalizing' ELSE status END) \
                 RETURN AFTER",
            )
            .bind(("id", job_id.to_owned()))
            .bind(("success", success))
            .await?;

        let rows: Vec<Self> = response.take(0)?;
        let tracker = rows
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound(format!("job_tracker {job_id} not found")))?;

        // This call tripped finalization iff it just reached the threshold:
        // processed_items == total_items and the tracker isn't Completed yet.
        let should_finalize =
            tracker.processed_items >= tracker.total_items && tracker.status == JobStatus::Finalizing;

        Ok(ProgressOutcome {
            tracker,
            should_finalize,
        })
    }

    pub async fn mark_completed(db: &SurrealDbClient, job_id: &str) -> Result<(), AppError> {
        db.query("UPDATE type::thing('job_tracker', $id) SET status = 'Completed'")
            .bind(("id", job_id.to_owned()))
            .await?;
        Ok(())
    }

    /// Record an item permanently abandoned to rate limiting (queue
    /// redelivery exhausted, not a single throttled attempt — those leave
    /// the counters untouched per spec.md §4.7/§7 "Throttled").
    pub async fn record_rate_limited(db: &SurrealDbClient, job_id: &str) -> Result<ProgressOutcome, AppError> {
        let mut response = db
            .query(
                "UPDATE type::thing('job_tracker', $id) SET \
                    processed_items += 1, \
                    rate_limited_count += 1, \
                    status = (IF processed_items >= total_items AND status != 'Finalizing' AND status != 'Completed' \
                        THEN 'Finalizing' ELSE status END) \
                 RETURN AFTER",
            )
            .bind(("id", job_id.to_owned()))
            .await?;

        let rows: Vec<Self> = response.take(0)?;
        let tracker = rows
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound(format!("job_tracker {job_id} not found")))?;

        let should_finalize =
            tracker.processed_items >= tracker.total_items && tracker.status == JobStatus::Finalizing;

        Ok(ProgressOutcome { tracker, should_finalize })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;

    #[tokio::test]
    async fn concurrent_increments_finalize_exactly_once() {
        let db = SurrealDbClient::memory("job_tracker_test", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");

        let tracker = JobTracker::create_and_store(&db, "batch1".into(), 5)
            .await
            .expect("create tracker");
        JobTracker::mark_running(&db, &tracker.id).await.expect("mark running");

        let mut handles = Vec::new();
        for i in 0..5 {
            let db = db.clone();
            let id = tracker.id.clone();
            handles.push(tokio::spawn(async move {
                JobTracker::record_progress(&db, &id, i % 2 == 0).await
            }));
        }

        let results = join_all(handles).await;
        let outcomes: Vec<ProgressOutcome> = results
            .into_iter()
            .map(|r| r.expect("task join").expect("progress update"))
            .collect();

        let finalize_count = outcomes.iter().filter(|o| o.should_finalize).count();
        assert_eq!(finalize_count, 1, "exactly one worker must trip finalization");

        let final_row: JobTracker = db
            .get_item(&tracker.id)
            .await
            .expect("get")
            .expect("exists");
        assert_eq!(final_row.processed_items, 5);
        assert_eq!(final_row.success_count + final_row.failure_count, 5);
    }

    #[tokio::test]
    async fn empty_job_starts_ready_to_finalize() {
        let tracker = JobTracker::new("batch".into(), 0);
        assert_eq!(tracker.status, JobStatus::Finalizing);
    }
}
