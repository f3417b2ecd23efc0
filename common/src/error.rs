use thiserror::Error;
use tokio::task::JoinError;

/// Errors produced anywhere in the ingestion/enrichment/consolidation pipeline.
///
/// `Throttled` is kept distinct from `Provider` per the AI client's retry
/// contract (spec.md §4.6/§7): it must never be mistaken for a permanent
/// failure by a caller that only matches on `AppError` broadly.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] surrealdb::Error),
    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Task join error: {0}")]
    Join(#[from] JoinError),
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Internal service error: {0}")]
    InternalError(String),

    /// AI provider signaled throttling (HTTP 429 or a throttling error code) and
    /// retries were exhausted. Handled by extending queue message visibility,
    /// never by writing a permanent failure record.
    #[error("AI provider throttled the request after exhausting retries")]
    Throttled,
    /// Any other AI provider error (non-throttling), or a response that failed
    /// enrichment-result validation.
    #[error("AI provider error: {0}")]
    Provider(String),
    /// AI response failed schema/shape validation (§4.6 response validation).
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
    /// Extraction of content items from a document tree failed (§4.1).
    #[error("Extraction failed: {0}")]
    Extraction(String),
    /// Durable queue operation failed (publish/receive/delete/extend-visibility).
    #[error("Queue error: {0}")]
    Queue(String),
    /// Ingestion could not even reach the extraction stage.
    #[error("Ingestion error: {0}")]
    Ingestion(String),
}
