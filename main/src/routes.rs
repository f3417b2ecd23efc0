//! HTTP surface (spec.md §6 "Ingestion HTTP surface"): thin axum wrappers
//! around the Ingestion Orchestrator, Progress Notifier, and Refiner/Search.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use common::error::AppError;
use common::storage::db::SurrealDbClient;
use common::storage::store::StorageManager;
use common::storage::types::cleansed_batch::CleansedBatch;
use common::utils::config::AppConfig;
use common::utils::ingest_limits::{validate_ingest_input, IngestValidationError};
use futures::stream::{self, Stream};
use ingestion_pipeline::orchestrator::{schedule_enrichment, IngestOutcome};
use ingestion_pipeline::{AiClient, IngestionOrchestrator, ProgressNotifier};
use retrieval_pipeline::{refine, search, SearchFilters};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<SurrealDbClient>,
    pub ai_client: Arc<AiClient>,
    pub storage: Arc<StorageManager>,
    pub progress: Arc<ProgressNotifier>,
    pub config: AppConfig,
}

/// Build the router named in spec.md §6.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/extract-cleanse-enrich-and-store", get(extract_cleanse_enrich_and_store))
        .route("/ingest-json-payload", post(ingest_json_payload))
        .route("/cleansed-data-status/{id}", get(cleansed_data_status))
        .route("/progress/{job_id}", get(progress_stream))
        .route("/api/refine", get(api_refine))
        .route("/api/search", post(api_search))
        .with_state(state)
}

/// Error wrapper giving `AppError` an axum `IntoResponse` (kept in the HTTP
/// layer since `common` has no axum dependency).
struct ApiError(AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) | AppError::ValidationFailed(_) | AppError::Extraction(_) | AppError::Ingestion(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Throttled => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[derive(Debug, Serialize)]
struct IngestAccepted {
    job_id: Option<String>,
    cleansed_data_id: String,
    progress_url: Option<String>,
}

async fn schedule_and_respond(state: &AppState, outcome: IngestOutcome) -> Result<Response, ApiError> {
    match outcome {
        IngestOutcome::Cleansed(batch) => {
            let tracker = schedule_enrichment(&state.db, &batch).await?;
            let body = IngestAccepted {
                job_id: Some(tracker.id.clone()),
                cleansed_data_id: batch.id.clone(),
                progress_url: Some(format!("/progress/{}", tracker.id)),
            };
            Ok((StatusCode::ACCEPTED, Json(body)).into_response())
        }
        IngestOutcome::Terminal { status, cleansed_batch } => {
            let cleansed_data_id = cleansed_batch.map(|batch| batch.id).unwrap_or_default();
            let body = serde_json::json!({
                "status": format!("{status:?}"),
                "cleansedDataId": cleansed_data_id,
            });
            Ok((StatusCode::BAD_REQUEST, Json(body)).into_response())
        }
    }
}

#[derive(Debug, Deserialize)]
struct SourceUriQuery {
    #[serde(rename = "sourceUri")]
    source_uri: String,
}

/// `GET /extract-cleanse-enrich-and-store?sourceUri=<uri>` (spec.md §6).
async fn extract_cleanse_enrich_and_store(
    State(state): State<AppState>,
    Query(query): Query<SourceUriQuery>,
) -> Result<Response, ApiError> {
    let payload = state
        .storage
        .get(&query.source_uri)
        .await
        .map_err(|err| ApiError(AppError::ObjectStore(err)))?;

    validate_ingest_input(&state.config, Some(&String::from_utf8_lossy(&payload)), "", "", 1)
        .map_err(ingest_validation_to_api_error)?;

    let orchestrator = IngestionOrchestrator::new(state.db.clone());
    let outcome = orchestrator.ingest(&query.source_uri, &payload).await?;
    schedule_and_respond(&state, outcome).await
}

/// `POST /ingest-json-payload` (spec.md §6): raw JSON body, auto-assigned
/// `api-payload-<uuid>` source identifier.
async fn ingest_json_payload(State(state): State<AppState>, body: axum::body::Bytes) -> Result<Response, ApiError> {
    validate_ingest_input(&state.config, Some(&String::from_utf8_lossy(&body)), "", "", 1)
        .map_err(ingest_validation_to_api_error)?;

    let source_uri = format!("api-payload-{}", Uuid::new_v4());
    let orchestrator = IngestionOrchestrator::new(state.db.clone());
    let outcome = orchestrator.ingest(&source_uri, &body).await?;
    schedule_and_respond(&state, outcome).await
}

fn ingest_validation_to_api_error(err: IngestValidationError) -> ApiError {
    let message = match err {
        IngestValidationError::PayloadTooLarge(message) | IngestValidationError::BadRequest(message) => message,
    };
    ApiError(AppError::Validation(message))
}

/// `GET /cleansed-data-status/{id}` (spec.md §6).
async fn cleansed_data_status(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let batch = CleansedBatch::get_by_id(&state.db, &id).await?;
    match batch {
        Some(batch) => Ok(Json(batch).into_response()),
        None => Err(ApiError(AppError::NotFound(format!("cleansed batch {id} not found")))),
    }
}

/// `GET /progress/{jobId}` (spec.md §6/§4.13): server-sent event stream.
async fn progress_stream(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.progress.subscribe(&job_id).await;
    let stream = stream::unfold(receiver, |mut receiver| async move {
        let event = receiver.recv().await?;
        let payload = serde_json::to_string(&event).unwrap_or_default();
        Some((Ok(Event::default().data(payload)), receiver))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[derive(Debug, Deserialize)]
struct RefineQuery {
    query: String,
}

/// `GET /api/refine?query=…` (spec.md §4.14/§6).
async fn api_refine(State(state): State<AppState>, Query(query): Query<RefineQuery>) -> Result<Response, ApiError> {
    let chips = refine(&state.db, state.ai_client.as_ref(), &query.query).await?;
    Ok(Json(chips).into_response())
}

#[derive(Debug, Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    context: Value,
    #[serde(default)]
    original_field_name: Option<String>,
    #[serde(default = "default_search_limit")]
    limit: usize,
}

fn default_search_limit() -> usize {
    10
}

/// `POST /api/search` (spec.md §4.14/§6).
async fn api_search(State(state): State<AppState>, Json(body): Json<SearchRequest>) -> Result<Response, ApiError> {
    let filters = SearchFilters {
        original_field_name: body.original_field_name,
        tags: body.tags,
        keywords: body.keywords,
        context_map: if body.context.is_null() { None } else { Some(body.context) },
        threshold: None,
    };
    let hits = search(&state.db, state.ai_client.as_ref(), &body.query, body.limit, &filters).await?;
    Ok(Json(hits).into_response())
}
