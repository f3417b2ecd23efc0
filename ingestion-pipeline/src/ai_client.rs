//! Prompt build, invoke, parse, backoff, and throttle surfacing for the
//! external AI provider (spec.md §4.6).

use common::error::AppError;
use common::utils::config::AppConfig;
use rand::Rng;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::{sleep, Duration};

use crate::rate_limiter::RateLimiters;

/// Maximum retry attempts on a throttling response before raising `Throttled`.
const MAX_ATTEMPTS: u32 = 6;
/// Upper bound on a single backoff sleep, in milliseconds.
const MAX_BACKOFF_MS: u64 = 10_000;
const CHAT_BACKOFF_BASE_MS: u64 = 800;
const EMBED_BACKOFF_BASE_MS: u64 = 400;

const THROTTLING_ERROR_CODES: &[&str] =
    &["ThrottlingException", "TooManyRequestsException", "ProvisionedThroughputExceededException"];

/// Result of one successful `enrichItem` call (spec.md §3 EnrichedElement fields).
#[derive(Debug, Clone, Deserialize)]
pub struct StandardEnrichments {
    pub summary: String,
    pub keywords: Vec<String>,
    pub sentiment: String,
    pub classification: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EnrichmentEnvelope {
    #[serde(default)]
    error: Option<String>,
    #[serde(rename = "standardEnrichments")]
    standard_enrichments: Option<StandardEnrichments>,
}

/// Classification of a single provider call failure (spec.md §4.6/§7).
enum CallOutcome {
    Throttled,
    /// Transport/HTTP-level failure, not classified as throttling.
    Provider(String),
}

pub struct AiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model_id: String,
    embedding_model_id: String,
    bedrock_max_tokens: u32,
    pub limiters: RateLimiters,
}

impl AiClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.ai_base_url.clone(),
            api_key: config.ai_api_key.clone(),
            model_id: config.model_id.clone(),
            embedding_model_id: config.embedding_model_id.clone(),
            bedrock_max_tokens: config.bedrock_max_tokens,
            limiters: RateLimiters::new(config.chat_qps_clamped(), config.embed_qps_clamped()),
        }
    }

    fn chat_prompt(content: &str, context: &Value) -> String {
        format!(
            "You are a content enrichment assistant. Given the content and context below, \
             respond with a single JSON object with key \"standardEnrichments\" containing \
             \"summary\" (string), \"keywords\" (array of strings), \"sentiment\" (string), \
             \"classification\" (string), and \"tags\" (array of strings). Respond with JSON only.\n\
             <content>{content}</content>\n<context>{context}</context>",
            context = context
        )
    }

    /// Acquire a chat permit, invoke the provider, validate, and return the
    /// enrichment. `context` must already contain `fullContextId`, `sourcePath`,
    /// and `provenance.modelId` (added by the worker before this call per §4.6).
    pub async fn enrich_item(&self, content: &str, context: &Value) -> Result<StandardEnrichments, AppError> {
        self.limiters.chat.acquire().await;

        let prompt = Self::chat_prompt(content, context);
        let body = json!({
            "anthropic_version": "bedrock-2023-05-31",
            "max_tokens": self.bedrock_max_tokens,
            "messages": [{"role": "user", "content": prompt}],
        });

        let raw = self.call_with_retry("chat", CHAT_BACKOFF_BASE_MS, &body).await?;
        let text = extract_response_text(&raw)?;
        let stripped = strip_code_fence(&text);
        parse_and_validate(&stripped, context)
    }

    /// Acquire an embed permit and generate one embedding vector.
    pub async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>, AppError> {
        self.limiters.embed.acquire().await;

        let body = json!({ "inputText": text });
        let raw = self.call_with_retry("embed", EMBED_BACKOFF_BASE_MS, &body).await?;
        let embedding = raw
            .get("embedding")
            .and_then(Value::as_array)
            .ok_or_else(|| AppError::Provider("embedding response missing 'embedding' array".to_string()))?;
        parse_vector(embedding)
    }

    /// Acquire one embed permit for the whole batch and embed all `texts` in a
    /// single call (spec.md §4.6 `generateEmbeddingsInBatch`).
    pub async fn generate_embeddings_in_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        self.limiters.embed.acquire().await;

        let body = json!({ "inputText": texts });
        let raw = self.call_with_retry("embed", EMBED_BACKOFF_BASE_MS, &body).await?;
        let embedding = raw
            .get("embedding")
            .and_then(Value::as_array)
            .ok_or_else(|| AppError::Provider("embedding response missing 'embedding' array".to_string()))?;

        embedding
            .iter()
            .map(|entry| {
                entry
                    .as_array()
                    .ok_or_else(|| AppError::Provider("batch embedding entry was not an array".to_string()))
                    .and_then(|vector| parse_vector(vector))
            })
            .collect()
    }

    /// Retry/backoff state machine (spec.md §4.6). `base_ms` is the base for
    /// `min(10_000, base * 2^(attempt-1)) + jitter(50..200)` ms.
    async fn call_with_retry(&self, endpoint: &str, base_ms: u64, body: &Value) -> Result<Value, AppError> {
        let mut attempt: u32 = 1;
        loop {
            match self.call_once(endpoint, body).await {
                Ok(response) => return Ok(response),
                Err(CallOutcome::Provider(message)) => return Err(AppError::Provider(message)),
                Err(CallOutcome::Throttled) => {
                    if attempt >= MAX_ATTEMPTS {
                        return Err(AppError::Throttled);
                    }
                    let delay = backoff_delay(base_ms, attempt);
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn call_once(&self, endpoint: &str, body: &Value) -> Result<Value, CallOutcome> {
        let url = format!("{}/{endpoint}", self.base_url.trim_end_matches('/'));
        let mut request = self.http.post(&url).json(body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|err| CallOutcome::Provider(err.to_string()))?;

        if response.status().as_u16() == 429 {
            return Err(CallOutcome::Throttled);
        }

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|err| CallOutcome::Provider(format!("failed to decode provider response: {err}")))?;

        if let Some(code) = payload.get("__type").and_then(Value::as_str) {
            if THROTTLING_ERROR_CODES.contains(&code) {
                return Err(CallOutcome::Throttled);
            }
        }

        if !status.is_success() {
            return Err(CallOutcome::Provider(format!("provider returned status {status}")));
        }

        Ok(payload)
    }
}

fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let exponential = base_ms.saturating_mul(1u64 << (attempt.saturating_sub(1)));
    let capped = exponential.min(MAX_BACKOFF_MS);
    #[allow(clippy::unwrap_used)]
    let jitter_ms = rand::thread_rng().gen_range(50..=200);
    Duration::from_millis(capped + jitter_ms)
}

/// Bedrock-shaped chat responses nest the assistant text under `content[0].text`;
/// fall back to a top-level `completion`/`text` field for simpler providers.
fn extract_response_text(raw: &Value) -> Result<String, AppError> {
    if let Some(text) = raw
        .get("content")
        .and_then(Value::as_array)
        .and_then(|blocks| blocks.first())
        .and_then(|block| block.get("text"))
        .and_then(Value::as_str)
    {
        return Ok(text.to_string());
    }
    if let Some(text) = raw.get("completion").and_then(Value::as_str) {
        return Ok(text.to_string());
    }
    if let Some(text) = raw.get("text").and_then(Value::as_str) {
        return Ok(text.to_string());
    }
    Err(AppError::Provider("provider response contained no recognizable text field".to_string()))
}

/// Strip a ```` ```json ... ``` ```` wrapper if present (spec.md §4.6).
fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    let Some(without_leading) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    let without_leading = without_leading.strip_prefix("json").unwrap_or(without_leading);
    let without_leading = without_leading.trim_start_matches(['\n', '\r']);
    without_leading.strip_suffix("```").unwrap_or(without_leading).trim().to_string()
}

/// Parse the provider's JSON body and run the §4.6 response validation.
/// Any failure here returns a `ValidationFailed` for the worker to persist as
/// an error row — it is never classified as `Throttled`.
fn parse_and_validate(body: &str, context: &Value) -> Result<StandardEnrichments, AppError> {
    if !body.starts_with('{') || !body.ends_with('}') {
        return Err(AppError::ValidationFailed("response body is not a JSON object".to_string()));
    }

    let envelope: EnrichmentEnvelope = serde_json::from_str(body)
        .map_err(|err| AppError::ValidationFailed(format!("could not parse enrichment JSON: {err}")))?;

    if let Some(error) = envelope.error {
        return Err(AppError::ValidationFailed(format!("provider response carried an error: {error}")));
    }

    let enrichments = envelope
        .standard_enrichments
        .ok_or_else(|| AppError::ValidationFailed("missing standardEnrichments".to_string()))?;

    validate_context(context)?;

    Ok(enrichments)
}

/// Validates the `context` map carries `fullContextId`, `sourcePath`, and
/// `provenance.modelId` as strings (spec.md §4.6 response validation, last bullet).
fn validate_context(context: &Value) -> Result<(), AppError> {
    let has_string_field = |field: &str| context.get(field).and_then(Value::as_str).is_some();
    if !has_string_field("fullContextId") || !has_string_field("sourcePath") {
        return Err(AppError::ValidationFailed("context missing fullContextId/sourcePath".to_string()));
    }
    let has_model_id = context
        .get("provenance")
        .and_then(|provenance| provenance.get("modelId"))
        .and_then(Value::as_str)
        .is_some();
    if !has_model_id {
        return Err(AppError::ValidationFailed("context missing provenance.modelId".to_string()));
    }
    Ok(())
}

fn parse_vector(values: &[Value]) -> Result<Vec<f32>, AppError> {
    #[allow(clippy::cast_possible_truncation)]
    values
        .iter()
        .map(|value| {
            value
                .as_f64()
                .map(|number| number as f32)
                .ok_or_else(|| AppError::Provider("embedding vector contained a non-numeric entry".to_string()))
        })
        .collect()
}
