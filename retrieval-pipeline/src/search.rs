//! Refiner & Search (C17): vector search over content chunks, filtered by
//! section metadata (spec.md §4.14).

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use common::error::AppError;
use common::storage::db::SurrealDbClient;
use common::storage::types::consolidated_section::ConsolidatedSection;
use ingestion_pipeline::AiClient;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Text-to-vector collaborator for `search`. Lets tests substitute a fixed
/// embedding instead of calling out to the real AI provider.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError>;
}

#[async_trait]
impl Embedder for AiClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError> {
        self.generate_embedding(text).await
    }
}

/// One ranked hit returned by `search` (spec.md §4.14/§6 `POST /api/search`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk_id: String,
    pub section_id: String,
    pub chunk_text: String,
    pub original_field_name: String,
    pub section_path: String,
    pub section_uri: String,
    pub tags: Vec<String>,
    pub keywords: Vec<String>,
    pub summary: Option<String>,
    pub context: Value,
    /// `1 - cosine_similarity`, the user-visible score per spec.md §9 open
    /// question (c): standardized on cosine, `1 - distance` is the score.
    pub distance: f32,
}

/// Optional filters accepted by `search` (spec.md §4.14).
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub original_field_name: Option<String>,
    pub tags: Vec<String>,
    pub keywords: Vec<String>,
    pub context_map: Option<Value>,
    pub threshold: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ChunkScoreRow {
    id: String,
    section_id: String,
    chunk_text: String,
    score: f32,
}

/// How many KNN candidates to pull per requested hit before post-filtering
/// on section metadata narrows the set down.
const CANDIDATE_MULTIPLIER: usize = 8;
const CANDIDATE_FLOOR: usize = 50;
const KNN_EF: usize = 100;

/// Embed `query`, run a cosine-distance KNN search over `content_chunks`,
/// hydrate each chunk's `ConsolidatedSection`, and apply the requested
/// metadata filters (spec.md §4.14).
pub async fn search(
    db: &SurrealDbClient,
    embedder: &dyn Embedder,
    query: &str,
    limit: usize,
    filters: &SearchFilters,
) -> Result<Vec<SearchHit>, AppError> {
    let embedding = embedder.embed(query).await?;
    let take = (limit.max(1) * CANDIDATE_MULTIPLIER).max(CANDIDATE_FLOOR);

    let sql = format!(
        "SELECT id, section_id, chunk_text, \
            vector::similarity::cosine(vector, $embedding) AS score \
         FROM content_chunks \
         WHERE vector <|{take},{KNN_EF}|> $embedding \
         ORDER BY score DESC \
         LIMIT {take}"
    );

    let mut response = db.query(sql).bind(("embedding", embedding)).await?;
    let rows: Vec<ChunkScoreRow> = response.take(0)?;

    let mut section_cache: HashMap<String, Option<ConsolidatedSection>> = HashMap::new();
    let mut hits = Vec::with_capacity(rows.len());

    for row in rows {
        let section = match section_cache.get(&row.section_id) {
            Some(cached) => cached.clone(),
            None => {
                let loaded = db.get_item::<ConsolidatedSection>(&row.section_id).await?;
                section_cache.insert(row.section_id.clone(), loaded.clone());
                loaded
            }
        };
        let Some(section) = section else { continue };

        if !matches_filters(&section, filters) {
            continue;
        }

        let distance = 1.0 - row.score;
        if let Some(threshold) = filters.threshold {
            if distance >= threshold {
                continue;
            }
        }

        hits.push(SearchHit {
            chunk_id: row.id,
            section_id: row.section_id,
            chunk_text: row.chunk_text,
            original_field_name: section.original_field_name.clone(),
            section_path: section.section_path.clone(),
            section_uri: section.section_uri.clone(),
            tags: section.tags.clone(),
            keywords: section.keywords.clone(),
            summary: section.summary.clone(),
            context: section.context.clone(),
            distance,
        });
    }

    hits.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(Ordering::Equal));
    hits.truncate(limit);
    Ok(hits)
}

fn matches_filters(section: &ConsolidatedSection, filters: &SearchFilters) -> bool {
    if let Some(field) = &filters.original_field_name {
        if !section.original_field_name.eq_ignore_ascii_case(field) {
            return false;
        }
    }

    if !filters.tags.is_empty()
        && !filters
            .tags
            .iter()
            .all(|wanted| section.tags.iter().any(|tag| tag.to_lowercase().contains(&wanted.to_lowercase())))
    {
        return false;
    }

    if !filters.keywords.is_empty()
        && !filters.keywords.iter().all(|wanted| section.keywords.iter().any(|kw| kw.eq_ignore_ascii_case(wanted)))
    {
        return false;
    }

    if let Some(context_map) = &filters.context_map {
        if !json_contains(&section.context, context_map) {
            return false;
        }
    }

    true
}

/// `needle` is contained in `haystack` when every key of an object `needle`
/// recursively matches the same path in `haystack`; scalars and arrays
/// compare by equality (spec.md §4.14 "contextMap JSON containment").
fn json_contains(haystack: &Value, needle: &Value) -> bool {
    match (haystack, needle) {
        (Value::Object(h), Value::Object(n)) => {
            n.iter().all(|(key, value)| h.get(key).is_some_and(|hv| json_contains(hv, value)))
        }
        _ => haystack == needle,
    }
}
