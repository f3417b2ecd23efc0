//! Refiner (C17): facet-chip aggregation over top search hits (spec.md §4.14).

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use common::error::AppError;
use common::storage::db::SurrealDbClient;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::search::{search, Embedder, SearchFilters};

const REFINE_THRESHOLD: f32 = 0.9;
const REFINE_LIMIT: usize = 20;
const CHIP_LIMIT: usize = 10;

/// Selected nested context fields harvested into `Context:<prefix>.<key>`
/// chips (spec.md §4.14).
const CONTEXT_CHIP_FIELDS: &[(&str, &str)] =
    &[("facets", "sectionModel"), ("facets", "eventType"), ("envelope", "sectionName"), ("envelope", "locale"), ("envelope", "country")];

/// A facet suggestion surfaced to the UI by `refine` (spec.md §4.14).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chip {
    pub chip_type: String,
    pub value: String,
    pub score: f32,
    pub count: usize,
}

struct ChipAccumulator {
    chip_type: String,
    value: String,
    score: f32,
    sections: HashSet<String>,
}

/// Run `search` at the refine threshold/limit and aggregate tags, keywords,
/// and selected context fields into ranked chips (spec.md §4.14).
pub async fn refine(db: &SurrealDbClient, embedder: &dyn Embedder, query: &str) -> Result<Vec<Chip>, AppError> {
    let filters = SearchFilters { threshold: Some(REFINE_THRESHOLD), ..SearchFilters::default() };
    let hits = search(db, embedder, query, REFINE_LIMIT, &filters).await?;

    let mut chips: HashMap<(String, String), ChipAccumulator> = HashMap::new();
    for hit in &hits {
        let weight = 1.0 - hit.distance;

        for tag in &hit.tags {
            accumulate(&mut chips, "Tag", tag, weight, &hit.section_id);
        }
        for keyword in &hit.keywords {
            accumulate(&mut chips, "Keyword", keyword, weight, &hit.section_id);
        }
        for (path_prefix, key) in CONTEXT_CHIP_FIELDS {
            if let Some(value) = lookup(&hit.context, path_prefix, key) {
                let chip_type = format!("Context:{path_prefix}.{key}");
                accumulate(&mut chips, &chip_type, &value, weight, &hit.section_id);
            }
        }
    }

    let mut ranked: Vec<Chip> = chips
        .into_values()
        .map(|acc| Chip { chip_type: acc.chip_type, value: acc.value, score: acc.score, count: acc.sections.len() })
        .collect();
    ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    ranked.truncate(CHIP_LIMIT);
    Ok(ranked)
}

fn lookup(context: &Value, path_prefix: &str, key: &str) -> Option<String> {
    context.get(path_prefix)?.get(key)?.as_str().map(str::to_string)
}

fn accumulate(
    chips: &mut HashMap<(String, String), ChipAccumulator>,
    chip_type: &str,
    value: &str,
    weight: f32,
    section_id: &str,
) {
    let key = (chip_type.to_string(), value.to_string());
    let entry = chips.entry(key).or_insert_with(|| ChipAccumulator {
        chip_type: chip_type.to_string(),
        value: value.to_string(),
        score: 0.0,
        sections: HashSet::new(),
    });
    entry.score += weight;
    entry.sections.insert(section_id.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::storage::types::consolidated_section::ConsolidatedSection;
    use common::storage::types::content_chunk::ContentChunk;
    use uuid::Uuid;

    struct FixedEmbedder(Vec<f32>);

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, AppError> {
            Ok(self.0.clone())
        }
    }

    async fn test_db() -> SurrealDbClient {
        let db = SurrealDbClient::memory("refine_test", &Uuid::new_v4().to_string()).await.expect("in-memory db");
        db.ensure_initialized(3).await.expect("init schema");
        db
    }

    async fn seed(db: &SurrealDbClient, tags: Vec<String>, keywords: Vec<String>, locale: &str, vector: Vec<f32>) {
        let section = ConsolidatedSection::new(
            "src".into(),
            1,
            "/p".into(),
            "/p".into(),
            "copy".into(),
            "hello".into(),
            None,
            None,
            keywords,
            tags,
            None,
            None,
            serde_json::json!({"envelope": {"locale": locale}}),
        );
        let stored = db.store_item(section.clone()).await.expect("store section");
        let section = stored.unwrap_or(section);
        let chunk = ContentChunk::new(section.id.clone(), 0, "hello".into(), "copy".into(), "/p".into(), vector);
        db.store_item(chunk).await.expect("store chunk");
    }

    #[tokio::test]
    async fn chips_accumulate_across_sections_and_rank_by_score() {
        let db = test_db().await;
        seed(&db, vec!["promo".into()], vec!["sale".into()], "en-US", vec![1.0, 0.0, 0.0]).await;
        seed(&db, vec!["promo".into()], vec![], "en-GB", vec![0.99, 0.01, 0.0]).await;

        let chips = refine(&db, &FixedEmbedder(vec![1.0, 0.0, 0.0]), "hello").await.expect("refine");

        let promo = chips.iter().find(|c| c.chip_type == "Tag" && c.value == "promo").expect("promo chip");
        assert_eq!(promo.count, 2);

        let locale_us = chips
            .iter()
            .find(|c| c.chip_type == "Context:envelope.locale" && c.value == "en-US")
            .expect("locale chip");
        assert_eq!(locale_us.count, 1);

        assert!(chips.len() <= CHIP_LIMIT);
        for pair in chips.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }
}
