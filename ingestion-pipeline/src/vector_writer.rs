//! Vector Writer (C15): batch embed, align, save chunks (spec.md §4.11).

use common::error::AppError;
use common::storage::db::SurrealDbClient;
use common::storage::types::consolidated_section::ConsolidatedSection;
use common::storage::types::content_chunk::ContentChunk;
use common::utils::config::AppConfig;
use tracing::warn;

use crate::ai_client::AiClient;
use crate::chunker;

/// Outcome of writing vector chunks for a batch of sections.
#[derive(Debug, Default)]
pub struct VectorWriteSummary {
    pub chunks_saved: usize,
    /// Set when the embedding batch returned fewer vectors than placeholders
    /// (spec.md §4.11 "emit a warning and record into the job summary").
    pub size_mismatch_warning: Option<String>,
}

/// Chunk every section, embed all chunks in one batch call, and persist the
/// chunks in order. Persist failures per-chunk must not roll back siblings
/// (spec.md §4.11) — each chunk is written independently and a failure is
/// logged rather than propagated.
pub async fn write_vectors(
    db: &SurrealDbClient,
    ai_client: &AiClient,
    config: &AppConfig,
    sections: &[ConsolidatedSection],
) -> Result<VectorWriteSummary, AppError> {
    let mut placeholders: Vec<(String, u32, String, String)> = Vec::new();
    let mut texts: Vec<String> = Vec::new();

    for section in sections {
        let chunks = chunker::chunk(
            &section.cleansed_text,
            config.length_threshold,
            config.sentences_per_chunk,
            config.sentence_overlap,
        );
        for (index, chunk_text) in chunks.into_iter().enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            placeholders.push((
                section.id.clone(),
                index as u32,
                section.original_field_name.clone(),
                section.section_path.clone(),
            ));
            texts.push(chunk_text);
        }
    }

    if texts.is_empty() {
        return Ok(VectorWriteSummary::default());
    }

    let vectors = ai_client.generate_embeddings_in_batch(&texts).await?;

    let saved_count = placeholders.len().min(vectors.len());
    let size_mismatch_warning = if placeholders.len() != vectors.len() {
        let message = format!(
            "embedding batch returned {} vectors for {} chunks; saving the first {}",
            vectors.len(),
            placeholders.len(),
            saved_count
        );
        warn!("{message}");
        Some(message)
    } else {
        None
    };

    let mut chunks_saved = 0;
    for (index, vector) in vectors.into_iter().enumerate().take(saved_count) {
        let (section_id, chunk_index, source_field, section_path) = placeholders[index].clone();
        let text = texts[index].clone();
        let chunk = ContentChunk::new(section_id, chunk_index, text, source_field, section_path, vector);
        match db.store_item(chunk).await {
            Ok(_) => chunks_saved += 1,
            Err(err) => warn!(error = %err, "failed to persist a content chunk, continuing with siblings"),
        }
    }

    Ok(VectorWriteSummary { chunks_saved, size_mismatch_warning })
}
