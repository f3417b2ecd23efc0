use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(ContentChunk, "content_chunks", {
    section_id: String,
    chunk_index: u32,
    chunk_text: String,
    source_field: String,
    section_path: String,
    vector: Vec<f32>
});

impl ContentChunk {
    pub fn new(
        section_id: String,
        chunk_index: u32,
        chunk_text: String,
        source_field: String,
        section_path: String,
        vector: Vec<f32>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            section_id,
            chunk_index,
            chunk_text,
            source_field,
            section_path,
            vector,
        }
    }

    /// Chunks for a section, in insertion order — vector-chunk insert order
    /// within a section is preserved (spec.md §5 "Ordering guarantees").
    pub async fn for_section(
        db: &SurrealDbClient,
        section_id: &str,
    ) -> Result<Vec<Self>, AppError> {
        let mut response = db
            .query(
                "SELECT * FROM content_chunks WHERE section_id = $id ORDER BY chunk_index ASC",
            )
            .bind(("id", section_id.to_owned()))
            .await?;
        Ok(response.take(0)?)
    }
}
