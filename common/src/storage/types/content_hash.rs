use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(ContentHashRow, "content_hashes", {
    source_path: String,
    item_type: String,
    usage_path: String,
    content_hash: String,
    context_hash: Option<String>
});

/// Deterministic id for the composite key `(sourcePath, itemType, usagePath)`
/// so upserts address the same record without a separate lookup index.
fn composite_key(source_path: &str, item_type: &str, usage_path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_path.as_bytes());
    hasher.update([0u8]);
    hasher.update(item_type.as_bytes());
    hasher.update([0u8]);
    hasher.update(usage_path.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl ContentHashRow {
    /// Look up the dedup row for an item's composite key.
    pub async fn find(
        db: &SurrealDbClient,
        source_path: &str,
        item_type: &str,
        usage_path: &str,
    ) -> Result<Option<Self>, AppError> {
        let id = composite_key(source_path, item_type, usage_path);
        db.get_item(&id).await.map_err(AppError::from)
    }

    /// Returns `true` when an item at this composite key should be kept,
    /// i.e. no row exists yet or the stored hashes differ (spec.md §4.4 step 4).
    pub fn is_changed(existing: Option<&Self>, content_hash: &str, context_hash: Option<&str>) -> bool {
        match existing {
            None => true,
            Some(row) => {
                row.content_hash != content_hash || row.context_hash.as_deref() != context_hash
            }
        }
    }

    /// Upsert the dedup row for a composite key to the given hashes.
    pub async fn upsert(
        db: &SurrealDbClient,
        source_path: &str,
        item_type: &str,
        usage_path: &str,
        content_hash: &str,
        context_hash: Option<&str>,
    ) -> Result<Self, AppError> {
        let id = composite_key(source_path, item_type, usage_path);
        let now = Utc::now();
        let row = Self {
            id: id.clone(),
            created_at: now,
            updated_at: now,
            source_path: source_path.to_string(),
            item_type: item_type.to_string(),
            usage_path: usage_path.to_string(),
            content_hash: content_hash.to_string(),
            context_hash: context_hash.map(str::to_string),
        };

        let stored: Option<Self> = db
            .client
            .upsert((Self::table_name(), id))
            .content(row.clone())
            .await?;

        Ok(stored.unwrap_or(row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_is_idempotent_on_composite_key() {
        let db = SurrealDbClient::memory("content_hash_test", &uuid::Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");

        let first = ContentHashRow::upsert(&db, "/en/hero", "copy", "/en/hero", "hash1", None)
            .await
            .expect("first upsert");
        let second = ContentHashRow::upsert(&db, "/en/hero", "copy", "/en/hero", "hash2", Some("ctx"))
            .await
            .expect("second upsert");

        assert_eq!(first.id, second.id);
        assert_eq!(second.content_hash, "hash2");

        let found = ContentHashRow::find(&db, "/en/hero", "copy", "/en/hero")
            .await
            .expect("find")
            .expect("some");
        assert_eq!(found.content_hash, "hash2");
        assert_eq!(found.context_hash.as_deref(), Some("ctx"));
    }

    #[test]
    fn is_changed_detects_content_and_context_drift() {
        let row = ContentHashRow {
            id: "x".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            source_path: "/p".into(),
            item_type: "copy".into(),
            usage_path: "/p".into(),
            content_hash: "a".into(),
            context_hash: Some("c1".into()),
        };

        assert!(!ContentHashRow::is_changed(Some(&row), "a", Some("c1")));
        assert!(ContentHashRow::is_changed(Some(&row), "b", Some("c1")));
        assert!(ContentHashRow::is_changed(Some(&row), "a", Some("c2")));
        assert!(ContentHashRow::is_changed(None, "a", Some("c1")));
    }
}
