use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

/// Terminal statuses a `RawSource` (and transitively its ingestion) can settle
/// into before enrichment is ever scheduled (spec.md §4.4 "Fatal ingestion
/// statuses"). `Loaded` is the only non-terminal status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum RawSourceStatus {
    Loaded,
    InvalidUri,
    SourceFileNotFound,
    DownloadFailed,
    EmptyPayload,
    EmptyContentLoaded,
    JsonParseError,
    ExtractionFailed,
    FileError,
}

impl RawSourceStatus {
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Loaded)
    }
}

stored_object!(RawSource, "raw_data_store", {
    source_uri: String,
    version: i64,
    content_text: Option<String>,
    binary: Option<Vec<u8>>,
    content_hash: Option<String>,
    received_at: DateTime<Utc>,
    status: RawSourceStatus,
    latest: bool
});

impl RawSource {
    pub fn new(source_uri: String, version: i64, content_text: Option<String>, binary: Option<Vec<u8>>, content_hash: Option<String>, status: RawSourceStatus) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            source_uri,
            version,
            content_text,
            binary,
            content_hash,
            received_at: now,
            status,
            latest: true,
        }
    }

    /// The most recent `RawSource` row for a `sourceUri`, i.e. the one with `latest = true`.
    /// Invariant: exactly one row per sourceUri has `latest = true` (spec.md §3, property 1).
    pub async fn find_latest(
        db: &SurrealDbClient,
        source_uri: &str,
    ) -> Result<Option<Self>, AppError> {
        let mut response = db
            .query("SELECT * FROM raw_data_store WHERE source_uri = $uri AND latest = true LIMIT 1")
            .bind(("uri", source_uri.to_owned()))
            .await?;
        let rows: Vec<Self> = response.take(0)?;
        Ok(rows.into_iter().next())
    }

    /// Insert a new version of a source, flipping the previous `latest` row
    /// (if any) to `latest = false` in the same transaction, so the two writes
    /// are serialized as one atomic step per sourceUri (spec.md §5 "Ordering
    /// guarantees").
    pub async fn insert_new_version(
        db: &SurrealDbClient,
        source_uri: &str,
        content_text: Option<String>,
        binary: Option<Vec<u8>>,
        content_hash: Option<String>,
        status: RawSourceStatus,
    ) -> Result<Self, AppError> {
        let previous = Self::find_latest(db, source_uri).await?;
        let next_version = previous.as_ref().map_or(1, |p| p.version + 1);
        let new_row = Self::new(
            source_uri.to_string(),
            next_version,
            content_text,
            binary,
            content_hash,
            status,
        );

        db.query(
            "BEGIN TRANSACTION;
             IF $previous_id != NONE {
                 UPDATE type::thing('raw_data_store', $previous_id) SET latest = false;
             };
             CREATE type::thing('raw_data_store', $new_id) CONTENT $new_row;
             COMMIT TRANSACTION;",
        )
        .bind(("previous_id", previous.map(|p| p.id)))
        .bind(("new_id", new_row.id.clone()))
        .bind(("new_row", new_row.clone()))
        .await?;

        Ok(new_row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_version_has_no_previous() {
        let db = SurrealDbClient::memory("raw_source_test", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        let row = RawSource::insert_new_version(
            &db,
            "api-payload-1",
            Some("{}".into()),
            None,
            Some("abc".into()),
            RawSourceStatus::Loaded,
        )
        .await
        .expect("insert");
        assert_eq!(row.version, 1);
        assert!(row.latest);
    }

    #[tokio::test]
    async fn second_version_flips_previous_latest() {
        let db = SurrealDbClient::memory("raw_source_test2", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        let first = RawSource::insert_new_version(
            &db,
            "api-payload-2",
            Some("{}".into()),
            None,
            Some("v1".into()),
            RawSourceStatus::Loaded,
        )
        .await
        .expect("insert v1");
        let second = RawSource::insert_new_version(
            &db,
            "api-payload-2",
            Some("{\"a\":1}".into()),
            None,
            Some("v2".into()),
            RawSourceStatus::Loaded,
        )
        .await
        .expect("insert v2");

        assert_eq!(second.version, 2);
        let reloaded_first: Option<RawSource> = db.get_item(&first.id).await.expect("get");
        assert!(!reloaded_first.expect("exists").latest);

        let latest = RawSource::find_latest(&db, "api-payload-2")
            .await
            .expect("find latest")
            .expect("some");
        assert_eq!(latest.id, second.id);
    }
}
