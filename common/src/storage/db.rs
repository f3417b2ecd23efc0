use crate::error::AppError;

use super::types::StoredObject;
use futures::Stream;
use std::{ops::Deref, sync::Arc};
use surrealdb::{
    engine::any::{connect, Any},
    opt::auth::Root,
    Error, Notification, Surreal,
};

#[derive(Clone)]
pub struct SurrealDbClient {
    pub client: Surreal<Any>,
}
pub trait ProvidesDb {
    fn db(&self) -> &Arc<SurrealDbClient>;
}

impl SurrealDbClient {
    /// Initialize a new database client, signed in and bound to a namespace/database.
    pub async fn new(
        address: &str,
        username: &str,
        password: &str,
        namespace: &str,
        database: &str,
    ) -> Result<Self, Error> {
        let db = connect(address).await?;

        db.signin(Root { username, password }).await?;

        db.use_ns(namespace).use_db(database).await?;

        Ok(SurrealDbClient { client: db })
    }

    pub async fn ensure_initialized(&self, vector_dimension: usize) -> Result<(), AppError> {
        self.build_indexes(vector_dimension).await?;
        Ok(())
    }

    /// Indexes for every table named in spec.md §6 "Persisted schemas".
    pub async fn build_indexes(&self, vector_dimension: usize) -> Result<(), Error> {
        self.client
            .query("DEFINE INDEX IF NOT EXISTS idx_raw_source_uri ON raw_data_store FIELDS source_uri")
            .await?;
        self.client
            .query(
                "DEFINE INDEX IF NOT EXISTS idx_raw_source_uri_latest ON raw_data_store FIELDS source_uri, latest",
            )
            .await?;

        self.client
            .query("DEFINE INDEX IF NOT EXISTS idx_cleansed_source_uri ON cleansed_data_store FIELDS source_uri")
            .await?;
        self.client
            .query(
                "DEFINE INDEX IF NOT EXISTS idx_cleansed_raw_source ON cleansed_data_store FIELDS raw_source_id",
            )
            .await?;

        self.client
            .query(
                "DEFINE INDEX IF NOT EXISTS idx_content_hash_composite ON content_hashes \
                 FIELDS source_path, item_type, usage_path UNIQUE",
            )
            .await?;

        self.client
            .query(
                "DEFINE INDEX IF NOT EXISTS idx_enriched_batch_version ON enriched_content_elements \
                 FIELDS cleansed_data_id, version",
            )
            .await?;

        self.client
            .query(
                "DEFINE INDEX IF NOT EXISTS idx_consolidated_dedup ON consolidated_enriched_sections \
                 FIELDS section_uri, section_path, original_field_name, version",
            )
            .await?;

        self.client
            .query("DEFINE INDEX IF NOT EXISTS idx_chunk_section ON content_chunks FIELDS section_id")
            .await?;
        let embedding_index = format!(
            "DEFINE INDEX IF NOT EXISTS idx_chunk_vector ON content_chunks FIELDS vector HNSW DIMENSION {vector_dimension}"
        );
        self.client.query(embedding_index).await?;

        self.client
            .query("DEFINE INDEX IF NOT EXISTS idx_job_tracker_status ON job_tracker FIELDS status")
            .await?;

        self.client
            .query(
                "DEFINE INDEX IF NOT EXISTS idx_queue_visibility ON enrichment_queue FIELDS visible_at",
            )
            .await?;

        Ok(())
    }

    pub async fn rebuild_indexes(&self, vector_dimension: usize) -> Result<(), Error> {
        let rebuild = format!("REBUILD INDEX IF EXISTS idx_chunk_vector ON content_chunks");
        self.client.query(rebuild).await?;
        let _ = vector_dimension;
        Ok(())
    }

    pub async fn drop_table<T>(&self) -> Result<Vec<T>, Error>
    where
        T: StoredObject + Send + Sync + 'static,
    {
        self.client.delete(T::table_name()).await
    }

    /// Store an object in SurrealDB. Requires the struct to implement `StoredObject`.
    pub async fn store_item<T>(&self, item: T) -> Result<Option<T>, Error>
    where
        T: StoredObject + Send + Sync + 'static,
    {
        self.client
            .create((T::table_name(), item.get_id()))
            .content(item)
            .await
    }

    /// Retrieve all objects from a table. Requires the struct to implement `StoredObject`.
    pub async fn get_all_stored_items<T>(&self) -> Result<Vec<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.select(T::table_name()).await
    }

    /// Retrieve a single object by its id. Requires the struct to implement `StoredObject`.
    pub async fn get_item<T>(&self, id: &str) -> Result<Option<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.select((T::table_name(), id)).await
    }

    /// Delete a single object by its id. Requires the struct to implement `StoredObject`.
    pub async fn delete_item<T>(&self, id: &str) -> Result<Option<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.delete((T::table_name(), id)).await
    }

    /// Listen to a table for live updates. Requires the struct to implement `StoredObject`.
    pub async fn listen<T>(
        &self,
    ) -> Result<impl Stream<Item = Result<Notification<T>, Error>>, Error>
    where
        T: for<'de> StoredObject + std::marker::Unpin,
    {
        self.client.select(T::table_name()).live().await
    }
}

impl Deref for SurrealDbClient {
    type Target = Surreal<Any>;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl SurrealDbClient {
    /// Create an in-memory SurrealDB client for testing.
    pub async fn memory(namespace: &str, database: &str) -> Result<Self, Error> {
        let db = connect("mem://").await?;

        db.use_ns(namespace).use_db(database).await?;

        Ok(SurrealDbClient { client: db })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stored_object;
    use chrono::Utc;
    use uuid::Uuid;

    stored_object!(Dummy, "dummy", {
        name: String
    });

    #[tokio::test]
    async fn test_initialization_and_crud() {
        let namespace = "test_ns";
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory(namespace, database)
            .await
            .expect("Failed to start in-memory surrealdb");

        db.ensure_initialized(1536)
            .await
            .expect("Failed to initialize schema");

        let dummy = Dummy {
            id: "abc".to_string(),
            name: "first".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let stored = db.store_item(dummy.clone()).await.expect("Failed to store");
        assert!(stored.is_some());

        let fetched = db
            .get_item::<Dummy>(&dummy.id)
            .await
            .expect("Failed to fetch");
        assert_eq!(fetched, Some(dummy.clone()));

        let all = db
            .get_all_stored_items::<Dummy>()
            .await
            .expect("Failed to fetch all");
        assert!(all.contains(&dummy));

        let deleted = db
            .delete_item::<Dummy>(&dummy.id)
            .await
            .expect("Failed to delete");
        assert_eq!(deleted, Some(dummy));

        let fetch_post = db
            .get_item::<Dummy>("abc")
            .await
            .expect("Failed fetch post delete");
        assert!(fetch_post.is_none());
    }

    #[tokio::test]
    async fn test_build_indexes() {
        let namespace = "test_ns";
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory(namespace, database)
            .await
            .expect("Failed to start in-memory surrealdb");

        db.build_indexes(1536).await.expect("Failed to build indexes");
    }
}
