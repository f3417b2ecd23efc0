use std::sync::Arc;

use common::storage::db::SurrealDbClient;
use common::utils::config::get_config;
use ingestion_pipeline::{spawn_worker_pool, AiClient, ProgressNotifier};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let config = get_config()?;

    let db = Arc::new(
        SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await?,
    );
    db.ensure_initialized(config.embedding_dimension).await?;

    let ai_client = Arc::new(AiClient::new(&config));
    let progress = Arc::new(ProgressNotifier::new());

    info!(pool_size = config.worker_pool_size, "starting enrichment worker pool");
    let handles = spawn_worker_pool(db, ai_client, progress, config.clone(), config.worker_pool_size);

    futures::future::join_all(handles).await;
    Ok(())
}
