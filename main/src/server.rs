use std::sync::Arc;

use common::storage::db::SurrealDbClient;
use common::storage::store::StorageManager;
use common::utils::config::get_config;
use ingestion_pipeline::{AiClient, ProgressNotifier};
use main::routes::{router, AppState};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    // Get config
    let config = get_config()?;

    // Set up router state
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

    let storage = Arc::new(StorageManager::new(&config).await?);
    let ai_client = Arc::new(AiClient::new(&config));
    let progress = Arc::new(ProgressNotifier::new());

    let app = router(AppState { db, ai_client, storage, progress, config: config.clone() });

    info!("Starting server listening on 0.0.0.0:{}", config.http_port);
    let serve_address = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(serve_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
