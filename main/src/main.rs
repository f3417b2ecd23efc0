use std::sync::Arc;

use common::storage::db::SurrealDbClient;
use common::storage::store::StorageManager;
use common::utils::config::get_config;
use ingestion_pipeline::{spawn_worker_pool, AiClient, ProgressNotifier};
use main::routes::{router, AppState};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Combined process: runs the HTTP surface (spec.md §6) and the enrichment
/// worker pool (spec.md §4.7) side by side, sharing one database connection
/// and AI client.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
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

    let storage = Arc::new(StorageManager::new(&config).await?);
    let ai_client = Arc::new(AiClient::new(&config));
    let progress = Arc::new(ProgressNotifier::new());

    info!(pool_size = config.worker_pool_size, "starting enrichment worker pool");
    let worker_handles =
        spawn_worker_pool(db.clone(), ai_client.clone(), progress.clone(), config.clone(), config.worker_pool_size);

    let app = router(AppState { db, ai_client, storage, progress, config: config.clone() });

    info!("Starting server listening on 0.0.0.0:{}", config.http_port);
    let serve_address = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(serve_address).await?;

    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(err) = result {
                error!(error = %err, "server exited with an error");
            }
        }
        _ = futures::future::join_all(worker_handles) => {
            error!("enrichment worker pool exited unexpectedly");
        }
    }

    Ok(())
}
