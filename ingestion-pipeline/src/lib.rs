#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod ai_client;
pub mod chunker;
pub mod cleanser;
pub mod consolidator;
pub mod extractor;
pub mod orchestrator;
pub mod persister;
pub mod progress;
pub mod rate_limiter;
pub mod vector_writer;
pub mod worker;

use std::sync::Arc;

use common::storage::db::SurrealDbClient;
use tokio::time::{sleep, Duration};
use tracing::error;
use uuid::Uuid;

pub use ai_client::AiClient;
pub use orchestrator::{IngestOutcome, IngestionOrchestrator};
pub use progress::ProgressNotifier;
pub use worker::EnrichmentWorker;

/// Claim-loop entry point for one enrichment worker (spec.md §4.7/§6
/// "worker pool"). Spawn one of these per configured pool slot.
pub async fn run_worker_loop(
    worker: Arc<EnrichmentWorker>,
) -> Result<(), Box<dyn std::error::Error>> {
    let worker_id = format!("enrichment-worker-{}", Uuid::new_v4());
    let idle_backoff = Duration::from_millis(500);

    loop {
        match worker.run_once().await {
            Ok(true) => {}
            Ok(false) => sleep(idle_backoff).await,
            Err(err) => {
                error!(%worker_id, error = %err, "enrichment worker iteration failed");
                sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

/// Convenience wiring used by the binary crate: run a pool of
/// `worker_pool_size` enrichment workers sharing one db/AI client/notifier.
pub fn spawn_worker_pool(
    db: Arc<SurrealDbClient>,
    ai_client: Arc<AiClient>,
    progress: Arc<ProgressNotifier>,
    config: common::utils::config::AppConfig,
    pool_size: usize,
) -> Vec<tokio::task::JoinHandle<()>> {
    (0..pool_size.max(1))
        .map(|_| {
            let worker = Arc::new(EnrichmentWorker::new(
                db.clone(),
                ai_client.clone(),
                progress.clone(),
                config.clone(),
            ));
            tokio::spawn(async move {
                if let Err(err) = run_worker_loop(worker).await {
                    error!(error = %err, "enrichment worker loop exited");
                }
            })
        })
        .collect()
}
