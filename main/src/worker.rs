use std::sync::Arc;

use common::{
    llm::{GenerationClient, OllamaCloudClient},
    storage::{db::SurrealDbClient, job_store::JobStore, types::generation_job::GenerationJob},
    utils::config::get_config,
};
use generation_pipeline::{GenerationPipeline, QueueWorker, WorkerConfig};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
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
    db.ensure_initialized().await?;

    let requeued = GenerationJob::requeue_interrupted(&db).await?;
    if !requeued.is_empty() {
        warn!(count = requeued.len(), "requeued jobs interrupted by a previous run");
    }
    let unfinished = GenerationJob::get_unfinished_jobs(&db).await?;
    info!(pending = unfinished.len(), "generation queue loaded");

    let client: Arc<dyn GenerationClient> = Arc::new(OllamaCloudClient::from_config(&config)?);
    let health = client.check_health().await;
    if health.connected {
        info!(
            model = client.model(),
            model_available = health.model_available,
            latency_ms = health.latency_ms,
            "generation provider reachable"
        );
    } else {
        warn!(
            error = health.error.as_deref().unwrap_or("unknown"),
            "generation provider unavailable; jobs stay pending"
        );
    }

    let pipeline = Arc::new(GenerationPipeline::new(Arc::clone(&client)));
    let mut worker = QueueWorker::new(
        db as Arc<dyn JobStore>,
        client,
        pipeline,
        WorkerConfig::from_app_config(&config),
    );

    worker.start();
    if !worker.is_running() {
        info!("generation worker disabled by configuration");
        return Ok(());
    }

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested; waiting for the current cycle");
    worker.shutdown().await;

    Ok(())
}
