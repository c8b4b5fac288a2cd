use std::sync::Arc;

use anyhow::Context;
use taskforge_core::store::{MemoryTaskStore, TaskStore};
use taskforge_engine::{EngineConfig, Orchestrator};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod handlers;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskforge_worker=debug,taskforge_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = EngineConfig::from_env();
    tracing::info!(
        workers = config.worker_count,
        task_timeout_secs = config.task_timeout.as_secs(),
        "Loaded engine configuration"
    );

    // --- Task store ---
    let store: Arc<dyn TaskStore> = match std::env::var("DATABASE_URL") {
        Ok(database_url) => {
            let pool = taskforge_db::create_pool(&database_url)
                .await
                .context("Failed to connect to database")?;
            tracing::info!("Database connection pool created");

            taskforge_db::health_check(&pool)
                .await
                .context("Database health check failed")?;
            taskforge_db::run_migrations(&pool)
                .await
                .context("Failed to run database migrations")?;
            tracing::info!("Database migrations applied");

            Arc::new(taskforge_db::PgTaskStore::new(pool))
        }
        Err(_) => {
            tracing::warn!("DATABASE_URL not set, tasks will not survive a restart");
            Arc::new(MemoryTaskStore::new())
        }
    };

    // --- Orchestrator ---
    let orchestrator = Orchestrator::new(store, config);
    handlers::register_all(&orchestrator).await;

    let mut events = orchestrator.subscribe();
    let event_log = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => tracing::debug!(
                    event_type = %event.event_type,
                    task_id = %event.task_id,
                    status = %event.status,
                    "Task event"
                ),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Task event log lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    orchestrator
        .start()
        .await
        .context("Failed to start task orchestrator")?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received");

    orchestrator.stop().await;
    let stats = orchestrator.statistics().await;
    tracing::info!(
        total = stats.total,
        completed = stats.completed,
        failed = stats.failed,
        success_rate = stats.success_rate,
        "Final task statistics"
    );

    event_log.abort();
    Ok(())
}
