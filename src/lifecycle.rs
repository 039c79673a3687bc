//! Application lifecycle: logging, wiring and shutdown of the pipeline.

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::db;
use crate::repository::SqliteAnalysisRepository;
use crate::service::{
    AnalysisEngine, AnalysisService, BroadcastNotifier, JobProcessor, JobQueue, WorkerPool,
    WorkerPoolHandle,
};

const DEFAULT_LOG_FILTER: &str = "info,sqlx=warn,page_auditor=debug";

/// Initialize logging with tracing_subscriber. `RUST_LOG` replaces the default filter.
pub fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .compact()
        .with_target(false)
        .with_ansi(true)
        .init();
}

/// Database, queue, store and submission service shared by every command.
pub struct App {
    pub pool: SqlitePool,
    pub queue: JobQueue,
    pub repository: Arc<SqliteAnalysisRepository>,
    pub notifier: Arc<BroadcastNotifier>,
    pub service: AnalysisService,
}

impl App {
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::init_db(&config.database_url).await?;
        let queue = JobQueue::with_poll_interval(pool.clone(), config.poll_interval());
        let repository = Arc::new(SqliteAnalysisRepository::new(pool.clone()));
        let notifier = Arc::new(BroadcastNotifier::default());
        let service = AnalysisService::new(repository.clone(), queue.clone(), notifier.clone());

        Ok(Self {
            pool,
            queue,
            repository,
            notifier,
            service,
        })
    }

    /// Release jobs orphaned by a previous run, then start the worker pool.
    pub async fn start_workers(&self, config: &Config) -> Result<WorkerPoolHandle> {
        let recovered = self
            .queue
            .recover()
            .await
            .context("failed to recover unfinished jobs")?;
        let pending = self.queue.pending_count().await?;

        let engine = AnalysisEngine::from_settings(&config.engine_settings())
            .context("failed to build analysis engine")?;
        info!(
            renderer = engine.renderer_name(),
            workers = config.worker_count(),
            pending,
            recovered,
            "Starting analysis pipeline"
        );

        let processor = Arc::new(JobProcessor::new(
            self.queue.clone(),
            self.repository.clone(),
            Arc::new(engine),
            self.notifier.clone(),
        ));
        Ok(WorkerPool::start(processor, config.worker_count()))
    }

    /// Log every status event until the notifier goes away.
    pub fn spawn_event_logger(&self) -> JoinHandle<()> {
        let mut events = self.notifier.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => info!(
                        record_id = %event.payload.id,
                        url = %event.payload.url,
                        status = %event.payload.status,
                        error = event.payload.error_message.as_deref().unwrap_or(""),
                        "{}",
                        event.name
                    ),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Event logger fell behind")
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// Gracefully shutdown the pool, then close the database.
    pub async fn shutdown(self, workers: Option<WorkerPoolHandle>) {
        if let Some(workers) = workers {
            workers.shutdown().await;
        }
        self.pool.close().await;
        info!("Shut down cleanly");
    }
}
