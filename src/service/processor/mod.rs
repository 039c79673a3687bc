//! Job processing: durable queue, worker pool and status fan-out.

mod queue;
mod reporter;

pub use queue::{JobQueue, DEFAULT_POLL_INTERVAL};
pub use reporter::{BroadcastNotifier, Notifier, NotifierEvent, STATUS_EVENT};

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::domain::models::{AnalysisRecord, Job, StatusEvent};
use crate::repository::AnalysisRepository;
use crate::service::engine::Analyzer;

/// What happened to one delivered job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Record finished as `done`.
    Completed,
    /// Record finished as `error`.
    Failed,
    /// Record was gone, or the job was a redelivery of a finished run; acked without running.
    Skipped,
    /// Record could not be loaded; job left claimed for the next recovery.
    Abandoned,
}

/// Runs a single job end to end. Shared by every worker of a pool.
pub struct JobProcessor {
    queue: JobQueue,
    repository: Arc<dyn AnalysisRepository>,
    analyzer: Arc<dyn Analyzer>,
    notifier: Arc<dyn Notifier>,
    in_flight: DashMap<String, usize>,
}

impl JobProcessor {
    pub fn new(
        queue: JobQueue,
        repository: Arc<dyn AnalysisRepository>,
        analyzer: Arc<dyn Analyzer>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            queue,
            repository,
            analyzer,
            notifier,
            in_flight: DashMap::new(),
        }
    }

    /// Processes one job through its full lifecycle. Never fails: every
    /// error ends up in the record, in the log, or both.
    pub async fn process_job(&self, job: Job) -> JobOutcome {
        let timer = Instant::now();

        let mut record = match self.repository.find_by_id(&job.record_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                warn!(job_id = job.id, record_id = %job.record_id, "Record no longer exists, dropping job");
                self.ack(&job).await;
                return JobOutcome::Skipped;
            }
            Err(e) => {
                error!(job_id = job.id, record_id = %job.record_id, "Failed to load record: {}", e);
                return JobOutcome::Abandoned;
            }
        };

        if record.status.is_terminal() {
            // A redelivered job whose run was already stored is a duplicate.
            // A first delivery is a re-run whose `queued` was overwritten by an
            // earlier in-flight run, so it still has to run.
            if job.is_redelivery() {
                info!(
                    job_id = job.id,
                    record_id = %record.id,
                    status = %record.status,
                    "Record already processed, skipping duplicate delivery"
                );
                self.ack(&job).await;
                return JobOutcome::Skipped;
            }
            debug!(
                job_id = job.id,
                record_id = %record.id,
                status = %record.status,
                "Re-run request overtaken by an earlier run, queuing again"
            );
            record.mark_queued();
        }

        let _guard = InFlight::enter(&self.in_flight, &record.id);

        if job.is_redelivery() {
            warn!(job_id = job.id, record_id = %record.id, deliveries = job.deliveries, "Redelivered job");
        }

        let result = match self.start(&mut record).await {
            Ok(()) => self
                .analyzer
                .analyze(&record.url)
                .await
                .map_err(|e| e.to_string()),
            Err(message) => Err(message),
        };

        let outcome = match result {
            Ok(audit) => match record.complete(audit, Utc::now()) {
                Ok(()) => JobOutcome::Completed,
                Err(e) => {
                    error!(record_id = %record.id, "Cannot complete record: {}", e);
                    JobOutcome::Failed
                }
            },
            Err(message) => {
                warn!(record_id = %record.id, url = %record.url, "Analysis failed: {}", message);
                if let Err(e) = record.fail(message) {
                    error!(record_id = %record.id, "Cannot fail record: {}", e);
                }
                JobOutcome::Failed
            }
        };

        // The snapshot goes out even when the save fails; it may then be
        // ahead of what is stored.
        if let Err(e) = self.repository.save(&record).await {
            error!(record_id = %record.id, "Failed to persist final state: {}", e);
        }
        self.notifier
            .emit(STATUS_EVENT, &StatusEvent::snapshot(&record));
        self.ack(&job).await;

        info!(
            job_id = job.id,
            record_id = %record.id,
            status = %record.status,
            "Job finished in {}ms",
            timer.elapsed().as_millis()
        );
        outcome
    }

    /// Moves the record to running, persists it and announces it.
    async fn start(&self, record: &mut AnalysisRecord) -> Result<(), String> {
        record.mark_running().map_err(|e| e.to_string())?;
        if let Err(e) = self.repository.save(record).await {
            error!(record_id = %record.id, "Failed to persist running status: {}", e);
            return Err(format!("Failed to persist running status: {}", e));
        }
        self.notifier
            .emit(STATUS_EVENT, &StatusEvent::transition(record));
        Ok(())
    }

    async fn ack(&self, job: &Job) {
        if let Err(e) = self.queue.ack(job.id).await {
            error!(job_id = job.id, "Failed to ack job: {}", e);
        }
    }

    async fn run_worker(self: Arc<Self>, worker: usize, shutdown: CancellationToken) {
        debug!(worker, "Worker started");
        loop {
            let job = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                job = self.queue.dequeue() => job,
            };
            info!(
                worker,
                job_id = job.id,
                record_id = %job.record_id,
                "Processing job"
            );
            self.process_job(job).await;
        }
        debug!(worker, "Worker stopped");
    }
}

/// Counts concurrent jobs per record for the lifetime of one job.
struct InFlight<'a> {
    map: &'a DashMap<String, usize>,
    record_id: String,
}

impl<'a> InFlight<'a> {
    fn enter(map: &'a DashMap<String, usize>, record_id: &str) -> Self {
        let concurrent = {
            let mut count = map.entry(record_id.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        if concurrent > 1 {
            warn!(
                record_id,
                concurrent, "Record is already being processed; last write wins"
            );
        }
        Self {
            map,
            record_id: record_id.to_string(),
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Some(mut count) = self.map.get_mut(&self.record_id) {
            *count = count.saturating_sub(1);
        }
        self.map.remove_if(&self.record_id, |_, count| *count == 0);
    }
}

/// Fixed-size pool of workers draining one queue.
pub struct WorkerPool;

impl WorkerPool {
    pub fn start(processor: Arc<JobProcessor>, workers: usize) -> WorkerPoolHandle {
        let workers = workers.max(1);
        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();

        for worker in 0..workers {
            tracker.spawn(processor.clone().run_worker(worker, shutdown.clone()));
        }
        tracker.close();
        info!(workers, "Worker pool started");

        WorkerPoolHandle { shutdown, tracker }
    }
}

pub struct WorkerPoolHandle {
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl WorkerPoolHandle {
    /// Stop taking new jobs and wait for the ones in progress to finish.
    pub async fn shutdown(self) {
        info!("Shutting down worker pool...");
        self.shutdown.cancel();
        self.tracker.wait().await;
        info!("Worker pool stopped");
    }
}
