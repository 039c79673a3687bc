use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use tokio::sync::Notify;
use tokio::time::sleep;
use tracing::{debug, error, info, trace};

use crate::domain::models::Job;
use crate::error::Result;
use crate::repository::sqlite::JobRepository;

/// Fallback polling interval; catches jobs enqueued by another process.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Delay after a failed claim before retrying
const JOB_FETCH_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Durable FIFO of record ids, stored next to the records themselves.
///
/// Cheap to clone; clones share the wake-up signal.
#[derive(Clone)]
pub struct JobQueue {
    repo: Arc<JobRepository>,
    wakeup: Arc<Notify>,
    poll_interval: Duration,
}

impl JobQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_poll_interval(pool, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll_interval(pool: SqlitePool, poll_interval: Duration) -> Self {
        Self {
            repo: Arc::new(JobRepository::new(pool)),
            wakeup: Arc::new(Notify::new()),
            poll_interval,
        }
    }

    pub async fn enqueue(&self, record_id: &str) -> Result<i64> {
        let job_id = self.repo.insert(record_id).await?;
        debug!(job_id, record_id, "Enqueued analysis job");
        self.wakeup.notify_one();
        Ok(job_id)
    }

    /// Claim the oldest pending job without waiting.
    pub async fn try_dequeue(&self) -> Result<Option<Job>> {
        self.repo.claim_next().await
    }

    /// Wait until a job is available and claim it.
    pub async fn dequeue(&self) -> Job {
        loop {
            match self.repo.claim_next().await {
                Ok(Some(job)) => return job,
                Ok(None) => {
                    trace!("No pending jobs, waiting...");
                    tokio::select! {
                        _ = self.wakeup.notified() => {}
                        _ = sleep(self.poll_interval) => {}
                    }
                }
                Err(e) => {
                    error!("Failed to claim next job: {}", e);
                    sleep(JOB_FETCH_RETRY_DELAY).await;
                }
            }
        }
    }

    /// Remove a handled job for good.
    pub async fn ack(&self, job_id: i64) -> Result<()> {
        self.repo.delete(job_id).await
    }

    /// Release jobs claimed by a previous run that never acked them.
    pub async fn recover(&self) -> Result<u64> {
        let released = self.repo.release_claimed().await?;
        if released > 0 {
            info!(released, "Re-queued unfinished jobs from a previous run");
            self.wakeup.notify_waiters();
        }
        Ok(released)
    }

    pub async fn pending_count(&self) -> Result<i64> {
        self.repo.count_unclaimed().await
    }
}
