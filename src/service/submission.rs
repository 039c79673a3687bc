//! Submission boundary: everything that puts records into the queue or
//! reads them back out.

use std::sync::Arc;

use tracing::{info, warn};
use url::Url;

use crate::domain::models::{AnalysisRecord, StatusEvent};
use crate::error::{AppError, Result};
use crate::repository::{AnalysisRepository, ListQuery, Page};
use crate::service::processor::{JobQueue, Notifier, STATUS_EVENT};

/// Accept only absolute http(s) URLs with a host.
pub fn validate_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation("URL is required"));
    }
    let url = Url::parse(trimmed)
        .map_err(|e| AppError::validation(format!("'{}' is not a valid URL: {}", trimmed, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(AppError::validation(format!(
            "unsupported scheme '{}', expected http or https",
            url.scheme()
        )));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(AppError::validation(format!("'{}' has no host", trimmed)));
    }
    Ok(url)
}

pub struct AnalysisService {
    repository: Arc<dyn AnalysisRepository>,
    queue: JobQueue,
    notifier: Arc<dyn Notifier>,
}

impl AnalysisService {
    pub fn new(
        repository: Arc<dyn AnalysisRepository>,
        queue: JobQueue,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            repository,
            queue,
            notifier,
        }
    }

    /// Queue an audit of `url`, reusing the record if the URL was seen before.
    ///
    /// The URL is stored exactly as submitted (trimmed), so `https://a.test`
    /// and `https://a.test/` are two records.
    pub async fn submit(&self, url: &str) -> Result<AnalysisRecord> {
        validate_url(url)?;
        let url = url.trim();

        let (mut record, created) = self.repository.find_or_create_by_url(url).await?;
        if !created {
            record.mark_queued();
            self.repository.save(&record).await?;
        }
        self.enqueue(&record).await?;

        info!(record_id = %record.id, %url, created, "Analysis submitted");
        Ok(record)
    }

    /// Re-queue existing records. Unknown ids are skipped.
    pub async fn rerun(&self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Err(AppError::validation("at least one id is required"));
        }

        let mut queued = 0;
        for id in ids {
            let Some(mut record) = self.repository.find_by_id(id).await? else {
                warn!(record_id = %id, "Cannot re-run unknown record");
                continue;
            };
            record.mark_queued();
            self.repository.save(&record).await?;
            self.enqueue(&record).await?;
            queued += 1;
        }

        info!(requested = ids.len(), queued, "Re-run requested");
        Ok(queued)
    }

    pub async fn get(&self, id: &str) -> Result<AnalysisRecord> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::MissingRecord(id.to_string()))
    }

    pub async fn list(&self, query: &ListQuery) -> Result<Page<AnalysisRecord>> {
        self.repository.list(query).await
    }

    /// Bulk delete. Pending jobs for these ids are dropped by the workers.
    pub async fn delete(&self, ids: &[String]) -> Result<u64> {
        if ids.is_empty() {
            return Err(AppError::validation("at least one id is required"));
        }
        self.repository.delete_many(ids).await
    }

    /// Announces `queued` only once the job row exists.
    async fn enqueue(&self, record: &AnalysisRecord) -> Result<()> {
        self.queue.enqueue(&record.id).await?;
        self.notifier
            .emit(STATUS_EVENT, &StatusEvent::transition(record));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::AnalysisStatus;
    use crate::repository::SqliteAnalysisRepository;
    use crate::test_utils::fixtures;
    use crate::test_utils::mocks::RecordingNotifier;
    use chrono::Utc;

    struct Harness {
        service: AnalysisService,
        repo: Arc<SqliteAnalysisRepository>,
        queue: JobQueue,
        notifier: Arc<RecordingNotifier>,
    }

    async fn harness() -> Harness {
        let pool = fixtures::setup_test_db().await;
        let repo = Arc::new(SqliteAnalysisRepository::new(pool.clone()));
        let queue = JobQueue::new(pool);
        let notifier = Arc::new(RecordingNotifier::default());
        let service = AnalysisService::new(repo.clone(), queue.clone(), notifier.clone());
        Harness {
            service,
            repo,
            queue,
            notifier,
        }
    }

    #[test]
    fn url_validation() {
        assert!(validate_url("https://example.com/a?b=c").is_ok());
        assert!(validate_url("  http://example.com  ").is_ok());
        for bad in ["", "   ", "example.com", "ftp://example.com", "mailto:a@b.c", "http://"] {
            let err = validate_url(bad).unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "{:?} accepted", bad);
        }
    }

    #[tokio::test]
    async fn invalid_submission_creates_nothing() {
        let h = harness().await;
        let err = h.service.submit("not a url").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(h.queue.pending_count().await.unwrap(), 0);
        assert_eq!(
            h.service.list(&ListQuery::default()).await.unwrap().total_count,
            0
        );
        assert!(h.notifier.events().is_empty());
    }

    #[tokio::test]
    async fn submit_creates_queues_and_notifies() {
        let h = harness().await;
        let record = h.service.submit(" https://a.test ").await.unwrap();

        assert_eq!(record.url, "https://a.test");
        assert_eq!(record.status, AnalysisStatus::Queued);
        let job = h.queue.try_dequeue().await.unwrap().unwrap();
        assert_eq!(job.record_id, record.id);
        assert_eq!(h.notifier.names(), vec![STATUS_EVENT.to_string()]);
        assert_eq!(h.notifier.events()[0].status, AnalysisStatus::Queued);
    }

    #[tokio::test]
    async fn resubmission_reuses_record_and_clears_error() {
        let h = harness().await;
        let first = h.service.submit("https://a.test").await.unwrap();

        let mut failed = first.clone();
        failed.mark_running().unwrap();
        failed.complete(fixtures::sample_audit(), Utc::now()).unwrap();
        failed.mark_queued();
        failed.mark_running().unwrap();
        failed.fail("dns failure").unwrap();
        h.repo.save(&failed).await.unwrap();

        let second = h.service.submit("https://a.test").await.unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.status, AnalysisStatus::Queued);
        assert!(second.error_message.is_none());
        assert_eq!(second.audit, fixtures::sample_audit());

        let stored = h.service.get(&first.id).await.unwrap();
        assert_eq!(stored.status, AnalysisStatus::Queued);
        assert_eq!(h.queue.pending_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn rerun_skips_unknown_ids() {
        let h = harness().await;
        let a = h.service.submit("https://a.test").await.unwrap();
        let b = h.service.submit("https://b.test").await.unwrap();

        let ids = vec![a.id.clone(), "ghost".to_string(), b.id.clone()];
        assert_eq!(h.service.rerun(&ids).await.unwrap(), 2);
        assert_eq!(h.queue.pending_count().await.unwrap(), 4);

        let err = h.service.rerun(&[]).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn failed_enqueue_announces_nothing() {
        let pool = fixtures::setup_test_db().await;
        let repo = Arc::new(SqliteAnalysisRepository::new(pool.clone()));
        let notifier = Arc::new(RecordingNotifier::default());
        let service = AnalysisService::new(repo, JobQueue::new(pool.clone()), notifier.clone());

        sqlx::query("DROP TABLE analysis_jobs")
            .execute(&pool)
            .await
            .unwrap();

        let err = service.submit("https://a.test").await.unwrap_err();
        assert!(matches!(err, AppError::Database(_)), "{:?}", err);
        assert!(notifier.events().is_empty());
    }

    #[tokio::test]
    async fn get_and_delete() {
        let h = harness().await;
        let a = h.service.submit("https://a.test").await.unwrap();

        assert!(matches!(
            h.service.get("ghost").await.unwrap_err(),
            AppError::MissingRecord(_)
        ));
        assert!(matches!(
            h.service.delete(&[]).await.unwrap_err(),
            AppError::Validation(_)
        ));

        assert_eq!(h.service.delete(&[a.id.clone()]).await.unwrap(), 1);
        assert!(h.service.get(&a.id).await.is_err());
    }
}
