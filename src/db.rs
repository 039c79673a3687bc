use anyhow::{Context, Result};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::time::Duration;
use tracing::info;

/// Configure SQLite pragmas for every new connection.
async fn configure_sqlite_pragmas(conn: &mut sqlx::SqliteConnection) -> Result<(), sqlx::Error> {
    use sqlx::Executor;

    // WAL: readers (CLI commands) do not block the workers' writes
    conn.execute("PRAGMA journal_mode = WAL").await?;
    conn.execute("PRAGMA synchronous = NORMAL").await?;

    // Several workers write concurrently; wait instead of failing with "database is locked"
    conn.execute("PRAGMA busy_timeout = 5000").await?;

    conn.execute("PRAGMA foreign_keys = ON").await?;

    Ok(())
}

/// Connect to `database_url` and bring the schema up to date.
///
/// Each pooled connection to `sqlite::memory:` is its own database, so
/// in-memory URLs are only useful with a single connection (see the test fixtures).
pub async fn init_db(database_url: &str) -> Result<SqlitePool> {
    info!("Database URL: {}", database_url);

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                configure_sqlite_pragmas(conn).await?;
                Ok(())
            })
        })
        .connect(database_url)
        .await
        .with_context(|| format!("failed to connect to database at {}", database_url))?;

    sqlx::migrate!()
        .run(&pool)
        .await
        .context("failed to run migrations")?;

    info!("Database initialized");
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::AnalysisStatus;
    use crate::repository::{AnalysisRepository, SqliteAnalysisRepository};
    use crate::service::JobQueue;

    #[tokio::test]
    async fn records_and_claimed_jobs_survive_a_restart() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("auditor.db").display());

        let record_id = {
            let pool = init_db(&url).await.unwrap();
            let repo = SqliteAnalysisRepository::new(pool.clone());
            let queue = JobQueue::new(pool.clone());
            let (record, _) = repo.find_or_create_by_url("https://a.test").await.unwrap();
            queue.enqueue(&record.id).await.unwrap();
            // Claimed but never acked: the process "dies" here.
            tokio_test::assert_ok!(queue.try_dequeue().await);
            pool.close().await;
            record.id
        };

        let pool = init_db(&url).await.unwrap();
        let repo = SqliteAnalysisRepository::new(pool.clone());
        let queue = JobQueue::new(pool.clone());

        let record = repo.find_by_id(&record_id).await.unwrap().unwrap();
        assert_eq!(record.status, AnalysisStatus::Queued);

        assert_eq!(queue.pending_count().await.unwrap(), 0);
        assert_eq!(queue.recover().await.unwrap(), 1);
        let job = queue.try_dequeue().await.unwrap().unwrap();
        assert_eq!(job.record_id, record_id);
        assert_eq!(job.deliveries, 2);
        pool.close().await;
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("twice.db").display());
        init_db(&url).await.unwrap().close().await;
        tokio_test::assert_ok!(init_db(&url).await).close().await;
    }
}
