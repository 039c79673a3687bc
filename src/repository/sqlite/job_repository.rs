//! Rows of the `analysis_jobs` work queue.

use chrono::Utc;
use sqlx::SqlitePool;

use super::format_datetime;
use crate::domain::models::Job;
use crate::error::Result;

pub struct JobRepository {
    pool: SqlitePool,
}

impl JobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, record_id: &str) -> Result<i64> {
        let id = sqlx::query("INSERT INTO analysis_jobs (record_id, enqueued_at) VALUES (?, ?)")
            .bind(record_id)
            .bind(format_datetime(&Utc::now()))
            .execute(&self.pool)
            .await?
            .last_insert_rowid();
        Ok(id)
    }

    /// Claims the oldest unclaimed row in one statement, so two workers can
    /// never be handed the same row.
    pub async fn claim_next(&self) -> Result<Option<Job>> {
        let job = sqlx::query_as::<_, Job>(
            r#"
            UPDATE analysis_jobs
            SET claimed_at = ?, deliveries = deliveries + 1
            WHERE id = (
                SELECT id FROM analysis_jobs
                WHERE claimed_at IS NULL
                ORDER BY id
                LIMIT 1
            )
            RETURNING id, record_id, deliveries
            "#,
        )
        .bind(format_datetime(&Utc::now()))
        .fetch_optional(&self.pool)
        .await?;
        Ok(job)
    }

    pub async fn delete(&self, job_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM analysis_jobs WHERE id = ?")
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Returns every claimed row to the unclaimed pool.
    pub async fn release_claimed(&self) -> Result<u64> {
        let released =
            sqlx::query("UPDATE analysis_jobs SET claimed_at = NULL WHERE claimed_at IS NOT NULL")
                .execute(&self.pool)
                .await?
                .rows_affected();
        Ok(released)
    }

    pub async fn count_unclaimed(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM analysis_jobs WHERE claimed_at IS NULL",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}
