//! SQLite-backed store for analysis records.
//!
//! The `analyses` table keeps one row per URL:
//! - scalar audit fields as plain columns
//! - heading counts and both link lists as JSON text
//! - timestamps as RFC 3339 text
//!
//! Queries are built at runtime so the crate compiles without a live database.

use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, info};

use super::{format_datetime, parse_datetime};
use crate::domain::models::{AnalysisRecord, AnalysisStatus, AuditResult};
use crate::error::{AppError, Result};
use crate::repository::{AnalysisRepository, ListQuery, Page};

const COLUMNS: &str = "id, url, status, html_version, page_title, heading_counts, \
     internal_links, external_links, broken_links, working_links, has_login_form, \
     last_analyzed, error_message, created_at";

/// Matches the filter against title, url, html version and status.
const FILTER_CLAUSE: &str = "(page_title LIKE ?1 ESCAPE '\\' OR url LIKE ?1 ESCAPE '\\' \
     OR html_version LIKE ?1 ESCAPE '\\' OR status LIKE ?1 ESCAPE '\\')";

#[derive(sqlx::FromRow)]
struct AnalysisRow {
    id: String,
    url: String,
    status: String,
    html_version: String,
    page_title: String,
    heading_counts: String,
    internal_links: i64,
    external_links: i64,
    broken_links: String,
    working_links: String,
    has_login_form: bool,
    last_analyzed: String,
    error_message: Option<String>,
    created_at: String,
}

impl TryFrom<AnalysisRow> for AnalysisRecord {
    type Error = AppError;

    fn try_from(row: AnalysisRow) -> Result<Self> {
        Ok(AnalysisRecord {
            id: row.id,
            url: row.url,
            status: row.status.parse()?,
            audit: AuditResult {
                html_version: row.html_version.parse()?,
                page_title: row.page_title,
                heading_counts: serde_json::from_str(&row.heading_counts)?,
                internal_links: row.internal_links.max(0) as u32,
                external_links: row.external_links.max(0) as u32,
                broken_links: serde_json::from_str(&row.broken_links)?,
                working_links: serde_json::from_str(&row.working_links)?,
                has_login_form: row.has_login_form,
            },
            last_analyzed: parse_datetime(&row.last_analyzed)?,
            error_message: row.error_message,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}

/// Escape LIKE wildcards so the filter is matched literally.
fn like_pattern(filter: &str) -> String {
    let escaped = filter
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

pub struct SqliteAnalysisRepository {
    pool: SqlitePool,
}

impl SqliteAnalysisRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch_one_where(&self, column: &str, value: &str) -> Result<Option<AnalysisRecord>> {
        let sql = format!("SELECT {} FROM analyses WHERE {} = ?", COLUMNS, column);
        let row = sqlx::query_as::<_, AnalysisRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        row.map(AnalysisRecord::try_from).transpose()
    }
}

#[async_trait]
impl AnalysisRepository for SqliteAnalysisRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<AnalysisRecord>> {
        self.fetch_one_where("id", id).await
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<AnalysisRecord>> {
        self.fetch_one_where("url", url).await
    }

    async fn save(&self, record: &AnalysisRecord) -> Result<()> {
        let audit = &record.audit;
        sqlx::query(
            r#"
            INSERT INTO analyses (
                id, url, status, html_version, page_title, heading_counts,
                internal_links, external_links, broken_links, working_links,
                has_login_form, last_analyzed, error_message, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                url = excluded.url,
                status = excluded.status,
                html_version = excluded.html_version,
                page_title = excluded.page_title,
                heading_counts = excluded.heading_counts,
                internal_links = excluded.internal_links,
                external_links = excluded.external_links,
                broken_links = excluded.broken_links,
                working_links = excluded.working_links,
                has_login_form = excluded.has_login_form,
                last_analyzed = excluded.last_analyzed,
                error_message = excluded.error_message
            "#,
        )
        .bind(&record.id)
        .bind(&record.url)
        .bind(record.status.as_str())
        .bind(audit.html_version.as_str())
        .bind(&audit.page_title)
        .bind(serde_json::to_string(&audit.heading_counts)?)
        .bind(audit.internal_links as i64)
        .bind(audit.external_links as i64)
        .bind(serde_json::to_string(&audit.broken_links)?)
        .bind(serde_json::to_string(&audit.working_links)?)
        .bind(audit.has_login_form)
        .bind(format_datetime(&record.last_analyzed))
        .bind(&record.error_message)
        .bind(format_datetime(&record.created_at))
        .execute(&self.pool)
        .await?;

        debug!(record_id = %record.id, status = %record.status, "Saved analysis record");
        Ok(())
    }

    async fn find_or_create_by_url(&self, url: &str) -> Result<(AnalysisRecord, bool)> {
        let fresh = AnalysisRecord::new(url);
        let now = format_datetime(&fresh.created_at);

        // ON CONFLICT keeps concurrent submissions of one URL from racing
        // into two rows.
        let inserted = sqlx::query(
            r#"
            INSERT INTO analyses (id, url, status, last_analyzed, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(url) DO NOTHING
            "#,
        )
        .bind(&fresh.id)
        .bind(url)
        .bind(AnalysisStatus::Queued.as_str())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?
        .rows_affected()
            == 1;

        let record = self
            .find_by_url(url)
            .await?
            .ok_or_else(|| AppError::MissingRecord(url.to_string()))?;

        if inserted {
            info!(record_id = %record.id, %url, "Created analysis record");
        }
        Ok((record, inserted))
    }

    async fn list(&self, query: &ListQuery) -> Result<Page<AnalysisRecord>> {
        let filter = query
            .filter
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(like_pattern);
        let where_clause = if filter.is_some() {
            format!("WHERE {}", FILTER_CLAUSE)
        } else {
            String::new()
        };

        let count_sql = format!("SELECT COUNT(*) FROM analyses {}", where_clause);
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(pattern) = &filter {
            count_query = count_query.bind(pattern);
        }
        let total_count = count_query.fetch_one(&self.pool).await?;

        let page_size = query.page_size.max(1);
        let select_sql = format!(
            "SELECT {} FROM analyses {} ORDER BY {} {}, id ASC LIMIT {} OFFSET {}",
            COLUMNS,
            where_clause,
            query.sort_by.column(),
            query.order.keyword(),
            page_size,
            query.page as i64 * page_size as i64,
        );
        let mut select = sqlx::query_as::<_, AnalysisRow>(&select_sql);
        if let Some(pattern) = &filter {
            select = select.bind(pattern);
        }
        let rows = select.fetch_all(&self.pool).await?;

        let data = rows
            .into_iter()
            .map(AnalysisRecord::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok(Page {
            data,
            total_count: total_count.max(0) as u64,
            page: query.page,
            page_size,
        })
    }

    async fn delete_many(&self, ids: &[String]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("DELETE FROM analyses WHERE id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");

        let removed = builder.build().execute(&self.pool).await?.rows_affected();
        info!(requested = ids.len(), removed, "Deleted analysis records");
        Ok(removed)
    }
}
