use chrono::{DateTime, Utc};

use crate::error::{AppError, Result};

mod analysis_repository;
mod job_repository;

pub use analysis_repository::SqliteAnalysisRepository;
pub use job_repository::JobRepository;

/// Timestamps are stored as RFC 3339 text.
pub(crate) fn parse_datetime(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::database(format!("bad timestamp '{}': {}", raw, e)))
}

pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}
