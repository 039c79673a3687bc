use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::models::AnalysisRecord;
use crate::error::{AppError, Result};

pub mod sqlite;

pub use sqlite::SqliteAnalysisRepository;

pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Persistence for analysis records. `url` is the natural key.
#[async_trait]
pub trait AnalysisRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<AnalysisRecord>>;

    async fn find_by_url(&self, url: &str) -> Result<Option<AnalysisRecord>>;

    /// Insert or overwrite the whole record.
    async fn save(&self, record: &AnalysisRecord) -> Result<()>;

    /// Returns the record for `url`, creating a queued one if none exists.
    /// The flag is `true` when this call created it.
    async fn find_or_create_by_url(&self, url: &str) -> Result<(AnalysisRecord, bool)>;

    async fn list(&self, query: &ListQuery) -> Result<Page<AnalysisRecord>>;

    /// Returns the number of rows removed.
    async fn delete_many(&self, ids: &[String]) -> Result<u64>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    LastAnalyzed,
    CreatedAt,
    Url,
    PageTitle,
    HtmlVersion,
    Status,
    InternalLinks,
    ExternalLinks,
}

impl SortField {
    pub(crate) fn column(&self) -> &'static str {
        match self {
            SortField::LastAnalyzed => "last_analyzed",
            SortField::CreatedAt => "created_at",
            SortField::Url => "url",
            SortField::PageTitle => "page_title",
            SortField::HtmlVersion => "html_version",
            SortField::Status => "status",
            SortField::InternalLinks => "internal_links",
            SortField::ExternalLinks => "external_links",
        }
    }
}

impl FromStr for SortField {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let field = match s {
            "lastAnalyzed" | "last_analyzed" => SortField::LastAnalyzed,
            "createdAt" | "created_at" => SortField::CreatedAt,
            "url" => SortField::Url,
            "pageTitle" | "page_title" | "title" => SortField::PageTitle,
            "htmlVersion" | "html_version" => SortField::HtmlVersion,
            "status" => SortField::Status,
            "internalLinks" | "internal_links" => SortField::InternalLinks,
            "externalLinks" | "external_links" => SortField::ExternalLinks,
            other => return Err(AppError::validation(format!("cannot sort by '{}'", other))),
        };
        Ok(field)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub(crate) fn keyword(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl FromStr for SortOrder {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(AppError::validation(format!(
                "sort order must be 'asc' or 'desc', got '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Paging, sorting and free-text filtering for [`AnalysisRepository::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    /// Zero-based page index.
    pub page: u32,
    pub page_size: u32,
    pub sort_by: SortField,
    pub order: SortOrder,
    /// Case-insensitive substring of title, url, html version or status.
    pub filter: Option<String>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: 0,
            page_size: DEFAULT_PAGE_SIZE,
            sort_by: SortField::default(),
            order: SortOrder::default(),
            filter: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total_count: u64,
    pub page: u32,
    pub page_size: u32,
}
