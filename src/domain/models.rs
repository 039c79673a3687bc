//! Rich domain entities - behavior lives WITH data

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

// ====== Enums ======

/// Lifecycle of an analysis record.
///
/// ```text
///   submit / re-run            worker picks job          engine ok
///  ─────────────────▶ queued ─────────────────▶ running ──────────▶ done
///         ▲                                        │ ▲
///         │ (from any state)                       │ └─ redelivery after crash
///         │                                        └──────────────▶ error
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    #[default]
    Queued,
    Running,
    Done,
    Error,
}

impl AnalysisStatus {
    pub const ALL: [AnalysisStatus; 4] = [
        AnalysisStatus::Queued,
        AnalysisStatus::Running,
        AnalysisStatus::Done,
        AnalysisStatus::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStatus::Queued => "queued",
            AnalysisStatus::Running => "running",
            AnalysisStatus::Done => "done",
            AnalysisStatus::Error => "error",
        }
    }

    /// Done and error only leave through a re-queue.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AnalysisStatus::Done | AnalysisStatus::Error)
    }

    pub fn can_transition_to(&self, next: AnalysisStatus) -> bool {
        use AnalysisStatus::*;
        match (self, next) {
            (_, Queued) => true,
            (Queued, Running) | (Running, Running) => true,
            (Running, Done) | (Running, Error) => true,
            _ => false,
        }
    }
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "queued" => Ok(AnalysisStatus::Queued),
            "running" => Ok(AnalysisStatus::Running),
            "done" => Ok(AnalysisStatus::Done),
            "error" => Ok(AnalysisStatus::Error),
            other => Err(AppError::database(format!("unknown status '{}'", other))),
        }
    }
}

/// HTML version inferred from the document type declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum HtmlVersion {
    #[default]
    #[serde(rename = "")]
    Unset,
    #[serde(rename = "HTML5")]
    Html5,
    #[serde(rename = "HTML 4.01")]
    Html401,
    #[serde(rename = "XHTML")]
    Xhtml,
    #[serde(rename = "Unknown/Other")]
    Other,
    #[serde(rename = "No DOCTYPE")]
    NoDoctype,
}

impl HtmlVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            HtmlVersion::Unset => "",
            HtmlVersion::Html5 => "HTML5",
            HtmlVersion::Html401 => "HTML 4.01",
            HtmlVersion::Xhtml => "XHTML",
            HtmlVersion::Other => "Unknown/Other",
            HtmlVersion::NoDoctype => "No DOCTYPE",
        }
    }

    /// Classify a doctype token. `None` means the document had no declaration.
    pub fn from_doctype(doctype: Option<&str>) -> Self {
        let Some(token) = doctype else {
            return HtmlVersion::NoDoctype;
        };
        let token = token.to_lowercase();
        if token.contains("html 5") {
            HtmlVersion::Html5
        } else if token.contains("html 4.01") {
            HtmlVersion::Html401
        } else if token.contains("xhtml") {
            HtmlVersion::Xhtml
        } else {
            HtmlVersion::Other
        }
    }
}

impl fmt::Display for HtmlVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HtmlVersion {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" => Ok(HtmlVersion::Unset),
            "HTML5" => Ok(HtmlVersion::Html5),
            "HTML 4.01" => Ok(HtmlVersion::Html401),
            "XHTML" => Ok(HtmlVersion::Xhtml),
            "Unknown/Other" => Ok(HtmlVersion::Other),
            "No DOCTYPE" => Ok(HtmlVersion::NoDoctype),
            other => Err(AppError::database(format!("unknown html version '{}'", other))),
        }
    }
}

// ====== Audit snapshot ======

/// Number of heading elements per level. Always exactly six entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadingCounts {
    #[serde(default)]
    pub h1: u32,
    #[serde(default)]
    pub h2: u32,
    #[serde(default)]
    pub h3: u32,
    #[serde(default)]
    pub h4: u32,
    #[serde(default)]
    pub h5: u32,
    #[serde(default)]
    pub h6: u32,
}

impl HeadingCounts {
    pub fn set(&mut self, level: u8, count: u32) {
        let slot = match level {
            1 => &mut self.h1,
            2 => &mut self.h2,
            3 => &mut self.h3,
            4 => &mut self.h4,
            5 => &mut self.h5,
            6 => &mut self.h6,
            _ => return,
        };
        *slot = count;
    }

    pub fn total(&self) -> u32 {
        self.h1 + self.h2 + self.h3 + self.h4 + self.h5 + self.h6
    }
}

/// A link whose probe returned >= 400 or failed at the transport level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokenLink {
    pub link: String,
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl BrokenLink {
    pub fn http_status(link: impl Into<String>, status_code: u16) -> Self {
        Self {
            link: link.into(),
            status_code: Some(status_code),
            error_message: None,
        }
    }

    pub fn network(link: impl Into<String>, message: impl Into<String>) -> Self {
        let mut message = message.into();
        if message.trim().is_empty() {
            message = "network error".to_string();
        }
        Self {
            link: link.into(),
            status_code: None,
            error_message: Some(message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkingLink {
    pub link: String,
    pub status_code: u16,
}

/// Outcome of probing a single link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkStatus {
    Working(WorkingLink),
    Broken(BrokenLink),
}

/// Immutable result of one engine run. Assigned to a record as a whole.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditResult {
    pub html_version: HtmlVersion,
    pub page_title: String,
    pub heading_counts: HeadingCounts,
    pub internal_links: u32,
    pub external_links: u32,
    pub broken_links: Vec<BrokenLink>,
    pub working_links: Vec<WorkingLink>,
    pub has_login_form: bool,
}

// ====== Rich Entity: AnalysisRecord ======

/// Persisted audit status and results for one URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    pub id: String,
    pub url: String,
    pub status: AnalysisStatus,
    #[serde(flatten)]
    pub audit: AuditResult,
    pub last_analyzed: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AnalysisRecord {
    pub fn new(url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            url: url.into(),
            status: AnalysisStatus::Queued,
            audit: AuditResult::default(),
            last_analyzed: now,
            error_message: None,
            created_at: now,
        }
    }

    /// Re-entry point for submit and re-run. Keeps prior audit fields.
    pub fn mark_queued(&mut self) {
        self.status = AnalysisStatus::Queued;
        self.error_message = None;
    }

    pub fn mark_running(&mut self) -> Result<()> {
        self.transition(AnalysisStatus::Running)
    }

    /// Replace the audit snapshot wholesale and finish the run.
    pub fn complete(&mut self, audit: AuditResult, at: DateTime<Utc>) -> Result<()> {
        self.transition(AnalysisStatus::Done)?;
        self.audit = audit;
        self.last_analyzed = at;
        self.error_message = None;
        Ok(())
    }

    /// Finish the run with an error. Prior audit fields stay as they were.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<()> {
        self.transition(AnalysisStatus::Error)?;
        self.error_message = Some(message.into());
        Ok(())
    }

    fn transition(&mut self, next: AnalysisStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

// ====== Queue ======

/// One claimed delivery of a queued analysis.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Job {
    pub id: i64,
    pub record_id: String,
    /// Times this row has been handed to a worker. Above 1 means redelivery.
    pub deliveries: i64,
}

impl Job {
    pub fn is_redelivery(&self) -> bool {
        self.deliveries > 1
    }
}

// ====== Notifications ======

/// Payload broadcast on every status transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub id: String,
    pub url: String,
    pub status: AnalysisStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_analyzed: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit: Option<AuditResult>,
}

impl StatusEvent {
    /// Minimal event for non-terminal transitions.
    pub fn transition(record: &AnalysisRecord) -> Self {
        Self {
            id: record.id.clone(),
            url: record.url.clone(),
            status: record.status,
            error_message: record.error_message.clone(),
            last_analyzed: None,
            audit: None,
        }
    }

    /// Full snapshot for terminal transitions.
    pub fn snapshot(record: &AnalysisRecord) -> Self {
        Self {
            last_analyzed: Some(record.last_analyzed),
            audit: Some(record.audit.clone()),
            ..Self::transition(record)
        }
    }
}
