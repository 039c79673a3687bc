//! Error types for the page auditor.
//!
//! This module provides structured error handling with:
//! - `AppError`: Domain-specific errors for queue, store and submission operations
//! - `AnalysisError`: Everything that can go wrong while rendering and auditing one page
//! - `Result<T>`: Type alias for Results using AppError

use thiserror::Error;

use crate::domain::models::AnalysisStatus;

// ============================================================================
// DOMAIN ERROR TYPE
// ============================================================================

/// Domain-specific errors for application operations.
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed submission input, rejected before a record or job exists
    #[error("Invalid input: {0}")]
    Validation(String),

    /// A job referenced a record that no longer exists
    #[error("Analysis record not found: {0}")]
    MissingRecord(String),

    /// Refused state machine transition
    #[error("Cannot move analysis from {from} to {to}")]
    InvalidTransition {
        from: AnalysisStatus,
        to: AnalysisStatus,
    },

    /// Database operation failed
    #[error("Database error: {0}")]
    Database(String),

    /// Page analysis failed
    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    /// Generic error with context
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(error: sqlx::Error) -> Self {
        Self::Database(error.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        Self::Database(format!("migration failed: {}", error))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::Database(format!("corrupt JSON column: {}", error))
    }
}

/// Result type alias using AppError.
pub type Result<T> = std::result::Result<T, AppError>;

// ============================================================================
// ANALYSIS ERROR
// ============================================================================

/// Failure of a single page analysis. Always terminal for the job that hit it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AnalysisError {
    /// The page did not finish rendering in time
    #[error("Rendering {url} timed out after {secs}s")]
    Timeout { url: String, secs: u64 },

    /// Navigation failed (DNS, refused connection, TLS, ...)
    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    /// The browser could not be launched or crashed mid-render
    #[error("Browser error: {0}")]
    Browser(String),

    /// The URL handed to the engine is not something we can render
    #[error("Invalid URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    /// The probe client could not be built
    #[error("HTTP client error: {0}")]
    Client(String),
}

impl AnalysisError {
    pub fn navigation(url: &str, message: impl Into<String>) -> Self {
        Self::Navigation {
            url: url.to_string(),
            message: message.into(),
        }
    }

    pub fn browser(message: impl Into<String>) -> Self {
        Self::Browser(message.into())
    }
}
