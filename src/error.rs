//! Typed errors at the pipeline and service boundaries.
//!
//! Infrastructure code returns `anyhow::Result`; these enums wrap those
//! failures where a caller needs to tell kinds apart.

use std::path::PathBuf;

use thiserror::Error;

use crate::models::DocumentStatus;

/// Text extraction failure. Distinct from an unsupported extension, which
/// the loader reports as a normal outcome.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("file not found: {}", .0.display())]
    Missing(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("DOCX extraction failed: {0}")]
    Docx(String),

    #[error("{} is not valid UTF-8", .0.display())]
    Encoding(PathBuf),

    /// The extraction task panicked or was cancelled.
    #[error("extraction aborted: {0}")]
    Aborted(String),
}

/// Why one ingestion step failed.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("no stored bytes for '{0}'")]
    NotFound(String),

    #[error("unsupported format: '{0}'")]
    UnsupportedFormat(String),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("no text could be extracted from '{0}'")]
    Empty(String),

    #[error("byte store failed: {0:#}")]
    Storage(anyhow::Error),

    #[error("embedding failed: {0:#}")]
    Embedding(anyhow::Error),

    #[error("vector index failed: {0:#}")]
    Index(anyhow::Error),
}

impl IngestError {
    /// Terminal document status recorded for this failure.
    pub fn status(&self) -> DocumentStatus {
        match self {
            IngestError::UnsupportedFormat(_) => DocumentStatus::UnsupportedFormat,
            _ => DocumentStatus::Error,
        }
    }
}

/// Errors surfaced to callers of [`DocQa`](crate::service::DocQa).
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("document not found: {0}")]
    NotFound(String),

    #[error("permission denied: document belongs to another user")]
    PermissionDenied,

    #[error("authentication required")]
    Unauthenticated,

    #[error("query must not be empty")]
    EmptyQuery,

    #[error("invalid filename: '{0}'")]
    InvalidFilename(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    /// True when the caller sent a bad request, as opposed to a server fault.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, ServiceError::Internal(_))
    }
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;
