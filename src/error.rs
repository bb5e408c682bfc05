//! Error taxonomy shared by ingestion, indexing, and answering.
//!
//! Every public operation on [`IngestionService`](crate::ingest::IngestionService),
//! [`RagPipeline`](crate::pipeline::RagPipeline), and
//! [`ConversationLog`](crate::history::ConversationLog) reports failure through
//! [`Error`]. Nothing here is fatal to the process: a caller that receives an
//! error can keep using the same service for the next request.

use std::path::PathBuf;

use thiserror::Error;

use crate::validate::ValidationReport;

/// Result alias for domain operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("File does not exist: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Unsupported file type: {extension}. Supported: {supported}")]
    UnsupportedType {
        path: PathBuf,
        extension: String,
        supported: String,
    },

    #[error("File too large: {size_mb:.1}MB (max: {limit_mb}MB)")]
    TooLarge {
        path: PathBuf,
        size_mb: f64,
        limit_mb: f64,
    },

    /// Batch-level count or total-size ceiling. Nothing was copied.
    #[error("{reason}")]
    QuotaExceeded {
        reason: String,
        report: Box<ValidationReport>,
    },

    /// Every file in the batch failed per-file validation.
    #[error("No admissible files: {} rejected", .report.invalid.len())]
    NothingAdmitted { report: Box<ValidationReport> },

    #[error("No files provided")]
    EmptyBatch,

    #[error("Invalid folder path: {}", .0.display())]
    InvalidDirectory(PathBuf),

    #[error("No supported files found in {}", .0.display())]
    NoSupportedFiles(PathBuf),

    #[error("No valid documents to process")]
    NoValidDocuments,

    #[error("No chunks created from documents")]
    NoChunksProduced,

    #[error("No documents in the knowledge base. Add documents before asking questions.")]
    EmptyKnowledgeBase,

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("I/O failure on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn backend(message: impl std::fmt::Display) -> Self {
        Self::BackendUnavailable(message.to_string())
    }

    /// Stable snake_case code for the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "not_found",
            Error::UnsupportedType { .. } => "unsupported_type",
            Error::TooLarge { .. } => "too_large",
            Error::QuotaExceeded { .. } => "quota_exceeded",
            Error::NothingAdmitted { .. } => "nothing_admitted",
            Error::EmptyBatch => "empty_batch",
            Error::InvalidDirectory(_) => "invalid_directory",
            Error::NoSupportedFiles(_) => "no_supported_files",
            Error::NoValidDocuments => "no_valid_documents",
            Error::NoChunksProduced => "no_chunks_produced",
            Error::EmptyKnowledgeBase => "empty_knowledge_base",
            Error::BackendUnavailable(_) => "backend_unavailable",
            Error::Io { .. } => "io_failure",
            Error::Serialization(_) => "serialization",
        }
    }

    /// Validation breakdown attached to batch-level ingestion failures.
    pub fn validation_report(&self) -> Option<&ValidationReport> {
        match self {
            Error::QuotaExceeded { report, .. } | Error::NothingAdmitted { report } => {
                Some(report.as_ref())
            }
            _ => None,
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::BackendUnavailable(format!("vector index: {}", err))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::BackendUnavailable(err.to_string())
    }
}
