//! Typed errors for the ingestion pipeline.
//!
//! Uses `thiserror` for library errors (not `anyhow`). Every error maps to
//! one code from a closed, machine-readable set so callers and clients can
//! branch on failures without parsing messages.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::state::IngestState;

/// Machine-readable error codes reported on failed ingestion jobs.
///
/// This set is closed: new failure modes must map onto one of these codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IngestErrorCode {
    FileTooLarge,
    Corrupted,
    UnsupportedFormat,
    NoTextFound,
    OcrEngineFailed,
    OcrTimeout,
    EmbeddingServiceDown,
    EmbeddingQuotaExceeded,
    StorageConnectionFailed,
    DuplicateDocument,
    StorageQuotaExceeded,
    OutOfMemory,
    Timeout,
    Unknown,
}

impl IngestErrorCode {
    /// Stable wire identifier for the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FileTooLarge => "file-too-large",
            Self::Corrupted => "corrupted",
            Self::UnsupportedFormat => "unsupported-format",
            Self::NoTextFound => "no-text-found",
            Self::OcrEngineFailed => "ocr-engine-failed",
            Self::OcrTimeout => "ocr-timeout",
            Self::EmbeddingServiceDown => "embedding-service-down",
            Self::EmbeddingQuotaExceeded => "embedding-quota-exceeded",
            Self::StorageConnectionFailed => "storage-connection-failed",
            Self::DuplicateDocument => "duplicate-document",
            Self::StorageQuotaExceeded => "storage-quota-exceeded",
            Self::OutOfMemory => "out-of-memory",
            Self::Timeout => "timeout",
            Self::Unknown => "unknown",
        }
    }

    /// Whether a retry of the failing stage can plausibly succeed.
    ///
    /// Malformed input never gets better on retry; transient service and
    /// resource failures might.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::FileTooLarge
            | Self::Corrupted
            | Self::UnsupportedFormat
            | Self::NoTextFound
            | Self::DuplicateDocument => false,
            Self::OcrEngineFailed
            | Self::OcrTimeout
            | Self::EmbeddingServiceDown
            | Self::EmbeddingQuotaExceeded
            | Self::StorageConnectionFailed
            | Self::StorageQuotaExceeded
            | Self::OutOfMemory
            | Self::Timeout
            | Self::Unknown => true,
        }
    }
}

impl std::fmt::Display for IngestErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// File and extraction failures.
#[derive(Debug, Error)]
pub enum FileError {
    #[error("file is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },

    #[error("file is corrupted: {0}")]
    Corrupted(String),

    #[error("unsupported format: {format}")]
    UnsupportedFormat { format: String },

    #[error("no text found in document")]
    NoTextFound,
}

/// OCR stage failures.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR engine failed: {0}")]
    EngineFailed(String),

    #[error("OCR timed out")]
    Timeout,
}

/// Chunking/embedding stage failures.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("embedding service unavailable: {0}")]
    EmbeddingServiceDown(String),

    #[error("embedding quota exceeded")]
    EmbeddingQuotaExceeded,

    #[error("out of memory")]
    OutOfMemory,

    #[error("processing timed out")]
    Timeout,

    #[error("processing failed: {0}")]
    Unknown(String),
}

/// Storage/indexing stage failures.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage connection failed: {0}")]
    ConnectionFailed(String),

    #[error("document already indexed as {document_id}")]
    DuplicateDocument { document_id: Uuid },

    #[error("storage quota exceeded")]
    QuotaExceeded,
}

/// Errors that can occur during ingestion.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("file error: {0}")]
    File(#[from] FileError),

    #[error("OCR error: {0}")]
    Ocr(#[from] OcrError),

    #[error("processing error: {0}")]
    Processing(#[from] ProcessingError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("ingestion cancelled")]
    Cancelled,

    #[error("ingestion job not found: {0}")]
    JobNotFound(Uuid),

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: IngestState, to: IngestState },
}

impl IngestError {
    /// The machine-readable code reported to clients.
    pub fn code(&self) -> IngestErrorCode {
        match self {
            Self::File(FileError::TooLarge { .. }) => IngestErrorCode::FileTooLarge,
            Self::File(FileError::Corrupted(_)) => IngestErrorCode::Corrupted,
            Self::File(FileError::UnsupportedFormat { .. }) => IngestErrorCode::UnsupportedFormat,
            Self::File(FileError::NoTextFound) => IngestErrorCode::NoTextFound,
            Self::Ocr(OcrError::EngineFailed(_)) => IngestErrorCode::OcrEngineFailed,
            Self::Ocr(OcrError::Timeout) => IngestErrorCode::OcrTimeout,
            Self::Processing(ProcessingError::EmbeddingServiceDown(_)) => {
                IngestErrorCode::EmbeddingServiceDown
            }
            Self::Processing(ProcessingError::EmbeddingQuotaExceeded) => {
                IngestErrorCode::EmbeddingQuotaExceeded
            }
            Self::Processing(ProcessingError::OutOfMemory) => IngestErrorCode::OutOfMemory,
            Self::Processing(ProcessingError::Timeout) => IngestErrorCode::Timeout,
            Self::Processing(ProcessingError::Unknown(_)) => IngestErrorCode::Unknown,
            Self::Storage(StorageError::ConnectionFailed(_)) => {
                IngestErrorCode::StorageConnectionFailed
            }
            Self::Storage(StorageError::DuplicateDocument { .. }) => {
                IngestErrorCode::DuplicateDocument
            }
            Self::Storage(StorageError::QuotaExceeded) => IngestErrorCode::StorageQuotaExceeded,
            Self::Cancelled | Self::JobNotFound(_) | Self::InvalidTransition { .. } => {
                IngestErrorCode::Unknown
            }
        }
    }

    /// The failure state a job lands in when this error occurs.
    ///
    /// `None` for errors that are not stage failures (cancellation, lookup
    /// failures, transition bugs).
    pub fn failed_state(&self) -> Option<IngestState> {
        match self {
            Self::File(_) => Some(IngestState::FailedExtract),
            Self::Ocr(_) => Some(IngestState::FailedOcr),
            Self::Processing(_) => Some(IngestState::FailedEmbed),
            Self::Storage(_) => Some(IngestState::FailedStore),
            Self::Cancelled | Self::JobNotFound(_) | Self::InvalidTransition { .. } => None,
        }
    }

    /// Whether the failing stage may be retried for this error.
    pub fn is_retryable(&self) -> bool {
        self.failed_state().is_some() && self.code().is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_kebab_case_on_the_wire() {
        let json = serde_json::to_string(&IngestErrorCode::EmbeddingQuotaExceeded).unwrap();
        assert_eq!(json, "\"embedding-quota-exceeded\"");
    }

    #[test]
    fn malformed_input_is_not_retryable() {
        assert!(!IngestErrorCode::Corrupted.is_retryable());
        assert!(!IngestErrorCode::UnsupportedFormat.is_retryable());
        assert!(!IngestErrorCode::NoTextFound.is_retryable());
    }

    #[test]
    fn transient_failures_are_retryable() {
        assert!(IngestErrorCode::EmbeddingServiceDown.is_retryable());
        assert!(IngestErrorCode::OcrTimeout.is_retryable());
        assert!(IngestErrorCode::StorageConnectionFailed.is_retryable());
    }

    #[test]
    fn errors_map_to_their_stage_failure_state() {
        let err = IngestError::from(FileError::NoTextFound);
        assert_eq!(err.failed_state(), Some(IngestState::FailedExtract));

        let err = IngestError::from(OcrError::Timeout);
        assert_eq!(err.failed_state(), Some(IngestState::FailedOcr));

        let err = IngestError::from(ProcessingError::EmbeddingQuotaExceeded);
        assert_eq!(err.failed_state(), Some(IngestState::FailedEmbed));

        let err = IngestError::from(StorageError::QuotaExceeded);
        assert_eq!(err.failed_state(), Some(IngestState::FailedStore));

        assert_eq!(IngestError::Cancelled.failed_state(), None);
    }

    #[test]
    fn cancellation_is_not_retryable() {
        assert!(!IngestError::Cancelled.is_retryable());
    }
}
