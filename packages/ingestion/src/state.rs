//! The ingestion state machine.
//!
//! States advance strictly through the transition table below. Failed
//! states keep the progress percentage of the stage that failed and may
//! transition back into that stage for a retry.

use serde::{Deserialize, Serialize};

/// Lifecycle states of an ingestion job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IngestState {
    #[default]
    Queued,
    Uploading,
    Extracting,
    Ocr,
    Chunking,
    Embedding,
    Indexed,
    FailedExtract,
    FailedOcr,
    FailedEmbed,
    FailedStore,
    Canceled,
}

impl IngestState {
    /// Fixed progress percentage for this state.
    ///
    /// `None` for `Canceled`, which keeps whatever progress the job had.
    pub fn progress_pct(&self) -> Option<u8> {
        match self {
            Self::Queued => Some(0),
            Self::Uploading => Some(10),
            Self::Extracting | Self::FailedExtract => Some(25),
            Self::Ocr | Self::FailedOcr => Some(40),
            Self::Chunking => Some(60),
            Self::Embedding | Self::FailedEmbed | Self::FailedStore => Some(80),
            Self::Indexed => Some(100),
            Self::Canceled => None,
        }
    }

    /// Terminal states have no outgoing transitions at all.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Indexed | Self::Canceled)
    }

    /// Stage-failure states; retryable until the retry bound is hit.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::FailedExtract | Self::FailedOcr | Self::FailedEmbed | Self::FailedStore
        )
    }

    /// The processing state a failed state retries back into.
    ///
    /// `FailedStore` retries from `Embedding`: storage happens between the
    /// 80% embedding mark and the 100% indexed mark.
    pub fn retry_target(&self) -> Option<IngestState> {
        match self {
            Self::FailedExtract => Some(Self::Extracting),
            Self::FailedOcr => Some(Self::Ocr),
            Self::FailedEmbed | Self::FailedStore => Some(Self::Embedding),
            _ => None,
        }
    }

    /// The closed transition table.
    pub fn can_transition_to(&self, next: IngestState) -> bool {
        use IngestState::*;
        match self {
            Queued => matches!(next, Uploading | Canceled),
            Uploading => matches!(next, Extracting | FailedExtract | Canceled),
            Extracting => matches!(next, Ocr | Chunking | FailedExtract | Canceled),
            Ocr => matches!(next, Chunking | FailedOcr | Canceled),
            Chunking => matches!(next, Embedding | FailedExtract | Canceled),
            Embedding => matches!(next, Indexed | FailedEmbed | FailedStore | Canceled),
            FailedExtract => matches!(next, Extracting | Canceled),
            FailedOcr => matches!(next, Ocr | Canceled),
            FailedEmbed | FailedStore => matches!(next, Embedding | Canceled),
            Indexed | Canceled => false,
        }
    }

    /// Human-readable step label surfaced in status responses.
    pub fn step_label(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Uploading => "uploading document",
            Self::Extracting => "extracting text",
            Self::Ocr => "running OCR",
            Self::Chunking => "chunking text",
            Self::Embedding => "generating embeddings",
            Self::Indexed => "indexed",
            Self::FailedExtract => "extraction failed",
            Self::FailedOcr => "OCR failed",
            Self::FailedEmbed => "embedding failed",
            Self::FailedStore => "storage failed",
            Self::Canceled => "canceled",
        }
    }
}

impl std::fmt::Display for IngestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Queued => "QUEUED",
            Self::Uploading => "UPLOADING",
            Self::Extracting => "EXTRACTING",
            Self::Ocr => "OCR",
            Self::Chunking => "CHUNKING",
            Self::Embedding => "EMBEDDING",
            Self::Indexed => "INDEXED",
            Self::FailedExtract => "FAILED_EXTRACT",
            Self::FailedOcr => "FAILED_OCR",
            Self::FailedEmbed => "FAILED_EMBED",
            Self::FailedStore => "FAILED_STORE",
            Self::Canceled => "CANCELED",
        };
        f.write_str(name)
    }
}

/// All states, for iteration in tests and diagnostics.
pub const ALL_STATES: [IngestState; 12] = [
    IngestState::Queued,
    IngestState::Uploading,
    IngestState::Extracting,
    IngestState::Ocr,
    IngestState::Chunking,
    IngestState::Embedding,
    IngestState::Indexed,
    IngestState::FailedExtract,
    IngestState::FailedOcr,
    IngestState::FailedEmbed,
    IngestState::FailedStore,
    IngestState::Canceled,
];
