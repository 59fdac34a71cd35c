//! The ingestion job record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::error::{IngestError, IngestErrorCode};
use crate::state::IngestState;

/// Rejected state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid ingestion transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: IngestState,
    pub to: IngestState,
}

/// One document working its way through the pipeline.
///
/// Mutated only through [`IngestionJob::transition`] and the error setters,
/// which enforce the transition table and keep progress consistent with the
/// state map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionJob {
    pub id: Uuid,
    pub project_id: Uuid,
    pub file_name: String,
    pub content_hash: String,
    pub state: IngestState,
    pub progress_pct: u8,
    pub current_step: String,
    pub retry_count: u32,
    pub max_retries: u32,
    pub error_code: Option<IngestErrorCode>,
    pub error_message: Option<String>,
    /// Set exactly once, when the job reaches `Indexed`.
    pub document_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IngestionJob {
    pub fn new(
        project_id: Uuid,
        file_name: impl Into<String>,
        content_hash: impl Into<String>,
        max_retries: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            project_id,
            file_name: file_name.into(),
            content_hash: content_hash.into(),
            state: IngestState::Queued,
            progress_pct: 0,
            current_step: IngestState::Queued.step_label().to_string(),
            retry_count: 0,
            max_retries,
            error_code: None,
            error_message: None,
            document_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `next`, updating progress and the step label.
    ///
    /// Rejects any pair outside the transition table. Progress only moves
    /// for states with a fixed percentage; `Canceled` keeps what the job
    /// had. Entering a processing state from its failure state clears the
    /// recorded error.
    pub fn transition(&mut self, next: IngestState) -> Result<(), TransitionError> {
        if !self.state.can_transition_to(next) {
            return Err(TransitionError {
                from: self.state,
                to: next,
            });
        }

        if self.state.is_failure() && self.state.retry_target() == Some(next) {
            self.retry_count += 1;
            self.error_code = None;
            self.error_message = None;
        }

        self.state = next;
        if let Some(pct) = next.progress_pct() {
            self.progress_pct = pct;
        }
        self.current_step = next.step_label().to_string();
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Record a stage failure, moving into the given failure state.
    ///
    /// The pipeline picks the failure state for the stage that was running;
    /// [`IngestError::failed_state`] is the default mapping.
    pub fn fail(&mut self, failed: IngestState, error: &IngestError) -> Result<(), TransitionError> {
        self.transition(failed)?;
        self.error_code = Some(error.code());
        self.error_message = Some(error.to_string());
        Ok(())
    }

    /// Whether another retry of the current failure state is allowed.
    pub fn can_retry(&self) -> bool {
        self.state.is_failure() && self.retry_count < self.max_retries
    }

    /// Terminal once indexed, canceled, or failed with retries exhausted.
    pub fn is_settled(&self) -> bool {
        self.state.is_terminal() || (self.state.is_failure() && !self.can_retry())
    }

    /// The client-facing status shape.
    pub fn status(&self) -> IngestionStatus {
        IngestionStatus {
            status: self.state,
            progress_pct: self.progress_pct,
            current_step: self.current_step.clone(),
            error_code: self.error_code,
            error_message: self.error_message.clone(),
            retry_count: self.retry_count,
        }
    }
}

/// Status returned by the ingestion status query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionStatus {
    pub status: IngestState,
    pub progress_pct: u8,
    pub current_step: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<IngestErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub retry_count: u32,
}
