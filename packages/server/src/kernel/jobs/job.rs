//! The generation job record and its status machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::kernel::traits::ProviderKind;

/// Lifecycle of a generation job.
///
/// `Queued -> Streaming -> Completed | Failed`, with `Canceled` reachable
/// from any non-terminal state. Terminal states never transition again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    #[default]
    Queued,
    Streaming,
    Completed,
    Failed,
    Canceled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Canceled
        )
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match self {
            JobStatus::Queued => matches!(next, JobStatus::Streaming | JobStatus::Canceled),
            JobStatus::Streaming => matches!(
                next,
                JobStatus::Completed | JobStatus::Failed | JobStatus::Canceled
            ),
            _ => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Queued => "QUEUED",
            JobStatus::Streaming => "STREAMING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Canceled => "CANCELED",
        };
        f.write_str(s)
    }
}

/// Machine-readable codes carried by failed jobs.
pub mod error_codes {
    pub const PROVIDER_ERROR: &str = "PROVIDER_ERROR";
    pub const PROVIDER_TIMEOUT: &str = "PROVIDER_TIMEOUT";
    pub const PROVIDER_UNAVAILABLE: &str = "PROVIDER_UNAVAILABLE";
    pub const CANCELED: &str = "CANCELED";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobError {
    pub code: String,
    pub message: String,
}

impl JobError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn canceled() -> Self {
        Self::new(error_codes::CANCELED, "job canceled")
    }
}

/// The finished artifact of a completed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub content: String,
    pub token_count: u32,
    pub word_count: u32,
    pub generation_time_ms: u64,
}

/// What the caller asks for when submitting a job.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    pub project_id: Uuid,
    #[builder(setter(into))]
    pub title: String,
    #[builder(default)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Coarse progress granularity; a streaming provider is driven through
    /// this many steps.
    #[builder(default = 4)]
    #[serde(default = "default_steps")]
    pub steps: u32,
    #[builder(default)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderKind>,
}

fn default_steps() -> u32 {
    4
}

/// One generation job.
///
/// Mutated only through [`JobStore::update`](crate::kernel::jobs::store::JobStore::update),
/// which enforces the status table and monotonic progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: Uuid,
    pub project_id: Uuid,
    pub request: JobRequest,
    pub status: JobStatus,
    pub progress_pct: u8,
    pub current_step: String,
    pub retry_count: u32,
    pub cancel_requested: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<GenerationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(request: JobRequest) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            project_id: request.project_id,
            request,
            status: JobStatus::Queued,
            progress_pct: 0,
            current_step: "queued".to_string(),
            retry_count: 0,
            cancel_requested: false,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}
