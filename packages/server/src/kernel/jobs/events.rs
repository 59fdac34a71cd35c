//! Wire events published to job streams.
//!
//! Five event kinds go over SSE: `progress`, `preview`, `completed`,
//! `failed` and `heartbeat`. Field names are camelCase on the wire and the
//! event name travels in the SSE `event:` line, so the payload carries only
//! the event's own fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::job::{GenerationResult, Job, JobError, JobStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobEvent {
    Progress(ProgressEvent),
    Preview(PreviewEvent),
    Completed(CompletedEvent),
    Failed(FailedEvent),
    Heartbeat(HeartbeatEvent),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub job_id: Uuid,
    pub value: u8,
    pub current_step: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_time_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewEvent {
    pub job_id: Uuid,
    pub partial_content: String,
    pub is_partial: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedEvent {
    pub job_id: Uuid,
    pub result: GenerationResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedEvent {
    pub job_id: Uuid,
    pub error: JobError,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatEvent {
    pub timestamp: DateTime<Utc>,
}

impl JobEvent {
    pub fn progress(job: &Job, estimated_time_ms: Option<u64>) -> Self {
        JobEvent::Progress(ProgressEvent {
            job_id: job.id,
            value: job.progress_pct,
            current_step: job.current_step.clone(),
            estimated_time_ms,
        })
    }

    pub fn preview(job_id: Uuid, partial_content: impl Into<String>) -> Self {
        JobEvent::Preview(PreviewEvent {
            job_id,
            partial_content: partial_content.into(),
            is_partial: true,
        })
    }

    pub fn completed(job_id: Uuid, result: GenerationResult) -> Self {
        JobEvent::Completed(CompletedEvent { job_id, result })
    }

    pub fn failed(job_id: Uuid, error: JobError) -> Self {
        JobEvent::Failed(FailedEvent { job_id, error })
    }

    pub fn heartbeat() -> Self {
        JobEvent::Heartbeat(HeartbeatEvent {
            timestamp: Utc::now(),
        })
    }

    /// The terminal event a late subscriber should receive for a job that
    /// already settled. `None` while the job is still running.
    pub fn terminal_for(job: &Job) -> Option<Self> {
        match job.status {
            JobStatus::Completed => {
                let result = job.result.clone()?;
                Some(JobEvent::completed(job.id, result))
            }
            JobStatus::Failed => {
                let error = job
                    .error
                    .clone()
                    .unwrap_or_else(|| JobError::new("PROVIDER_ERROR", "job failed"));
                Some(JobEvent::failed(job.id, error))
            }
            JobStatus::Canceled => Some(JobEvent::failed(job.id, JobError::canceled())),
            _ => None,
        }
    }

    /// The SSE `event:` name.
    pub fn name(&self) -> &'static str {
        match self {
            JobEvent::Progress(_) => "progress",
            JobEvent::Preview(_) => "preview",
            JobEvent::Completed(_) => "completed",
            JobEvent::Failed(_) => "failed",
            JobEvent::Heartbeat(_) => "heartbeat",
        }
    }

    /// Completed and failed events end the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobEvent::Completed(_) | JobEvent::Failed(_))
    }

    pub fn progress_value(&self) -> Option<u8> {
        match self {
            JobEvent::Progress(p) => Some(p.value),
            _ => None,
        }
    }
}
