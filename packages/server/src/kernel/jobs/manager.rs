//! Job orchestration.
//!
//! The manager owns the full job lifecycle: accept a request, spawn one
//! task per job, drive the provider with a per-attempt timeout and bounded
//! retries, publish wire events along the way, and honor cancellation at
//! every await point. Each running job has its own cancellation token;
//! cancel requests fire the token and the drive loop winds down
//! cooperatively.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::common::error::ApiError;
use crate::kernel::jobs::events::JobEvent;
use crate::kernel::jobs::job::{
    error_codes, GenerationResult, Job, JobError, JobRequest, JobStatus,
};
use crate::kernel::jobs::store::JobStore;
use crate::kernel::metrics::Metrics;
use crate::kernel::providers::ProviderRegistry;
use crate::kernel::stream_hub::StreamHub;
use crate::kernel::traits::{Generator, ProviderError, ProviderKind};

/// What to do when the last stream subscriber disconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisconnectPolicy {
    /// Keep running; the result stays queryable.
    Ignore,
    /// Cancel the job, but only while it is still QUEUED. A job that
    /// already started streaming runs to completion.
    #[default]
    CancelQueued,
}

#[derive(Debug, Clone)]
pub struct JobManagerConfig {
    pub default_provider: ProviderKind,
    /// Wall-clock limit for one provider attempt.
    pub provider_timeout: Duration,
    /// Total attempts, including the first.
    pub provider_max_attempts: u32,
    /// Base retry delay; doubles per retry, capped at 10s.
    pub provider_backoff: Duration,
    pub disconnect_policy: DisconnectPolicy,
}

impl Default for JobManagerConfig {
    fn default() -> Self {
        Self {
            default_provider: ProviderKind::Echo,
            provider_timeout: Duration::from_secs(30),
            provider_max_attempts: 3,
            provider_backoff: Duration::from_millis(250),
            disconnect_policy: DisconnectPolicy::default(),
        }
    }
}

pub struct JobManager {
    store: JobStore,
    hub: StreamHub,
    providers: Arc<ProviderRegistry>,
    metrics: Arc<Metrics>,
    config: JobManagerConfig,
    running: Mutex<HashMap<Uuid, CancellationToken>>,
}

enum AttemptError {
    Canceled,
    Provider(ProviderError),
}

impl JobManager {
    pub fn new(
        store: JobStore,
        hub: StreamHub,
        providers: Arc<ProviderRegistry>,
        metrics: Arc<Metrics>,
        config: JobManagerConfig,
    ) -> Self {
        Self {
            store,
            hub,
            providers,
            metrics,
            config,
            running: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &JobManagerConfig {
        &self.config
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Accept a request: create the QUEUED job, register its cancellation
    /// token and spawn its drive task. Returns the accepted snapshot
    /// immediately.
    pub fn submit(self: &Arc<Self>, request: JobRequest) -> Result<Job, ApiError> {
        let job = self.store.create(request.clone())?;
        let token = CancellationToken::new();
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(job.id, token.clone());
        self.metrics.job_submitted();
        info!(job_id = %job.id, project_id = %job.project_id, "job accepted");

        let manager = Arc::clone(self);
        let job_id = job.id;
        tokio::spawn(async move {
            manager.run_job(job_id, request, token).await;
            manager
                .running
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&job_id);
        });

        Ok(job)
    }

    /// Request cancellation. Idempotent: canceling a settled or unknown job
    /// is already satisfied and succeeds without effect.
    pub fn cancel(&self, id: Uuid) {
        let Ok(before) = self.store.get(id) else {
            return;
        };
        if before.status.is_terminal() {
            return;
        }

        let mut transitioned = false;
        let _ = self.store.update(id, |job| {
            job.cancel_requested = true;
            if job.status.can_transition_to(JobStatus::Canceled) {
                job.status = JobStatus::Canceled;
                job.current_step = "canceled".to_string();
                transitioned = true;
            }
        });

        let token = {
            let running = self.running.lock().unwrap_or_else(|e| e.into_inner());
            running.get(&id).cloned()
        };
        if let Some(token) = token {
            token.cancel();
        }

        if transitioned {
            info!(job_id = %id, "job canceled");
            self.metrics.job_settled(JobStatus::Canceled);
            self.hub.publish(id, JobEvent::failed(id, JobError::canceled()));
        }
    }

    /// Number of jobs with a live drive task.
    pub fn running_count(&self) -> usize {
        self.running.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    async fn run_job(&self, id: Uuid, request: JobRequest, token: CancellationToken) {
        let kind = request.provider.unwrap_or(self.config.default_provider);

        let mut started_streaming = false;
        let start_result = self.store.update(id, |job| {
            if job.status.can_transition_to(JobStatus::Streaming) && !job.cancel_requested {
                job.status = JobStatus::Streaming;
                job.current_step = "starting generation".to_string();
                started_streaming = true;
            }
        });
        if start_result.is_err() || !started_streaming {
            // Canceled before the task got scheduled
            debug!(job_id = %id, "job settled before streaming started");
            return;
        }

        let provider = match self.providers.create(kind).await {
            Ok(provider) => provider,
            Err(err) => {
                self.finish_failed(
                    id,
                    JobError::new(error_codes::PROVIDER_UNAVAILABLE, err.to_string()),
                );
                return;
            }
        };

        let started = Instant::now();
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let outcome = tokio::select! {
                _ = token.cancelled() => {
                    self.finish_canceled(id);
                    return;
                }
                result = tokio::time::timeout(
                    self.config.provider_timeout,
                    self.attempt_generation(id, &request, provider.clone(), &token, started),
                ) => result,
            };

            let last_error = match outcome {
                Ok(Ok(result)) => {
                    self.finish_completed(id, result);
                    return;
                }
                Ok(Err(AttemptError::Canceled)) => {
                    self.finish_canceled(id);
                    return;
                }
                Ok(Err(AttemptError::Provider(err))) => err,
                Err(_elapsed) => ProviderError::Timeout,
            };

            if attempt >= self.config.provider_max_attempts {
                let code = match last_error {
                    ProviderError::Timeout => error_codes::PROVIDER_TIMEOUT,
                    _ => error_codes::PROVIDER_ERROR,
                };
                self.finish_failed(id, JobError::new(code, last_error.to_string()));
                return;
            }

            self.metrics.provider_retry();
            let delay = backoff_delay(self.config.provider_backoff, attempt - 1);
            warn!(
                job_id = %id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %last_error,
                "provider attempt failed, retrying"
            );
            let _ = self.store.update(id, |job| {
                job.retry_count = attempt;
                job.current_step = format!("retrying (attempt {})", attempt + 1);
            });

            tokio::select! {
                _ = token.cancelled() => {
                    self.finish_canceled(id);
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn attempt_generation(
        &self,
        id: Uuid,
        request: &JobRequest,
        provider: Arc<dyn Generator>,
        token: &CancellationToken,
        started: Instant,
    ) -> Result<GenerationResult, AttemptError> {
        let steps = request.steps.max(1);
        let mut content = String::new();

        if provider.capabilities().streaming {
            let mut stream = provider
                .generate_stream(request)
                .await
                .map_err(AttemptError::Provider)?;
            let mut index: u32 = 0;
            while let Some(fragment) = stream.next().await {
                if token.is_cancelled() {
                    return Err(AttemptError::Canceled);
                }
                let fragment = fragment.map_err(AttemptError::Provider)?;

                let value = (index.min(steps - 1) * 100 / steps) as u8;
                let step = format!("step {} of {}", index.min(steps - 1) + 1, steps);
                self.publish_progress(id, value, &step, started);

                content.push_str(&fragment.text);
                self.hub.publish(id, JobEvent::preview(id, content.clone()));
                index += 1;
            }
        } else {
            self.publish_progress(id, 0, "generating", started);
            content = provider
                .generate(request)
                .await
                .map_err(AttemptError::Provider)?;
        }

        if content.trim().is_empty() {
            return Err(AttemptError::Provider(ProviderError::Call(
                "provider produced no content".to_string(),
            )));
        }
        Ok(build_result(content, started))
    }

    /// Raise stored progress to `value` (never lower it) and publish the
    /// effective value, so retries that restart a stream cannot move the
    /// wire backward.
    fn publish_progress(&self, id: Uuid, value: u8, step: &str, started: Instant) {
        let updated = self.store.update(id, |job| {
            job.progress_pct = job.progress_pct.max(value);
            job.current_step = step.to_string();
        });
        if let Ok(snapshot) = updated {
            let estimate = estimate_remaining_ms(started, snapshot.progress_pct);
            self.hub.publish(id, JobEvent::progress(&snapshot, estimate));
        }
    }

    fn finish_completed(&self, id: Uuid, result: GenerationResult) {
        let mut committed = false;
        let updated = self.store.update(id, |job| {
            if job.status.can_transition_to(JobStatus::Completed) {
                job.status = JobStatus::Completed;
                job.progress_pct = 100;
                job.current_step = "completed".to_string();
                job.result = Some(result.clone());
                committed = true;
            }
        });
        if updated.is_ok() && committed {
            info!(job_id = %id, generation_time_ms = result.generation_time_ms, "job completed");
            self.metrics.job_settled(JobStatus::Completed);
            self.hub.publish(id, JobEvent::completed(id, result));
        } else {
            debug!(job_id = %id, "completion dropped, job already settled");
        }
    }

    fn finish_failed(&self, id: Uuid, error: JobError) {
        let mut committed = false;
        let updated = self.store.update(id, |job| {
            if job.status.can_transition_to(JobStatus::Failed) {
                job.status = JobStatus::Failed;
                job.current_step = "failed".to_string();
                job.error = Some(error.clone());
                committed = true;
            }
        });
        if updated.is_ok() && committed {
            warn!(job_id = %id, code = %error.code, message = %error.message, "job failed");
            self.metrics.job_settled(JobStatus::Failed);
            self.hub.publish(id, JobEvent::failed(id, error));
        }
    }

    fn finish_canceled(&self, id: Uuid) {
        let mut committed = false;
        let _ = self.store.update(id, |job| {
            if job.status.can_transition_to(JobStatus::Canceled) {
                job.status = JobStatus::Canceled;
                job.current_step = "canceled".to_string();
                committed = true;
            }
        });
        if committed {
            info!(job_id = %id, "job canceled mid-run");
            self.metrics.job_settled(JobStatus::Canceled);
            self.hub.publish(id, JobEvent::failed(id, JobError::canceled()));
        }
    }
}

fn backoff_delay(base: Duration, retry: u32) -> Duration {
    base.saturating_mul(1u32 << retry.min(6))
        .min(Duration::from_secs(10))
}

fn estimate_remaining_ms(started: Instant, progress_pct: u8) -> Option<u64> {
    if progress_pct == 0 || progress_pct >= 100 {
        return None;
    }
    let elapsed = started.elapsed().as_millis() as u64;
    let remaining = elapsed * u64::from(100 - progress_pct) / u64::from(progress_pct);
    Some(remaining)
}

fn build_result(content: String, started: Instant) -> GenerationResult {
    let word_count = content.split_whitespace().count() as u32;
    // Rough tokenization estimate; providers that report exact counts can
    // be added to the trait later.
    let token_count = (content.len() as u32).div_ceil(4);
    GenerationResult {
        generation_time_ms: started.elapsed().as_millis() as u64,
        content,
        token_count,
        word_count,
    }
}
