//! The ingestion pipeline driver.
//!
//! Drives a job through upload validation, extraction, optional OCR,
//! chunking, embedding and indexing. The driver owns the mechanics: state
//! transitions, bounded per-stage retries with backoff, cancellation
//! checkpoints at every stage boundary, and content-addressed dedup before
//! a job is ever created.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{FileError, IngestError};
use crate::hash::content_hash;
use crate::job::IngestionJob;
use crate::state::IngestState;
use crate::store::IngestionStore;
use crate::traits::{
    Chunk, Chunker, DocumentIndex, DocumentSource, Embedder, IndexedDocument, OcrEngine,
    TextExtractor,
};

/// Pipeline tuning knobs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Per-job bound on stage retries.
    pub max_retries: u32,
    /// Uploads larger than this are rejected during the upload stage.
    pub max_file_bytes: usize,
    /// Base delay before a retry; doubles per retry, capped at 10s.
    pub retry_backoff: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            max_file_bytes: 25 * 1024 * 1024,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

/// Stage implementations injected into the pipeline.
#[derive(Clone)]
pub struct PipelineDeps {
    pub extractor: Arc<dyn TextExtractor>,
    /// OCR is optional; without it, image-only documents fail with
    /// `no-text-found`.
    pub ocr: Option<Arc<dyn OcrEngine>>,
    pub chunker: Arc<dyn Chunker>,
    pub embedder: Arc<dyn Embedder>,
    pub index: Arc<dyn DocumentIndex>,
}

/// Outcome of submitting a document.
#[derive(Debug, Clone)]
pub enum Submission {
    /// The same content is already indexed for this project.
    Existing { document_id: Uuid },
    /// A new job was created and is ready to run.
    Accepted { job: IngestionJob },
}

pub struct IngestionPipeline {
    deps: PipelineDeps,
    store: IngestionStore,
    config: PipelineConfig,
}

impl IngestionPipeline {
    pub fn new(deps: PipelineDeps, config: PipelineConfig) -> Self {
        Self {
            deps,
            store: IngestionStore::new(),
            config,
        }
    }

    pub fn store(&self) -> &IngestionStore {
        &self.store
    }

    /// Submit a document for ingestion.
    ///
    /// Computes the content hash and short-circuits to the existing
    /// document when one with the same hash is already indexed for the
    /// project. Otherwise creates a QUEUED job; the caller is expected to
    /// drive it with [`IngestionPipeline::run`].
    pub async fn submit(
        &self,
        project_id: Uuid,
        source: &DocumentSource,
    ) -> Result<Submission, IngestError> {
        let hash = content_hash(&source.bytes);

        if let Some(document_id) = self.deps.index.find_by_hash(project_id, &hash).await? {
            info!(%project_id, %document_id, "content already indexed, skipping ingestion");
            return Ok(Submission::Existing { document_id });
        }

        let job = IngestionJob::new(project_id, &source.file_name, hash, self.config.max_retries);
        self.store.insert(job.clone());
        Ok(Submission::Accepted { job })
    }

    /// Request cancellation of a job. Idempotent: settled jobs are left
    /// untouched and still report success.
    pub fn cancel(&self, job_id: Uuid) {
        self.store.update(job_id, |job| {
            if job.state.can_transition_to(IngestState::Canceled) {
                let _ = job.transition(IngestState::Canceled);
            }
        });
    }

    /// Drive a job to a settled state.
    ///
    /// Returns the document id on success. The cancellation token is
    /// observed at every stage boundary; stage failures move the job into
    /// the stage's failure state and are retried with backoff while the
    /// error is retryable and the retry bound allows.
    pub async fn run(
        &self,
        job_id: Uuid,
        source: DocumentSource,
        cancel: CancellationToken,
    ) -> Result<Uuid, IngestError> {
        let mut text: Option<String> = None;
        let mut chunks: Option<Vec<Chunk>> = None;
        let mut last_error: Option<IngestError> = None;

        loop {
            if cancel.is_cancelled() {
                self.cancel(job_id);
                return Err(IngestError::Cancelled);
            }

            let job = self
                .store
                .get(job_id)
                .ok_or(IngestError::JobNotFound(job_id))?;

            match job.state {
                IngestState::Queued => {
                    self.advance(job_id, IngestState::Uploading)?;
                }

                IngestState::Uploading => {
                    if source.bytes.len() > self.config.max_file_bytes {
                        let err = IngestError::from(FileError::TooLarge {
                            size: source.bytes.len(),
                            limit: self.config.max_file_bytes,
                        });
                        self.record_failure(job_id, IngestState::FailedExtract, &err)?;
                        last_error = Some(err);
                        continue;
                    }
                    self.advance(job_id, IngestState::Extracting)?;
                }

                IngestState::Extracting => {
                    match self.deps.extractor.extract(&source).await {
                        Ok(extracted) if !extracted.text.trim().is_empty() => {
                            text = Some(extracted.text);
                            self.advance(job_id, IngestState::Chunking)?;
                        }
                        Ok(extracted) if extracted.has_image_content && self.deps.ocr.is_some() => {
                            self.advance(job_id, IngestState::Ocr)?;
                        }
                        Ok(_) => {
                            let err = IngestError::from(FileError::NoTextFound);
                            self.record_failure(job_id, IngestState::FailedExtract, &err)?;
                            last_error = Some(err);
                        }
                        Err(err) => {
                            self.record_failure(job_id, IngestState::FailedExtract, &err)?;
                            last_error = Some(err);
                        }
                    }
                }

                IngestState::Ocr => {
                    // The Ocr state is only reachable when an engine is present.
                    let ocr = self.deps.ocr.as_ref().expect("OCR stage without engine");
                    match ocr.recognize(&source).await {
                        Ok(recognized) if !recognized.trim().is_empty() => {
                            text = Some(recognized);
                            self.advance(job_id, IngestState::Chunking)?;
                        }
                        Ok(_) => {
                            let err = IngestError::from(FileError::NoTextFound);
                            self.record_failure(job_id, IngestState::FailedOcr, &err)?;
                            last_error = Some(err);
                        }
                        Err(err) => {
                            self.record_failure(job_id, IngestState::FailedOcr, &err)?;
                            last_error = Some(err);
                        }
                    }
                }

                IngestState::Chunking => {
                    let input = text.as_deref().unwrap_or_default();
                    match self.deps.chunker.chunk(input) {
                        Ok(produced) => {
                            chunks = Some(produced);
                            self.advance(job_id, IngestState::Embedding)?;
                        }
                        Err(err) => {
                            self.record_failure(job_id, IngestState::FailedExtract, &err)?;
                            last_error = Some(err);
                        }
                    }
                }

                IngestState::Embedding => {
                    let produced = chunks.clone().unwrap_or_default();
                    let embeddings = match self.deps.embedder.embed(&produced).await {
                        Ok(embeddings) => embeddings,
                        Err(err) => {
                            self.record_failure(job_id, IngestState::FailedEmbed, &err)?;
                            last_error = Some(err);
                            continue;
                        }
                    };

                    let document = IndexedDocument {
                        project_id: job.project_id,
                        file_name: job.file_name.clone(),
                        content_hash: job.content_hash.clone(),
                        chunks: produced,
                        embeddings,
                    };
                    match self.deps.index.store(document).await {
                        Ok(document_id) => {
                            let snapshot = self.advance(job_id, IngestState::Indexed)?;
                            self.store.update(job_id, |job| {
                                job.document_id = Some(document_id);
                            });
                            info!(
                                %job_id,
                                %document_id,
                                retries = snapshot.retry_count,
                                "document indexed"
                            );
                            return Ok(document_id);
                        }
                        Err(err) => {
                            self.record_failure(job_id, IngestState::FailedStore, &err)?;
                            last_error = Some(err);
                        }
                    }
                }

                state if state.is_failure() => {
                    let retryable = last_error.as_ref().map(|e| e.is_retryable()).unwrap_or(false);
                    if !job.can_retry() || !retryable {
                        return Err(last_error.unwrap_or_else(|| {
                            IngestError::from(crate::error::ProcessingError::Unknown(
                                "job settled in failure state".to_string(),
                            ))
                        }));
                    }

                    let delay = backoff_delay(self.config.retry_backoff, job.retry_count);
                    warn!(
                        %job_id,
                        state = %state,
                        retry = job.retry_count + 1,
                        delay_ms = delay.as_millis() as u64,
                        "retrying failed ingestion stage"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            self.cancel(job_id);
                            return Err(IngestError::Cancelled);
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }

                    let target = state.retry_target().expect("failure state has retry target");
                    self.advance(job_id, target)?;
                }

                IngestState::Indexed => {
                    return job.document_id.ok_or(IngestError::JobNotFound(job_id));
                }

                IngestState::Canceled => return Err(IngestError::Cancelled),

                // is_failure() arm above covers the rest; this is unreachable
                // but the compiler cannot see through the guard.
                _ => unreachable!("unhandled ingestion state"),
            }
        }
    }

    fn advance(&self, job_id: Uuid, next: IngestState) -> Result<IngestionJob, IngestError> {
        match self.store.update(job_id, |job| job.transition(next)) {
            Some((Ok(()), snapshot)) => Ok(snapshot),
            // An external cancel can land while a stage is in flight; the
            // refused transition out of CANCELED is a cancellation.
            Some((Err(err), _)) if err.from == IngestState::Canceled => {
                Err(IngestError::Cancelled)
            }
            Some((Err(err), _)) => Err(IngestError::InvalidTransition {
                from: err.from,
                to: err.to,
            }),
            None => Err(IngestError::JobNotFound(job_id)),
        }
    }

    fn record_failure(
        &self,
        job_id: Uuid,
        failed: IngestState,
        error: &IngestError,
    ) -> Result<(), IngestError> {
        warn!(%job_id, state = %failed, code = %error.code(), error = %error, "ingestion stage failed");
        match self.store.update(job_id, |job| job.fail(failed, error)) {
            Some((Ok(()), _)) => Ok(()),
            Some((Err(err), _)) if err.from == IngestState::Canceled => {
                Err(IngestError::Cancelled)
            }
            Some((Err(err), _)) => Err(IngestError::InvalidTransition {
                from: err.from,
                to: err.to,
            }),
            None => Err(IngestError::JobNotFound(job_id)),
        }
    }
}

fn backoff_delay(base: Duration, retry: u32) -> Duration {
    let capped = base.saturating_mul(1u32 << retry.min(6));
    capped.min(Duration::from_secs(10))
}
