//! Server-side driver for the document ingestion pipeline.
//!
//! Wraps [`ingestion::IngestionPipeline`] with what the HTTP layer needs:
//! a task per accepted document, a cancellation token per running job, and
//! status lookup by job id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

use ingestion::{
    DocumentSource, IngestError, IngestionPipeline, IngestionStatus, PipelineConfig, PipelineDeps,
    Submission,
};

use crate::common::error::ApiError;

/// Outcome of a document submission, as the HTTP layer sees it.
pub enum IngestOutcome {
    /// Identical content already indexed for this project.
    Existing { document_id: Uuid },
    /// A new ingestion job was accepted and is running.
    Accepted { job_id: Uuid, status: IngestionStatus },
}

pub struct IngestionService {
    pipeline: Arc<IngestionPipeline>,
    running: Mutex<HashMap<Uuid, CancellationToken>>,
}

impl IngestionService {
    pub fn new(deps: PipelineDeps, config: PipelineConfig) -> Self {
        Self {
            pipeline: Arc::new(IngestionPipeline::new(deps, config)),
            running: Mutex::new(HashMap::new()),
        }
    }

    /// Submit a document. Deduplicated submissions return the existing
    /// document; fresh ones get a running job.
    pub async fn submit(
        self: &Arc<Self>,
        project_id: Uuid,
        source: DocumentSource,
    ) -> Result<IngestOutcome, ApiError> {
        let submission = self
            .pipeline
            .submit(project_id, &source)
            .await
            .map_err(|e| ApiError::Processing {
                code: e.code().as_str().to_string(),
                message: e.to_string(),
            })?;

        match submission {
            Submission::Existing { document_id } => Ok(IngestOutcome::Existing { document_id }),
            Submission::Accepted { job } => {
                let token = CancellationToken::new();
                self.running
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(job.id, token.clone());
                info!(job_id = %job.id, %project_id, file = %source.file_name, "ingestion accepted");

                let service = Arc::clone(self);
                let job_id = job.id;
                tokio::spawn(async move {
                    match service.pipeline.run(job_id, source, token).await {
                        Ok(_) => {}
                        Err(IngestError::Cancelled) => {
                            info!(%job_id, "ingestion canceled");
                        }
                        Err(err) => {
                            error!(%job_id, code = %err.code(), error = %err, "ingestion settled in failure");
                        }
                    }
                    service
                        .running
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .remove(&job_id);
                });

                Ok(IngestOutcome::Accepted {
                    job_id: job.id,
                    status: job.status(),
                })
            }
        }
    }

    pub fn status(&self, job_id: Uuid) -> Option<IngestionStatus> {
        self.pipeline.store().get(job_id).map(|job| job.status())
    }

    /// Cancel an ingestion job. Idempotent, including for unknown ids.
    pub fn cancel(&self, job_id: Uuid) {
        let token = {
            let running = self.running.lock().unwrap_or_else(|e| e.into_inner());
            running.get(&job_id).cloned()
        };
        if let Some(token) = token {
            token.cancel();
        }
        self.pipeline.cancel(job_id);
    }

    /// Drop settled job records older than the retention window.
    pub fn evict_settled(&self, older_than: chrono::Duration) {
        self.pipeline.store().evict_settled(older_than);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingestion::stages::WordChunker;
    use ingestion::stores::MemoryIndex;
    use ingestion::testing::{MockEmbedder, MockExtractor};
    use ingestion::IngestState;
    use std::time::Duration;

    fn service() -> Arc<IngestionService> {
        let deps = PipelineDeps {
            extractor: Arc::new(MockExtractor::with_text("some document text")),
            ocr: None,
            chunker: Arc::new(WordChunker::default()),
            embedder: Arc::new(MockEmbedder::new()),
            index: Arc::new(MemoryIndex::new()),
        };
        Arc::new(IngestionService::new(deps, PipelineConfig::default()))
    }

    async fn wait_settled(service: &IngestionService, job_id: Uuid) -> IngestionStatus {
        for _ in 0..200 {
            let status = service.status(job_id).unwrap();
            if status.status.is_terminal() || status.status.is_failure() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("ingestion never settled");
    }

    #[tokio::test]
    async fn submit_runs_to_indexed() {
        let service = service();
        let source = DocumentSource::new("doc.txt", b"hello there".to_vec());
        let outcome = service.submit(Uuid::new_v4(), source).await.unwrap();

        let IngestOutcome::Accepted { job_id, status } = outcome else {
            panic!("expected accepted ingestion");
        };
        assert_eq!(status.status, IngestState::Queued);

        let settled = wait_settled(&service, job_id).await;
        assert_eq!(settled.status, IngestState::Indexed);
        assert_eq!(settled.progress_pct, 100);
    }

    #[tokio::test]
    async fn duplicate_submission_returns_existing() {
        let service = service();
        let project = Uuid::new_v4();
        let source = DocumentSource::new("doc.txt", b"same bytes".to_vec());

        let IngestOutcome::Accepted { job_id, .. } =
            service.submit(project, source.clone()).await.unwrap()
        else {
            panic!("expected accepted ingestion");
        };
        wait_settled(&service, job_id).await;

        match service.submit(project, source).await.unwrap() {
            IngestOutcome::Existing { .. } => {}
            IngestOutcome::Accepted { .. } => panic!("expected dedup"),
        }
    }

    #[tokio::test]
    async fn cancel_unknown_is_satisfied() {
        let service = service();
        service.cancel(Uuid::new_v4());
    }
}
