//! Document ingestion endpoints.
//!
//! POST /api/documents                      submit a document (rate limited)
//! GET  /api/documents/jobs/:id             ingestion status
//! POST /api/documents/jobs/:id/cancel      always 204, idempotent

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use ingestion::DocumentSource;

use crate::common::error::ApiError;
use crate::kernel::deps::ServerDeps;
use crate::kernel::ingest::IngestOutcome;
use crate::server::routes::jobs::enforce_rate_limit;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentUpload {
    pub project_id: Uuid,
    pub file_name: String,
    /// Document content as text. Binary formats come in through a
    /// different extractor wiring.
    pub content: String,
    #[serde(default)]
    pub content_type: Option<String>,
}

pub async fn create_document(
    State(deps): State<ServerDeps>,
    Json(upload): Json<DocumentUpload>,
) -> Result<Response, ApiError> {
    if upload.file_name.trim().is_empty() {
        return Err(ApiError::Validation("fileName must not be empty".to_string()));
    }
    if upload.content.is_empty() {
        return Err(ApiError::Validation("content must not be empty".to_string()));
    }

    enforce_rate_limit(&deps, &format!("documents:{}", upload.project_id))?;

    let mut source = DocumentSource::new(upload.file_name, upload.content.into_bytes());
    if let Some(content_type) = upload.content_type {
        source = source.with_content_type(content_type);
    }

    match deps.ingestion.submit(upload.project_id, source).await? {
        IngestOutcome::Existing { document_id } => Ok((
            StatusCode::OK,
            Json(json!({ "documentId": document_id, "duplicate": true })),
        )
            .into_response()),
        IngestOutcome::Accepted { job_id, status } => Ok((
            StatusCode::ACCEPTED,
            Json(json!({ "jobId": job_id, "status": status })),
        )
            .into_response()),
    }
}

pub async fn ingestion_status(
    State(deps): State<ServerDeps>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let status = deps
        .ingestion
        .status(id)
        .ok_or_else(|| ApiError::NotFound(format!("ingestion job {id}")))?;
    Ok(Json(status).into_response())
}

pub async fn cancel_ingestion(State(deps): State<ServerDeps>, Path(id): Path<Uuid>) -> StatusCode {
    deps.ingestion.cancel(id);
    StatusCode::NO_CONTENT
}
