//! Generation job endpoints.
//!
//! POST   /api/jobs             submit (rate limited, idempotency-key aware)
//! GET    /api/jobs             list, optional ?status= filter
//! GET    /api/jobs/:id         snapshot
//! POST   /api/jobs/:id/cancel  always 204, idempotent

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::common::error::ApiError;
use crate::kernel::deps::ServerDeps;
use crate::kernel::idempotency::{fingerprint, valid_key, Admission, StoredResponse};
use crate::kernel::jobs::job::{JobRequest, JobStatus};
use crate::kernel::rate_limit::Decision;

const MAX_STEPS: u32 = 100;
pub(crate) const REPLAY_HEADER: &str = "idempotent-replay";

pub async fn create_job(
    State(deps): State<ServerDeps>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: JobRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::Validation(format!("invalid job request: {e}")))?;
    if request.title.trim().is_empty() {
        return Err(ApiError::Validation("title must not be empty".to_string()));
    }
    if request.steps == 0 || request.steps > MAX_STEPS {
        return Err(ApiError::Validation(format!(
            "steps must be between 1 and {MAX_STEPS}"
        )));
    }

    enforce_rate_limit(&deps, &format!("jobs:{}", request.project_id))?;

    let Some(key) = idempotency_key(&deps, &headers)? else {
        let job = deps.manager.submit(request)?;
        return Ok((StatusCode::ACCEPTED, Json(job)).into_response());
    };

    match deps.idempotency.admit(&key, &fingerprint(&body)) {
        Admission::Replay(stored) => {
            deps.metrics.idempotent_replay();
            Ok(replay_response(stored))
        }
        Admission::Conflict => Err(ApiError::Conflict(
            "idempotency key was already used with a different request body".to_string(),
        )),
        Admission::Fresh(ticket) => match deps.manager.submit(request) {
            Ok(job) => {
                let body =
                    serde_json::to_value(&job).map_err(|e| ApiError::Internal(e.into()))?;
                deps.idempotency.record(
                    ticket,
                    StoredResponse {
                        status: StatusCode::ACCEPTED.as_u16(),
                        body: body.clone(),
                    },
                );
                Ok((StatusCode::ACCEPTED, Json(body)).into_response())
            }
            Err(err) => {
                // Failed submissions must not poison the key
                deps.idempotency.release(ticket);
                Err(err)
            }
        },
    }
}

#[derive(Deserialize)]
pub struct ListQuery {
    status: Option<JobStatus>,
}

pub async fn list_jobs(
    State(deps): State<ServerDeps>,
    Query(query): Query<ListQuery>,
) -> Json<serde_json::Value> {
    let jobs = deps.store.list(query.status);
    Json(serde_json::json!({ "jobs": jobs }))
}

pub async fn get_job(
    State(deps): State<ServerDeps>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let job = deps.store.get(id)?;
    Ok(Json(job).into_response())
}

/// Cancellation is a no-content success no matter what: unknown, already
/// settled and already canceled jobs are all "already satisfied". An
/// idempotency key on this route is accepted but ignored; replaying a
/// cancel cannot change the outcome.
pub async fn cancel_job(State(deps): State<ServerDeps>, Path(id): Path<Uuid>) -> StatusCode {
    deps.manager.cancel(id);
    StatusCode::NO_CONTENT
}

pub(crate) fn enforce_rate_limit(deps: &ServerDeps, key: &str) -> Result<(), ApiError> {
    match deps.limiter.check(key) {
        Decision::Allowed => Ok(()),
        Decision::Denied { retry_after } => {
            deps.metrics.rate_limited();
            Err(ApiError::RateLimited {
                // Round up so callers never retry a moment too early
                retry_after_secs: retry_after.as_secs_f64().ceil() as u64,
            })
        }
    }
}

fn idempotency_key(deps: &ServerDeps, headers: &HeaderMap) -> Result<Option<String>, ApiError> {
    let Some(raw) = headers.get(deps.config.idempotency_header.as_str()) else {
        return Ok(None);
    };
    let key = raw
        .to_str()
        .map_err(|_| ApiError::Validation("idempotency key must be ASCII".to_string()))?;
    if !valid_key(key) {
        return Err(ApiError::Validation(
            "idempotency key must be 1-255 characters of [A-Za-z0-9_-]".to_string(),
        ));
    }
    Ok(Some(key.to_string()))
}

fn replay_response(stored: StoredResponse) -> Response {
    let status = StatusCode::from_u16(stored.status).unwrap_or(StatusCode::ACCEPTED);
    let mut response = (status, Json(stored.body)).into_response();
    response
        .headers_mut()
        .insert(REPLAY_HEADER, HeaderValue::from_static("true"));
    response
}
