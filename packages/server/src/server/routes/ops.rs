//! Operational endpoints: health, metrics, provider diagnostics.

use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::kernel::deps::ServerDeps;

pub async fn health(State(deps): State<ServerDeps>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "runningJobs": deps.manager.running_count(),
    }))
}

pub async fn metrics(State(deps): State<ServerDeps>) -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        deps.metrics.render(),
    )
        .into_response()
}

/// Availability of every provider kind, with remediation hints for the
/// unavailable ones.
pub async fn providers(State(deps): State<ServerDeps>) -> Json<serde_json::Value> {
    let report = deps.providers.diagnostics().await;
    Json(json!({ "providers": report }))
}
