//! Router assembly.

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::kernel::deps::ServerDeps;
use crate::server::routes::{documents, jobs, ops, stream};

pub fn build_app(deps: ServerDeps) -> Router {
    Router::new()
        .route("/health", get(ops::health))
        .route("/metrics", get(ops::metrics))
        .route("/api/providers", get(ops::providers))
        .route("/api/jobs", post(jobs::create_job).get(jobs::list_jobs))
        .route("/api/jobs/:id", get(jobs::get_job))
        .route("/api/jobs/:id/cancel", post(jobs::cancel_job))
        .route("/api/jobs/:id/stream", get(stream::stream_job))
        .route("/api/documents", post(documents::create_document))
        .route("/api/documents/jobs/:id", get(documents::ingestion_status))
        .route(
            "/api/documents/jobs/:id/cancel",
            post(documents::cancel_ingestion),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(deps)
}
