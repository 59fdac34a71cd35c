//! The orchestration kernel.
//!
//! Infrastructure the HTTP layer is built on: the job store and manager,
//! the event hub, provider registry, rate limiting, idempotency, and the
//! ingestion bridge. Nothing in here knows about axum except `stream_hub`'s
//! SSE-agnostic event stream; wire formatting lives in the server layer.

pub mod deps;
pub mod embeddings;
pub mod idempotency;
pub mod ingest;
pub mod jobs;
pub mod metrics;
pub mod providers;
pub mod rate_limit;
pub mod stream_hub;
pub mod testing;
pub mod traits;
