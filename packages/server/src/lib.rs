//! Draftstream orchestration server.
//!
//! Accepts generation and ingestion requests over HTTP, runs each as an
//! in-process job, and streams job events to clients over SSE.
//!
//! Layers:
//!
//! - [`kernel`] - job store, manager, event hub, providers, rate limiting,
//!   idempotency, ingestion bridge. No HTTP types.
//! - [`server`] - axum routes and wire formatting on top of the kernel.
//! - [`config`] - environment-driven configuration.
//! - [`common`] - the API error taxonomy shared by all routes.

pub mod common;
pub mod config;
pub mod kernel;
pub mod server;

pub use common::error::ApiError;
pub use config::Config;
