// Main entry point for the orchestration server

use std::time::Duration;

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use server_core::config::Config;
use server_core::kernel::deps::ServerDeps;
use server_core::server::build_app;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,server_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Draftstream orchestration server");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    let port = config.port;
    let retention = chrono::Duration::hours(config.retention_hours);
    tracing::info!("Configuration loaded");

    // Wire dependencies
    let deps = ServerDeps::from_config(config);

    // Background maintenance: evict settled jobs, sweep idempotency
    // records, prune limiter windows and idle stream channels
    let maintenance = deps.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let evicted = maintenance.store.evict_terminal(retention);
            if evicted > 0 {
                tracing::debug!(evicted, "evicted settled jobs");
            }
            maintenance.ingestion.evict_settled(retention);
            maintenance.idempotency.sweep();
            maintenance.limiter.prune();
            maintenance.hub.cleanup();
        }
    });

    // Build application
    let app = build_app(deps);

    // Start server
    let addr = format!("0.0.0.0:{port}");
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{port}/health");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
