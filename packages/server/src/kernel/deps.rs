//! Explicit dependency container.
//!
//! Everything the HTTP layer touches is constructed once in `main` and
//! injected here; handlers never reach for globals. Tests assemble the same
//! container around mocks.

use std::sync::Arc;

use crate::config::Config;
use crate::kernel::embeddings::OpenAiEmbedder;
use crate::kernel::idempotency::IdempotencyGuard;
use crate::kernel::ingest::IngestionService;
use crate::kernel::jobs::manager::{JobManager, JobManagerConfig};
use crate::kernel::jobs::store::JobStore;
use crate::kernel::metrics::Metrics;
use crate::kernel::providers::{ProviderConfig, ProviderRegistry};
use crate::kernel::rate_limit::{RateLimiterConfig, SlidingWindowLimiter};
use crate::kernel::stream_hub::StreamHub;
use crate::kernel::traits::ProviderKind;

use ingestion::stages::{HashingEmbedder, Utf8Extractor, WordChunker};
use ingestion::stores::MemoryIndex;
use ingestion::traits::Embedder;
use ingestion::{PipelineConfig, PipelineDeps};

#[derive(Clone)]
pub struct ServerDeps {
    pub config: Arc<Config>,
    pub store: JobStore,
    pub hub: StreamHub,
    pub manager: Arc<JobManager>,
    pub providers: Arc<ProviderRegistry>,
    pub limiter: Arc<SlidingWindowLimiter>,
    pub idempotency: Arc<IdempotencyGuard>,
    pub ingestion: Arc<IngestionService>,
    pub metrics: Arc<Metrics>,
}

impl ServerDeps {
    /// Wire the whole dependency graph from configuration.
    pub fn from_config(config: Config) -> Self {
        let config = Arc::new(config);
        let store = JobStore::new();
        let hub = StreamHub::new();
        let metrics = Arc::new(Metrics::new());

        let providers = Arc::new(ProviderRegistry::new(ProviderConfig {
            openai_api_key: config.openai_api_key.clone(),
            openai_model: config.openai_model.clone(),
        }));

        let manager = Arc::new(JobManager::new(
            store.clone(),
            hub.clone(),
            providers.clone(),
            metrics.clone(),
            JobManagerConfig {
                default_provider: if config.openai_api_key.is_some() {
                    ProviderKind::OpenAi
                } else {
                    ProviderKind::Echo
                },
                provider_timeout: config.provider_timeout,
                provider_max_attempts: config.provider_max_attempts,
                provider_backoff: config.provider_backoff,
                disconnect_policy: config.disconnect_policy,
            },
        ));

        let limiter = Arc::new(SlidingWindowLimiter::new(RateLimiterConfig {
            limit: config.rate_limit,
            period: config.rate_limit_period,
        }));
        let idempotency = Arc::new(IdempotencyGuard::new(chrono::Duration::hours(
            config.idempotency_ttl_hours,
        )));

        let embedder: Arc<dyn Embedder> = match &config.openai_api_key {
            Some(key) => Arc::new(OpenAiEmbedder::new(key.clone())),
            None => Arc::new(HashingEmbedder::default()),
        };
        let ingestion = Arc::new(IngestionService::new(
            PipelineDeps {
                extractor: Arc::new(Utf8Extractor),
                ocr: None,
                chunker: Arc::new(WordChunker::default()),
                embedder,
                index: Arc::new(MemoryIndex::new()),
            },
            PipelineConfig::default(),
        ));

        Self {
            config,
            store,
            hub,
            manager,
            providers,
            limiter,
            idempotency,
            ingestion,
            metrics,
        }
    }
}
