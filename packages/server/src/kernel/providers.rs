//! Provider registry with lazy construction.
//!
//! Providers are built the first time a job asks for them, never at
//! startup. A failed construction is cached so every later request for the
//! same provider gets the same diagnostic instantly instead of re-running
//! the failing setup.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream;
use rig::completion::Prompt;
use rig::providers::openai;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::kernel::jobs::job::JobRequest;
use crate::kernel::traits::{
    Fragment, FragmentStream, Generator, GeneratorCapabilities, ProviderError, ProviderKind,
};

/// Credentials and model choices the registry constructs providers from.
#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    pub openai_api_key: Option<String>,
    pub openai_model: String,
}

#[derive(Clone)]
enum Slot {
    Ready(Arc<dyn Generator>),
    Failed(String),
}

pub struct ProviderRegistry {
    config: ProviderConfig,
    slots: RwLock<HashMap<ProviderKind, Slot>>,
}

/// One row of the provider diagnostics report.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderDiagnostic {
    pub provider: ProviderKind,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ProviderRegistry {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Install a pre-built generator under a kind. Used by tests and by
    /// deployments that wire custom providers.
    pub async fn install(&self, kind: ProviderKind, generator: Arc<dyn Generator>) {
        self.slots.write().await.insert(kind, Slot::Ready(generator));
    }

    /// Get or lazily construct the provider.
    ///
    /// Both outcomes are cached: a provider is built at most once, and a
    /// construction failure is reported identically on every later call.
    pub async fn create(&self, kind: ProviderKind) -> Result<Arc<dyn Generator>, ProviderError> {
        {
            let slots = self.slots.read().await;
            match slots.get(&kind) {
                Some(Slot::Ready(generator)) => return Ok(generator.clone()),
                Some(Slot::Failed(reason)) => {
                    return Err(ProviderError::NotConfigured(reason.clone()))
                }
                None => {}
            }
        }

        let mut slots = self.slots.write().await;
        // Another task may have initialized while we waited for the lock
        match slots.get(&kind) {
            Some(Slot::Ready(generator)) => return Ok(generator.clone()),
            Some(Slot::Failed(reason)) => {
                return Err(ProviderError::NotConfigured(reason.clone()))
            }
            None => {}
        }

        match self.construct(kind) {
            Ok(generator) => {
                info!(provider = %kind, "provider initialized");
                slots.insert(kind, Slot::Ready(generator.clone()));
                Ok(generator)
            }
            Err(reason) => {
                warn!(provider = %kind, reason = %reason, "provider unavailable");
                slots.insert(kind, Slot::Failed(reason.clone()));
                Err(ProviderError::NotConfigured(reason))
            }
        }
    }

    /// Whether the provider could be (or already was) constructed. Does not
    /// force construction.
    pub async fn is_available(&self, kind: ProviderKind) -> bool {
        {
            let slots = self.slots.read().await;
            match slots.get(&kind) {
                Some(Slot::Ready(_)) => return true,
                Some(Slot::Failed(_)) => return false,
                None => {}
            }
        }
        self.probe(kind).is_none()
    }

    pub async fn available_kinds(&self) -> Vec<ProviderKind> {
        let mut kinds = Vec::new();
        for kind in ProviderKind::ALL {
            if self.is_available(kind).await {
                kinds.push(kind);
            }
        }
        kinds
    }

    /// Per-provider availability with remediation hints for the ops
    /// endpoint.
    pub async fn diagnostics(&self) -> Vec<ProviderDiagnostic> {
        let mut report = Vec::new();
        for kind in ProviderKind::ALL {
            let detail = {
                let slots = self.slots.read().await;
                match slots.get(&kind) {
                    Some(Slot::Ready(_)) => None,
                    Some(Slot::Failed(reason)) => Some(reason.clone()),
                    None => self.probe(kind),
                }
            };
            report.push(ProviderDiagnostic {
                provider: kind,
                available: detail.is_none(),
                detail,
            });
        }
        report
    }

    fn construct(&self, kind: ProviderKind) -> Result<Arc<dyn Generator>, String> {
        if let Some(reason) = self.probe(kind) {
            return Err(reason);
        }
        match kind {
            ProviderKind::Echo => Ok(Arc::new(EchoGenerator)),
            ProviderKind::OpenAi => {
                // probe() guarantees the key is present here
                let api_key = self.config.openai_api_key.clone().unwrap_or_default();
                Ok(Arc::new(OpenAiGenerator::new(
                    api_key,
                    self.config.openai_model.clone(),
                )))
            }
        }
    }

    /// `None` when the provider can be constructed; otherwise the reason it
    /// cannot, phrased so an operator knows what to fix.
    fn probe(&self, kind: ProviderKind) -> Option<String> {
        match kind {
            ProviderKind::Echo => None,
            ProviderKind::OpenAi => match &self.config.openai_api_key {
                Some(key) if !key.trim().is_empty() => None,
                _ => Some(
                    "OPENAI_API_KEY is not set; export it to enable the open_ai provider"
                        .to_string(),
                ),
            },
        }
    }
}

/// Deterministic local generator.
///
/// Emits `steps` fragments derived from the request, so a full pipeline can
/// run without any external service.
pub struct EchoGenerator;

#[async_trait]
impl Generator for EchoGenerator {
    fn capabilities(&self) -> GeneratorCapabilities {
        GeneratorCapabilities { streaming: true }
    }

    async fn generate(&self, request: &JobRequest) -> Result<String, ProviderError> {
        Ok(echo_fragments(request).join(""))
    }

    async fn generate_stream(&self, request: &JobRequest) -> Result<FragmentStream, ProviderError> {
        let fragments = echo_fragments(request);
        Ok(Box::pin(stream::iter(
            fragments.into_iter().map(|text| Ok(Fragment::new(text))),
        )))
    }
}

fn echo_fragments(request: &JobRequest) -> Vec<String> {
    let steps = request.steps.max(1);
    let subject = request
        .prompt
        .as_deref()
        .unwrap_or(request.title.as_str());
    (1..=steps)
        .map(|i| format!("[{i}/{steps}] {subject}. "))
        .collect()
}

/// OpenAI-backed generator built on rig.
pub struct OpenAiGenerator {
    client: openai::Client,
    model: String,
}

impl OpenAiGenerator {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: openai::Client::new(&api_key),
            model,
        }
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    fn capabilities(&self) -> GeneratorCapabilities {
        GeneratorCapabilities { streaming: false }
    }

    async fn generate(&self, request: &JobRequest) -> Result<String, ProviderError> {
        let prompt = match &request.prompt {
            Some(prompt) => format!("Write \"{}\".\n\n{}", request.title, prompt),
            None => format!("Write \"{}\".", request.title),
        };

        debug!(model = %self.model, prompt_length = prompt.len(), "calling OpenAI");

        let agent = self
            .client
            .agent(&self.model)
            .preamble("You are a focused writing assistant. Produce only the requested text.")
            .max_tokens(4096)
            .build();

        let response = agent
            .prompt(prompt.as_str())
            .await
            .map_err(|e| ProviderError::Call(e.to_string()))?;

        if response.trim().is_empty() {
            return Err(ProviderError::Call("empty completion".to_string()));
        }
        Ok(response)
    }
}
