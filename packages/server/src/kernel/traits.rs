//! The provider seam.
//!
//! A [`Generator`] produces content for a job request, either in one shot
//! or as a stream of fragments. Implementations advertise what they can do
//! through [`GeneratorCapabilities`] so the job manager can pick the right
//! drive loop without downcasting.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::kernel::jobs::job::JobRequest;

/// Known provider families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    OpenAi,
    /// Local deterministic generator; always available, no credentials.
    Echo,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::OpenAi, ProviderKind::Echo];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "open_ai",
            ProviderKind::Echo => "echo",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider call failed: {0}")]
    Call(String),
    #[error("provider timed out")]
    Timeout,
    #[error("provider not configured: {0}")]
    NotConfigured(String),
}

/// A piece of generated content emitted mid-stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub text: String,
}

impl Fragment {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<Fragment, ProviderError>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratorCapabilities {
    pub streaming: bool,
}

#[async_trait]
pub trait Generator: Send + Sync {
    fn capabilities(&self) -> GeneratorCapabilities;

    /// One-shot generation of the full content.
    async fn generate(&self, request: &JobRequest) -> Result<String, ProviderError>;

    /// Streamed generation. The default wraps [`Generator::generate`] in a
    /// single-fragment stream, so non-streaming providers only implement
    /// the one-shot path.
    async fn generate_stream(&self, request: &JobRequest) -> Result<FragmentStream, ProviderError> {
        let content = self.generate(request).await?;
        Ok(Box::pin(futures::stream::once(async move {
            Ok(Fragment::new(content))
        })))
    }
}
