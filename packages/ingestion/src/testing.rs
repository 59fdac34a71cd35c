//! Scripted mock stage implementations.
//!
//! These let applications exercise the pipeline without real extraction,
//! OCR or embedding services. All mocks track their calls for assertions.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use crate::error::{IngestError, ProcessingError};
use crate::traits::{Chunk, DocumentSource, Embedder, Extracted, OcrEngine, TextExtractor};

/// A mock text extractor returning a fixed result.
pub struct MockExtractor {
    text: String,
    has_image_content: bool,
    calls: AtomicU32,
}

impl MockExtractor {
    /// Extractor that always yields the given text.
    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            has_image_content: false,
            calls: AtomicU32::new(0),
        }
    }

    /// Extractor that yields no text but reports image content, forcing the
    /// OCR path.
    pub fn image_only() -> Self {
        Self {
            text: String::new(),
            has_image_content: true,
            calls: AtomicU32::new(0),
        }
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextExtractor for MockExtractor {
    async fn extract(&self, _source: &DocumentSource) -> Result<Extracted, IngestError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Extracted {
            text: self.text.clone(),
            has_image_content: self.has_image_content,
        })
    }
}

/// A mock OCR engine returning fixed text.
pub struct MockOcr {
    text: String,
    calls: AtomicU32,
}

impl MockOcr {
    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            calls: AtomicU32::new(0),
        }
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OcrEngine for MockOcr {
    async fn recognize(&self, _source: &DocumentSource) -> Result<String, IngestError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.text.clone())
    }
}

/// A mock embedder that can be scripted to fail a number of times before
/// succeeding, for retry-path tests.
pub struct MockEmbedder {
    fail_remaining: AtomicU32,
    dimension: usize,
    calls: AtomicU32,
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self::failing_times(0)
    }

    /// Fail the first `times` calls with `embedding-service-down`, then
    /// succeed.
    pub fn failing_times(times: u32) -> Self {
        Self {
            fail_remaining: AtomicU32::new(times),
            dimension: 8,
            calls: AtomicU32::new(0),
        }
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>, IngestError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.fail_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(ProcessingError::EmbeddingServiceDown(
                "scripted failure".to_string(),
            )
            .into());
        }
        Ok(chunks.iter().map(|_| vec![0.0; self.dimension]).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn embedder_scripted_failures_then_success() {
        let embedder = MockEmbedder::failing_times(2);
        let chunks = vec![Chunk {
            index: 0,
            text: "x".to_string(),
        }];
        assert!(embedder.embed(&chunks).await.is_err());
        assert!(embedder.embed(&chunks).await.is_err());
        assert!(embedder.embed(&chunks).await.is_ok());
        assert_eq!(embedder.call_count(), 3);
    }

    #[tokio::test]
    async fn extractor_reports_image_content() {
        let extractor = MockExtractor::image_only();
        let source = DocumentSource::new("scan.pdf", vec![0u8; 4]);
        let extracted = extractor.extract(&source).await.unwrap();
        assert!(extracted.text.is_empty());
        assert!(extracted.has_image_content);
        assert_eq!(extractor.call_count(), 1);
    }
}
