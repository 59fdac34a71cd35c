//! Stage seams for the ingestion pipeline.
//!
//! Each stage of the pipeline is a trait so implementations can be swapped
//! per deployment (and mocked in tests). The pipeline handles state
//! transitions, retries, and cancellation; implementations handle the
//! actual work.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::IngestError;

/// An uploaded document handed to the pipeline.
#[derive(Debug, Clone)]
pub struct DocumentSource {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl DocumentSource {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: None,
            bytes,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Output of the extraction stage.
#[derive(Debug, Clone)]
pub struct Extracted {
    /// Extracted plain text. May be empty for scanned documents.
    pub text: String,
    /// True when the document contains image content that OCR could read.
    pub has_image_content: bool,
}

/// One chunk of extracted text.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
}

/// A fully processed document ready for indexing.
#[derive(Debug, Clone)]
pub struct IndexedDocument {
    pub project_id: Uuid,
    pub file_name: String,
    pub content_hash: String,
    pub chunks: Vec<Chunk>,
    pub embeddings: Vec<Vec<f32>>,
}

/// Extracts plain text from a document.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, source: &DocumentSource) -> Result<Extracted, IngestError>;
}

/// Recognizes text in image content. Only invoked when extraction yields no
/// text but reports image content.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(&self, source: &DocumentSource) -> Result<String, IngestError>;
}

/// Splits extracted text into chunks for embedding.
pub trait Chunker: Send + Sync {
    fn chunk(&self, text: &str) -> Result<Vec<Chunk>, IngestError>;
}

/// Generates embedding vectors for chunks.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>, IngestError>;
}

/// Document storage and content-addressed lookup.
#[async_trait]
pub trait DocumentIndex: Send + Sync {
    /// Look up an already-indexed document by project and content hash.
    async fn find_by_hash(
        &self,
        project_id: Uuid,
        content_hash: &str,
    ) -> Result<Option<Uuid>, IngestError>;

    /// Store a processed document, returning its document id.
    async fn store(&self, document: IndexedDocument) -> Result<Uuid, IngestError>;
}
