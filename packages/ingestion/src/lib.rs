//! Document Ingestion Pipeline
//!
//! A library that takes an uploaded document through extraction, optional
//! OCR, chunking and embedding until it is indexed and queryable. Each
//! ingestion runs as a job with a finer-grained state machine than the
//! generation jobs in the server kernel: every stage has a fixed progress
//! percentage, failures land in stage-specific states, and bounded retries
//! move a failed job back into the stage that failed.
//!
//! # Usage
//!
//! ```rust,ignore
//! use ingestion::{IngestionPipeline, PipelineConfig, DocumentSource};
//! use ingestion::stages::{Utf8Extractor, WordChunker};
//!
//! let pipeline = IngestionPipeline::new(deps, PipelineConfig::default());
//! match pipeline.submit(project_id, &source).await? {
//!     Submission::Existing { document_id } => { /* already indexed */ }
//!     Submission::Accepted { job } => {
//!         pipeline.run(job.id, source, cancel_token).await;
//!     }
//! }
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Stage seams (TextExtractor, OcrEngine, Chunker, Embedder, DocumentIndex)
//! - [`state`] - The ingestion state machine and its transition table
//! - [`job`] - The IngestionJob record and guarded transitions
//! - [`pipeline`] - The stage driver with cancellation and bounded retries
//! - [`stages`] - Built-in plain-text stage implementations
//! - [`stores`] - In-memory document index
//! - [`testing`] - Scripted mock implementations for testing

pub mod error;
pub mod hash;
pub mod job;
pub mod pipeline;
pub mod stages;
pub mod state;
pub mod store;
pub mod stores;
pub mod testing;
pub mod traits;

pub use error::{
    FileError, IngestError, IngestErrorCode, OcrError, ProcessingError, StorageError,
};
pub use hash::content_hash;
pub use job::{IngestionJob, IngestionStatus, TransitionError};
pub use pipeline::{IngestionPipeline, PipelineConfig, PipelineDeps, Submission};
pub use stages::{HashingEmbedder, Utf8Extractor, WordChunker};
pub use state::IngestState;
pub use store::IngestionStore;
pub use stores::MemoryIndex;
pub use traits::{
    Chunk, Chunker, DocumentIndex, DocumentSource, Embedder, Extracted, IndexedDocument,
    OcrEngine, TextExtractor,
};

/// Result type alias for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestError>;
