//! Built-in stage implementations.
//!
//! Deliberately small: plain-text extraction, word-window chunking and a
//! deterministic local embedder. Deployments with real PDF extraction, OCR
//! or a hosted embedding service implement the traits themselves.

use async_trait::async_trait;

use crate::error::{FileError, IngestError};
use crate::traits::{Chunk, Chunker, DocumentSource, Embedder, Extracted, TextExtractor};

/// Treats the upload as UTF-8 text.
///
/// Bytes that are not valid UTF-8 are reported as image content so the
/// pipeline can hand the document to OCR when an engine is configured.
pub struct Utf8Extractor;

#[async_trait]
impl TextExtractor for Utf8Extractor {
    async fn extract(&self, source: &DocumentSource) -> Result<Extracted, IngestError> {
        match std::str::from_utf8(&source.bytes) {
            Ok(text) => Ok(Extracted {
                text: text.to_string(),
                has_image_content: false,
            }),
            Err(_) => Ok(Extracted {
                text: String::new(),
                has_image_content: true,
            }),
        }
    }
}

/// Splits text into fixed-size word windows.
pub struct WordChunker {
    words_per_chunk: usize,
}

impl WordChunker {
    pub fn new(words_per_chunk: usize) -> Self {
        Self { words_per_chunk }
    }
}

impl Default for WordChunker {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Chunker for WordChunker {
    fn chunk(&self, text: &str) -> Result<Vec<Chunk>, IngestError> {
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.is_empty() {
            return Err(FileError::NoTextFound.into());
        }
        Ok(words
            .chunks(self.words_per_chunk.max(1))
            .enumerate()
            .map(|(index, window)| Chunk {
                index,
                text: window.join(" "),
            })
            .collect())
    }
}

/// Feature-hashing bag-of-words embedder.
///
/// A local fallback when no embedding service is configured: each word is
/// hashed into one of `dimension` buckets and the vector is L2-normalized.
/// Not semantically meaningful, but deterministic and dependency-free.
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>, IngestError> {
        Ok(chunks
            .iter()
            .map(|chunk| {
                let mut vector = vec![0.0f32; self.dimension];
                for word in chunk.text.split_whitespace() {
                    let bucket = bucket_for(word, self.dimension);
                    vector[bucket] += 1.0;
                }
                let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
                if norm > 0.0 {
                    for v in &mut vector {
                        *v /= norm;
                    }
                }
                vector
            })
            .collect())
    }
}

fn bucket_for(word: &str, dimension: usize) -> usize {
    // FNV-1a, cheap and stable across runs.
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in word.to_lowercase().bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100_0000_01b3);
    }
    (hash % dimension as u64) as usize
}
