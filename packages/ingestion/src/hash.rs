//! Content hashing for duplicate detection.
//!
//! A document is identified by the SHA-256 of its raw bytes. If a document
//! with the same hash is already indexed for a project, ingestion is
//! short-circuited and the existing document is returned.

use sha2::{Digest, Sha256};

/// SHA-256 of the document bytes, hex-encoded.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_bytes_same_hash() {
        assert_eq!(content_hash(b"hello world"), content_hash(b"hello world"));
    }

    #[test]
    fn different_bytes_different_hash() {
        assert_ne!(content_hash(b"hello world"), content_hash(b"hello worlds"));
    }

    #[test]
    fn hash_is_64_hex_chars() {
        let hash = content_hash(b"anything");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn empty_input_still_hashes() {
        assert_eq!(content_hash(b"").len(), 64);
    }
}
