//! Idempotency-key admission.
//!
//! A mutating request may carry an idempotency key. The first request with
//! a key wins and runs; a repeat with the same key and the same body gets
//! the recorded response back; the same key with a different body is a
//! conflict. Check-and-claim happens atomically under one lock, so two
//! concurrent requests with the same key can never both run.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::debug;

const MAX_KEY_LEN: usize = 255;

/// Fingerprint of a request body.
///
/// JSON bodies are parsed and re-serialized first, which sorts object keys,
/// so formatting differences do not defeat replay detection. Non-JSON
/// bodies hash as raw bytes.
pub fn fingerprint(body: &[u8]) -> String {
    let normalized: Vec<u8> = match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(value) => value.to_string().into_bytes(),
        Err(_) => body.to_vec(),
    };
    let mut hasher = Sha256::new();
    hasher.update(&normalized);
    format!("{:x}", hasher.finalize())
}

/// Keys are 1-255 characters from `[A-Za-z0-9_-]`.
pub fn valid_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// The response recorded for replay.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

#[derive(Debug)]
pub enum Admission {
    /// First time this key is seen; the caller must run the operation and
    /// then [`IdempotencyGuard::record`] the response with the ticket.
    Fresh(Ticket),
    /// Same key and body seen before; serve this response instead of
    /// running again.
    Replay(StoredResponse),
    /// Same key, different body.
    Conflict,
}

/// Claim on a key, handed back to [`IdempotencyGuard::record`].
#[derive(Debug)]
pub struct Ticket {
    key: String,
}

enum Entry {
    /// Claimed but the operation has not finished yet.
    Pending {
        fingerprint: String,
    },
    Recorded {
        fingerprint: String,
        response: StoredResponse,
        expires_at: DateTime<Utc>,
    },
}

pub struct IdempotencyGuard {
    entries: Mutex<HashMap<String, Entry>>,
    ttl: Duration,
}

impl IdempotencyGuard {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Atomically check the key and claim it if fresh.
    pub fn admit(&self, key: &str, fingerprint: &str) -> Admission {
        let now = Utc::now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        match entries.get(key) {
            Some(Entry::Recorded { expires_at, .. }) if *expires_at <= now => {
                // Expired record; the key is reusable
            }
            Some(Entry::Recorded {
                fingerprint: recorded,
                response,
                ..
            }) => {
                return if recorded == fingerprint {
                    Admission::Replay(response.clone())
                } else {
                    Admission::Conflict
                };
            }
            Some(Entry::Pending {
                fingerprint: claimed,
            }) => {
                // The winner is still running. A matching duplicate gets
                // accepted-and-in-progress semantics rather than a second
                // execution; a mismatched body is a conflict either way.
                return if claimed == fingerprint {
                    Admission::Replay(StoredResponse {
                        status: 202,
                        body: json!({ "status": "accepted" }),
                    })
                } else {
                    Admission::Conflict
                };
            }
            None => {}
        }

        entries.insert(
            key.to_string(),
            Entry::Pending {
                fingerprint: fingerprint.to_string(),
            },
        );
        Admission::Fresh(Ticket {
            key: key.to_string(),
        })
    }

    /// Record the winning response for later replay. Best effort: if the
    /// claim disappeared (swept, restarted), the record is dropped.
    pub fn record(&self, ticket: Ticket, response: StoredResponse) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(&ticket.key) {
            Some(Entry::Pending { fingerprint }) => {
                let fingerprint = fingerprint.clone();
                entries.insert(
                    ticket.key,
                    Entry::Recorded {
                        fingerprint,
                        response,
                        expires_at: Utc::now() + self.ttl,
                    },
                );
            }
            _ => debug!(key = %ticket.key, "idempotency claim vanished before record"),
        }
    }

    /// Release a claim whose operation failed, so a retry can run.
    pub fn release(&self, ticket: Ticket) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if matches!(entries.get(&ticket.key), Some(Entry::Pending { .. })) {
            entries.remove(&ticket.key);
        }
    }

    /// Drop expired records.
    pub fn sweep(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, entry| match entry {
            Entry::Pending { .. } => true,
            Entry::Recorded { expires_at, .. } => *expires_at > now,
        });
        before - entries.len()
    }
}
