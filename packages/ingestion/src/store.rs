//! In-memory registry of ingestion jobs.
//!
//! Keyed by job id. The lock is held only for map access and quick record
//! mutation, never across a stage await.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use uuid::Uuid;

use crate::job::IngestionJob;

/// Concurrency-safe registry of ingestion jobs.
#[derive(Clone, Default)]
pub struct IngestionStore {
    jobs: Arc<RwLock<HashMap<Uuid, IngestionJob>>>,
}

impl IngestionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, job: IngestionJob) {
        self.jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(job.id, job);
    }

    pub fn get(&self, id: Uuid) -> Option<IngestionJob> {
        self.jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned()
    }

    /// Apply a mutation to one job under the write lock.
    ///
    /// Returns `None` if the job does not exist; otherwise the mutator's
    /// result together with a snapshot of the updated record.
    pub fn update<T>(
        &self,
        id: Uuid,
        mutate: impl FnOnce(&mut IngestionJob) -> T,
    ) -> Option<(T, IngestionJob)> {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        let job = jobs.get_mut(&id)?;
        let out = mutate(job);
        Some((out, job.clone()))
    }

    /// Snapshot of all jobs; does not block writers while callers iterate.
    pub fn list(&self) -> Vec<IngestionJob> {
        self.jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    /// Drop settled jobs older than the retention window.
    pub fn evict_settled(&self, older_than: chrono::Duration) {
        let cutoff = chrono::Utc::now() - older_than;
        self.jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|_, job| !(job.is_settled() && job.updated_at < cutoff));
    }
}
