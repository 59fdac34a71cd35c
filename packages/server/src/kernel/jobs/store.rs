//! In-memory job store with guarded mutation.
//!
//! Jobs live behind a per-job mutex inside a shared map, so concurrent
//! mutators of the same job are serialized while different jobs do not
//! contend. All writes go through [`JobStore::update`], which applies the
//! mutation to a draft and commits only if the status table and the
//! monotonic-progress rule hold.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use super::job::{Job, JobRequest, JobStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("job {0} not found")]
    NotFound(Uuid),
    #[error("job {id}: invalid transition {from} -> {to}")]
    InvalidTransition {
        id: Uuid,
        from: JobStatus,
        to: JobStatus,
    },
    #[error("job {id}: progress would move backward ({from} -> {to})")]
    ProgressRegression { id: Uuid, from: u8, to: u8 },
    #[error("job id collision on {0}")]
    IdCollision(Uuid),
}

type JobSlot = Arc<Mutex<Job>>;

#[derive(Clone, Default)]
pub struct JobStore {
    jobs: Arc<RwLock<HashMap<Uuid, JobSlot>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new QUEUED job from the request.
    pub fn create(&self, request: JobRequest) -> Result<Job, StoreError> {
        let job = Job::new(request);
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        match jobs.entry(job.id) {
            std::collections::hash_map::Entry::Occupied(_) => Err(StoreError::IdCollision(job.id)),
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(job.clone())));
                Ok(job)
            }
        }
    }

    pub fn get(&self, id: Uuid) -> Result<Job, StoreError> {
        let slot = self.slot(id)?;
        let job = slot.lock().unwrap_or_else(|e| e.into_inner());
        Ok(job.clone())
    }

    /// Apply a mutation under the job's lock.
    ///
    /// The mutator edits a draft; the draft is committed only when it does
    /// not transition out of a terminal status, does not take a transition
    /// outside the status table, and does not move progress backward.
    /// Returns the committed snapshot.
    pub fn update(
        &self,
        id: Uuid,
        mutate: impl FnOnce(&mut Job),
    ) -> Result<Job, StoreError> {
        let slot = self.slot(id)?;
        let mut job = slot.lock().unwrap_or_else(|e| e.into_inner());

        let mut draft = job.clone();
        mutate(&mut draft);

        if draft.status != job.status && !job.status.can_transition_to(draft.status) {
            return Err(StoreError::InvalidTransition {
                id,
                from: job.status,
                to: draft.status,
            });
        }
        if draft.progress_pct < job.progress_pct {
            return Err(StoreError::ProgressRegression {
                id,
                from: job.progress_pct,
                to: draft.progress_pct,
            });
        }

        draft.updated_at = Utc::now();
        *job = draft.clone();
        Ok(draft)
    }

    /// Snapshot of all jobs, optionally filtered by status.
    pub fn list(&self, status: Option<JobStatus>) -> Vec<Job> {
        let slots: Vec<JobSlot> = {
            let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
            jobs.values().cloned().collect()
        };
        slots
            .into_iter()
            .map(|slot| slot.lock().unwrap_or_else(|e| e.into_inner()).clone())
            .filter(|job| status.map(|s| job.status == s).unwrap_or(true))
            .collect()
    }

    /// Drop terminal jobs whose last update is older than the retention
    /// window.
    pub fn evict_terminal(&self, older_than: chrono::Duration) -> usize {
        let cutoff = Utc::now() - older_than;
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        let before = jobs.len();
        jobs.retain(|_, slot| {
            let job = slot.lock().unwrap_or_else(|e| e.into_inner());
            !(job.status.is_terminal() && job.updated_at < cutoff)
        });
        before - jobs.len()
    }

    fn slot(&self, id: Uuid) -> Result<JobSlot, StoreError> {
        self.jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> JobRequest {
        JobRequest::builder()
            .project_id(Uuid::new_v4())
            .title("t")
            .build()
    }

    #[test]
    fn create_and_get_roundtrip() {
        let store = JobStore::new();
        let job = store.create(request()).unwrap();
        assert_eq!(store.get(job.id).unwrap().status, JobStatus::Queued);
        assert!(matches!(
            store.get(Uuid::new_v4()),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn update_commits_legal_transitions() {
        let store = JobStore::new();
        let job = store.create(request()).unwrap();
        let snapshot = store
            .update(job.id, |j| {
                j.status = JobStatus::Streaming;
                j.progress_pct = 25;
            })
            .unwrap();
        assert_eq!(snapshot.status, JobStatus::Streaming);
        assert_eq!(store.get(job.id).unwrap().progress_pct, 25);
    }

    #[test]
    fn update_rejects_illegal_transition() {
        let store = JobStore::new();
        let job = store.create(request()).unwrap();
        let err = store
            .update(job.id, |j| j.status = JobStatus::Completed)
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
        // Rejected update leaves the job untouched
        assert_eq!(store.get(job.id).unwrap().status, JobStatus::Queued);
    }

    #[test]
    fn update_rejects_progress_regression() {
        let store = JobStore::new();
        let job = store.create(request()).unwrap();
        store
            .update(job.id, |j| {
                j.status = JobStatus::Streaming;
                j.progress_pct = 50;
            })
            .unwrap();
        let err = store
            .update(job.id, |j| j.progress_pct = 25)
            .unwrap_err();
        assert!(matches!(err, StoreError::ProgressRegression { .. }));
        assert_eq!(store.get(job.id).unwrap().progress_pct, 50);
    }

    #[test]
    fn terminal_jobs_never_transition_again() {
        let store = JobStore::new();
        let job = store.create(request()).unwrap();
        store
            .update(job.id, |j| j.status = JobStatus::Streaming)
            .unwrap();
        store
            .update(job.id, |j| {
                j.status = JobStatus::Completed;
                j.progress_pct = 100;
            })
            .unwrap();

        let err = store
            .update(job.id, |j| j.status = JobStatus::Streaming)
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }

    #[test]
    fn list_filters_by_status() {
        let store = JobStore::new();
        let a = store.create(request()).unwrap();
        let _b = store.create(request()).unwrap();
        store
            .update(a.id, |j| j.status = JobStatus::Streaming)
            .unwrap();

        assert_eq!(store.list(None).len(), 2);
        assert_eq!(store.list(Some(JobStatus::Streaming)).len(), 1);
        assert_eq!(store.list(Some(JobStatus::Queued)).len(), 1);
    }

    #[test]
    fn evict_drops_only_stale_terminal_jobs() {
        let store = JobStore::new();
        let live = store.create(request()).unwrap();
        let done = store.create(request()).unwrap();
        store
            .update(done.id, |j| j.status = JobStatus::Canceled)
            .unwrap();
        // Backdate the terminal job past the retention window
        {
            let slot = store.slot(done.id).unwrap();
            slot.lock().unwrap().updated_at = Utc::now() - chrono::Duration::hours(2);
        }

        let evicted = store.evict_terminal(chrono::Duration::hours(1));
        assert_eq!(evicted, 1);
        assert!(store.get(live.id).is_ok());
        assert!(matches!(store.get(done.id), Err(StoreError::NotFound(_))));
    }
}
