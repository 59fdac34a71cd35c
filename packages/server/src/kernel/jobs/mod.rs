pub mod events;
pub mod job;
pub mod manager;
pub mod store;

pub use events::JobEvent;
pub use job::{GenerationResult, Job, JobError, JobRequest, JobStatus};
pub use manager::{DisconnectPolicy, JobManager, JobManagerConfig};
pub use store::{JobStore, StoreError};
