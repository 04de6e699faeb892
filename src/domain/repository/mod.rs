pub mod sync_job_repository;

pub use sync_job_repository::{SyncJobMetrics, SyncJobRepository};
