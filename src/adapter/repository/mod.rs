pub mod sync_job_in_memory;
pub mod sync_job_postgres;

pub use sync_job_in_memory::InMemorySyncJobRepository;
pub use sync_job_postgres::SyncJobPostgresRepository;
