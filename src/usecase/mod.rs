pub mod get_sync_job;
pub mod import_roster;
pub mod reconcile_classes;
pub mod reconcile_students;
pub mod resolve_roster;

pub use get_sync_job::GetSyncJobUseCase;
pub use import_roster::{ImportError, ImportOutcome, ImportRequest, ImportRosterUseCase};
pub use reconcile_classes::{ClassCreationReport, ClassOutcome, ReconcileClassesUseCase};
pub use reconcile_students::{ReconcileStudentsUseCase, StudentBatch, StudentOutcome, StudentReconcileReport};
pub use resolve_roster::{ResolveRosterUseCase, SourceError};
