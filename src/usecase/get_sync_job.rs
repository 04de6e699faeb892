use std::sync::Arc;

use uuid::Uuid;

use crate::domain::entity::{SyncJob, SyncJobItem};
use crate::domain::repository::{SyncJobMetrics, SyncJobRepository};

/// GetSyncJobUseCase は同期ジョブ台帳の参照を担う。
pub struct GetSyncJobUseCase {
    job_repo: Arc<dyn SyncJobRepository>,
}

impl GetSyncJobUseCase {
    pub fn new(job_repo: Arc<dyn SyncJobRepository>) -> Self {
        Self { job_repo }
    }

    /// ジョブと明細を ID で取得する。
    pub async fn get(&self, job_id: Uuid) -> anyhow::Result<Option<(SyncJob, Vec<SyncJobItem>)>> {
        match self.job_repo.find_by_id(job_id).await? {
            Some(job) => {
                let items = self.job_repo.find_items(job_id).await?;
                Ok(Some((job, items)))
            }
            None => Ok(None),
        }
    }

    pub async fn list_by_school(&self, school_id: &str, limit: i64) -> anyhow::Result<Vec<SyncJob>> {
        self.job_repo.list_by_school(school_id, limit).await
    }

    pub async fn metrics(&self, school_id: &str) -> anyhow::Result<SyncJobMetrics> {
        self.job_repo.metrics(school_id).await
    }
}
