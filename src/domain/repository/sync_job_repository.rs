use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::entity::{SyncJob, SyncJobItem};

/// SyncJobMetrics は学校単位の同期ジョブ集計。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncJobMetrics {
    pub total_jobs: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    pub created_items: i64,
    pub updated_items: i64,
    pub failed_items: i64,
}

/// SyncJobRepository は同期ジョブ台帳の永続化トレイト。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SyncJobRepository: Send + Sync {
    /// 新しいジョブを登録する。
    async fn create(&self, job: &SyncJob) -> anyhow::Result<()>;

    /// 終端状態のジョブを保存する。保存済みジョブが processing でなければエラー。
    async fn finalize(&self, job: &SyncJob) -> anyhow::Result<()>;

    /// ジョブ明細を追加する。ジョブが終端状態ならエラー。
    async fn add_items(&self, job_id: Uuid, items: &[SyncJobItem]) -> anyhow::Result<()>;

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<SyncJob>>;

    async fn find_items(&self, job_id: Uuid) -> anyhow::Result<Vec<SyncJobItem>>;

    /// 学校のジョブを開始日時の新しい順に返す。
    async fn list_by_school(&self, school_id: &str, limit: i64) -> anyhow::Result<Vec<SyncJob>>;

    async fn metrics(&self, school_id: &str) -> anyhow::Result<SyncJobMetrics>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::SyncJobType;

    #[tokio::test]
    async fn test_mock_find_by_id() {
        let mut mock = MockSyncJobRepository::new();
        let job = SyncJob::new("s1".to_string(), "u1".to_string(), SyncJobType::All);
        let id = job.id;
        let returned = job.clone();
        mock.expect_find_by_id()
            .withf(move |i| *i == id)
            .returning(move |_| Ok(Some(returned.clone())));

        let result = mock.find_by_id(id).await.unwrap();
        assert_eq!(result.unwrap().school_id, "s1");
    }

    #[tokio::test]
    async fn test_mock_metrics() {
        let mut mock = MockSyncJobRepository::new();
        mock.expect_metrics().returning(|_| {
            Ok(SyncJobMetrics {
                total_jobs: 2,
                completed: 2,
                ..Default::default()
            })
        });

        let metrics = mock.metrics("s1").await.unwrap();
        assert_eq!(metrics.total_jobs, 2);
        assert_eq!(metrics.failed, 0);
    }
}
