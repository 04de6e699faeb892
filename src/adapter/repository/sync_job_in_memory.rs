use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::entity::{SyncJob, SyncJobItem, SyncJobStatus};
use crate::domain::repository::{SyncJobMetrics, SyncJobRepository};

/// InMemorySyncJobRepository はインメモリの同期ジョブ台帳。
/// データベース未設定時と統合テストで使用する。
pub struct InMemorySyncJobRepository {
    jobs: RwLock<Vec<SyncJob>>,
    items: RwLock<Vec<SyncJobItem>>,
}

impl InMemorySyncJobRepository {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(Vec::new()),
            items: RwLock::new(Vec::new()),
        }
    }

    /// 登録済みの全ジョブを返す（テスト用）。
    pub async fn all_jobs(&self) -> Vec<SyncJob> {
        self.jobs.read().await.clone()
    }
}

impl Default for InMemorySyncJobRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SyncJobRepository for InMemorySyncJobRepository {
    async fn create(&self, job: &SyncJob) -> anyhow::Result<()> {
        let mut jobs = self.jobs.write().await;
        if jobs.iter().any(|j| j.id == job.id) {
            anyhow::bail!("sync job already exists: {}", job.id);
        }
        jobs.push(job.clone());
        Ok(())
    }

    async fn finalize(&self, job: &SyncJob) -> anyhow::Result<()> {
        let mut jobs = self.jobs.write().await;
        let stored = jobs
            .iter_mut()
            .find(|j| j.id == job.id)
            .ok_or_else(|| anyhow::anyhow!("sync job not found: {}", job.id))?;
        if stored.status != SyncJobStatus::Processing {
            anyhow::bail!("sync job {} already finalized as {}", job.id, stored.status);
        }
        *stored = job.clone();
        Ok(())
    }

    async fn add_items(&self, job_id: Uuid, items: &[SyncJobItem]) -> anyhow::Result<()> {
        {
            let jobs = self.jobs.read().await;
            let job = jobs
                .iter()
                .find(|j| j.id == job_id)
                .ok_or_else(|| anyhow::anyhow!("sync job not found: {}", job_id))?;
            if job.is_terminal() {
                anyhow::bail!("sync job {} is {}, items are frozen", job_id, job.status);
            }
        }
        self.items.write().await.extend(items.iter().cloned());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<SyncJob>> {
        let jobs = self.jobs.read().await;
        Ok(jobs.iter().find(|j| j.id == id).cloned())
    }

    async fn find_items(&self, job_id: Uuid) -> anyhow::Result<Vec<SyncJobItem>> {
        let items = self.items.read().await;
        Ok(items.iter().filter(|i| i.job_id == job_id).cloned().collect())
    }

    async fn list_by_school(&self, school_id: &str, limit: i64) -> anyhow::Result<Vec<SyncJob>> {
        let jobs = self.jobs.read().await;
        let mut matched: Vec<SyncJob> = jobs
            .iter()
            .filter(|j| j.school_id == school_id)
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        matched.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
        Ok(matched)
    }

    async fn metrics(&self, school_id: &str) -> anyhow::Result<SyncJobMetrics> {
        let jobs = self.jobs.read().await;
        let metrics = jobs
            .iter()
            .filter(|j| j.school_id == school_id)
            .fold(SyncJobMetrics::default(), |mut m, job| {
                m.total_jobs += 1;
                match job.status {
                    SyncJobStatus::Processing => m.processing += 1,
                    SyncJobStatus::Completed => m.completed += 1,
                    SyncJobStatus::Failed => m.failed += 1,
                    SyncJobStatus::Pending => {}
                }
                m.created_items += i64::from(job.created_items);
                m.updated_items += i64::from(job.updated_items);
                m.failed_items += i64::from(job.failed_items);
                m
            });
        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::{ItemCounts, SyncItemStatus, SyncItemType, SyncJobType};

    fn processing_job(school_id: &str) -> SyncJob {
        let mut job = SyncJob::new(school_id.to_string(), "u1".to_string(), SyncJobType::Classes);
        job.start().unwrap();
        job
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let repo = InMemorySyncJobRepository::new();
        let job = processing_job("s1");
        repo.create(&job).await.unwrap();

        let found = repo.find_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(found.status, SyncJobStatus::Processing);
        assert!(repo.create(&job).await.is_err());
    }

    #[tokio::test]
    async fn test_finalize_only_once() {
        let repo = InMemorySyncJobRepository::new();
        let mut job = processing_job("s1");
        repo.create(&job).await.unwrap();

        job.complete(ItemCounts { total: 1, created: 1, updated: 0, failed: 0 }, serde_json::json!({}))
            .unwrap();
        repo.finalize(&job).await.unwrap();
        assert!(repo.finalize(&job).await.is_err());
    }

    #[tokio::test]
    async fn test_items_frozen_after_terminal() {
        let repo = InMemorySyncJobRepository::new();
        let mut job = processing_job("s1");
        repo.create(&job).await.unwrap();

        let item = SyncJobItem::new(job.id, SyncItemType::Class, "6M01".to_string(), SyncItemStatus::Created);
        repo.add_items(job.id, &[item.clone()]).await.unwrap();

        job.fail("boom".to_string()).unwrap();
        repo.finalize(&job).await.unwrap();
        assert!(repo.add_items(job.id, &[item]).await.is_err());
        assert_eq!(repo.find_items(job.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_and_metrics_by_school() {
        let repo = InMemorySyncJobRepository::new();
        let mut done = processing_job("s1");
        repo.create(&done).await.unwrap();
        done.complete(ItemCounts { total: 3, created: 2, updated: 0, failed: 1 }, serde_json::json!({}))
            .unwrap();
        repo.finalize(&done).await.unwrap();
        repo.create(&processing_job("s1")).await.unwrap();
        repo.create(&processing_job("s2")).await.unwrap();

        assert_eq!(repo.list_by_school("s1", 10).await.unwrap().len(), 2);
        assert_eq!(repo.list_by_school("s1", 1).await.unwrap().len(), 1);

        let metrics = repo.metrics("s1").await.unwrap();
        assert_eq!(metrics.total_jobs, 2);
        assert_eq!(metrics.completed, 1);
        assert_eq!(metrics.processing, 1);
        assert_eq!(metrics.created_items, 2);
        assert_eq!(metrics.failed_items, 1);
    }
}
