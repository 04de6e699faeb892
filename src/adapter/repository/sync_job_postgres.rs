use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entity::{
    SyncItemStatus, SyncItemType, SyncJob, SyncJobItem, SyncJobStatus, SyncJobType,
};
use crate::domain::repository::{SyncJobMetrics, SyncJobRepository};

/// SyncJobPostgresRepository は PostgreSQL 実装の同期ジョブ台帳。
pub struct SyncJobPostgresRepository {
    pool: PgPool,
}

impl SyncJobPostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SyncJobRepository for SyncJobPostgresRepository {
    async fn create(&self, job: &SyncJob) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO roster_sync.sync_jobs
                (id, school_id, user_id, job_type, status, start_time, end_time,
                 total_items, created_items, updated_items, failed_items, error, result)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(job.id)
        .bind(&job.school_id)
        .bind(&job.user_id)
        .bind(job.job_type.as_str())
        .bind(job.status.as_str())
        .bind(job.start_time)
        .bind(job.end_time)
        .bind(job.total_items)
        .bind(job.created_items)
        .bind(job.updated_items)
        .bind(job.failed_items)
        .bind(&job.error)
        .bind(&job.result)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn finalize(&self, job: &SyncJob) -> anyhow::Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE roster_sync.sync_jobs
            SET status = $2, end_time = $3, total_items = $4, created_items = $5,
                updated_items = $6, failed_items = $7, error = $8, result = $9
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(job.id)
        .bind(job.status.as_str())
        .bind(job.end_time)
        .bind(job.total_items)
        .bind(job.created_items)
        .bind(job.updated_items)
        .bind(job.failed_items)
        .bind(&job.error)
        .bind(&job.result)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            anyhow::bail!("sync job {} not found or already finalized", job.id);
        }
        Ok(())
    }

    async fn add_items(&self, job_id: Uuid, items: &[SyncJobItem]) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        // 行ロックで終端化との競合を防ぐ
        let status: Option<String> = sqlx::query_scalar(
            "SELECT status FROM roster_sync.sync_jobs WHERE id = $1 FOR UPDATE",
        )
        .bind(job_id)
        .fetch_optional(&mut *tx)
        .await?;
        let status = status.ok_or_else(|| anyhow::anyhow!("sync job not found: {}", job_id))?;
        if SyncJobStatus::from_str_value(&status)?.is_terminal() {
            anyhow::bail!("sync job {} is {}, items are frozen", job_id, status);
        }

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO roster_sync.sync_job_items
                    (id, job_id, item_type, external_id, internal_id, name, status, details, error, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(item.id)
            .bind(job_id)
            .bind(item.item_type.as_str())
            .bind(&item.external_id)
            .bind(&item.internal_id)
            .bind(&item.name)
            .bind(item.status.as_str())
            .bind(&item.details)
            .bind(&item.error)
            .bind(item.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<SyncJob>> {
        let row = sqlx::query_as::<_, SyncJobRow>(
            r#"
            SELECT id, school_id, user_id, job_type, status, start_time, end_time,
                   total_items, created_items, updated_items, failed_items, error, result
            FROM roster_sync.sync_jobs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn find_items(&self, job_id: Uuid) -> anyhow::Result<Vec<SyncJobItem>> {
        let rows = sqlx::query_as::<_, SyncJobItemRow>(
            r#"
            SELECT id, job_id, item_type, external_id, internal_id, name, status, details, error, created_at
            FROM roster_sync.sync_job_items
            WHERE job_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_by_school(&self, school_id: &str, limit: i64) -> anyhow::Result<Vec<SyncJob>> {
        let rows = sqlx::query_as::<_, SyncJobRow>(
            r#"
            SELECT id, school_id, user_id, job_type, status, start_time, end_time,
                   total_items, created_items, updated_items, failed_items, error, result
            FROM roster_sync.sync_jobs
            WHERE school_id = $1
            ORDER BY start_time DESC
            LIMIT $2
            "#,
        )
        .bind(school_id)
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn metrics(&self, school_id: &str) -> anyhow::Result<SyncJobMetrics> {
        let row = sqlx::query_as::<_, MetricsRow>(
            r#"
            SELECT
                COUNT(*)                                          AS total_jobs,
                COUNT(*) FILTER (WHERE status = 'processing')     AS processing,
                COUNT(*) FILTER (WHERE status = 'completed')      AS completed,
                COUNT(*) FILTER (WHERE status = 'failed')         AS failed,
                COALESCE(SUM(created_items), 0)::BIGINT           AS created_items,
                COALESCE(SUM(updated_items), 0)::BIGINT           AS updated_items,
                COALESCE(SUM(failed_items), 0)::BIGINT            AS failed_items
            FROM roster_sync.sync_jobs
            WHERE school_id = $1
            "#,
        )
        .bind(school_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(SyncJobMetrics {
            total_jobs: row.total_jobs,
            processing: row.processing,
            completed: row.completed,
            failed: row.failed,
            created_items: row.created_items,
            updated_items: row.updated_items,
            failed_items: row.failed_items,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SyncJobRow {
    id: Uuid,
    school_id: String,
    user_id: String,
    job_type: String,
    status: String,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    total_items: i32,
    created_items: i32,
    updated_items: i32,
    failed_items: i32,
    error: Option<String>,
    result: Option<serde_json::Value>,
}

impl TryFrom<SyncJobRow> for SyncJob {
    type Error = anyhow::Error;

    fn try_from(row: SyncJobRow) -> Result<Self, Self::Error> {
        Ok(SyncJob {
            id: row.id,
            school_id: row.school_id,
            user_id: row.user_id,
            job_type: SyncJobType::from_str_value(&row.job_type)?,
            status: SyncJobStatus::from_str_value(&row.status)?,
            start_time: row.start_time,
            end_time: row.end_time,
            total_items: row.total_items,
            created_items: row.created_items,
            updated_items: row.updated_items,
            failed_items: row.failed_items,
            error: row.error,
            result: row.result,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SyncJobItemRow {
    id: Uuid,
    job_id: Uuid,
    item_type: String,
    external_id: Option<String>,
    internal_id: Option<String>,
    name: String,
    status: String,
    details: serde_json::Value,
    error: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<SyncJobItemRow> for SyncJobItem {
    type Error = anyhow::Error;

    fn try_from(row: SyncJobItemRow) -> Result<Self, Self::Error> {
        Ok(SyncJobItem {
            id: row.id,
            job_id: row.job_id,
            item_type: SyncItemType::from_str_value(&row.item_type)?,
            external_id: row.external_id,
            internal_id: row.internal_id,
            name: row.name,
            status: SyncItemStatus::from_str_value(&row.status)?,
            details: row.details,
            error: row.error,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MetricsRow {
    total_jobs: i64,
    processing: i64,
    completed: i64,
    failed: i64,
    created_items: i64,
    updated_items: i64,
    failed_items: i64,
}
