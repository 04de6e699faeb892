use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// SyncJobType は同期ジョブの種別を表す。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncJobType {
    Classes,
    Students,
    All,
}

impl SyncJobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncJobType::Classes => "classes",
            SyncJobType::Students => "students",
            SyncJobType::All => "all",
        }
    }

    pub fn from_str_value(s: &str) -> anyhow::Result<Self> {
        match s {
            "classes" => Ok(Self::Classes),
            "students" => Ok(Self::Students),
            "all" => Ok(Self::All),
            _ => anyhow::bail!("invalid sync job type: {}", s),
        }
    }
}

impl std::fmt::Display for SyncJobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SyncJobStatus は同期ジョブの状態を表す。
/// 遷移は pending → processing → {completed | failed} のみで、終端状態からは遷移しない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncJobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl SyncJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncJobStatus::Pending => "pending",
            SyncJobStatus::Processing => "processing",
            SyncJobStatus::Completed => "completed",
            SyncJobStatus::Failed => "failed",
        }
    }

    pub fn from_str_value(s: &str) -> anyhow::Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => anyhow::bail!("invalid sync job status: {}", s),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncJobStatus::Completed | SyncJobStatus::Failed)
    }
}

impl std::fmt::Display for SyncJobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ItemCounts はジョブ終了時に記録する件数集計。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemCounts {
    pub total: i32,
    pub created: i32,
    pub updated: i32,
    pub failed: i32,
}

impl ItemCounts {
    /// 2 つの集計を合算する。
    #[must_use]
    pub fn merge(self, other: ItemCounts) -> ItemCounts {
        ItemCounts {
            total: self.total + other.total,
            created: self.created + other.created,
            updated: self.updated + other.updated,
            failed: self.failed + other.failed,
        }
    }
}

/// SyncJob は名簿同期の 1 回分の実行記録。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncJob {
    pub id: Uuid,
    pub school_id: String,
    pub user_id: String,
    pub job_type: SyncJobType,
    pub status: SyncJobStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub total_items: i32,
    pub created_items: i32,
    pub updated_items: i32,
    pub failed_items: i32,
    pub error: Option<String>,
    pub result: Option<serde_json::Value>,
}

impl SyncJob {
    /// 新しい SyncJob を pending 状態で作成する。
    pub fn new(school_id: String, user_id: String, job_type: SyncJobType) -> Self {
        Self {
            id: Uuid::new_v4(),
            school_id,
            user_id,
            job_type,
            status: SyncJobStatus::Pending,
            start_time: Utc::now(),
            end_time: None,
            total_items: 0,
            created_items: 0,
            updated_items: 0,
            failed_items: 0,
            error: None,
            result: None,
        }
    }

    /// 処理を開始する。pending 以外からは遷移しない。
    pub fn start(&mut self) -> anyhow::Result<()> {
        if self.status != SyncJobStatus::Pending {
            anyhow::bail!("sync job {} cannot start from status {}", self.id, self.status);
        }
        self.status = SyncJobStatus::Processing;
        self.start_time = Utc::now();
        Ok(())
    }

    /// 件数と結果サマリを記録して completed にする。
    /// 作成・更新・失敗の合計が total を超える集計は拒否する。
    pub fn complete(&mut self, counts: ItemCounts, result: serde_json::Value) -> anyhow::Result<()> {
        self.ensure_processing()?;
        if counts.created < 0 || counts.updated < 0 || counts.failed < 0 {
            anyhow::bail!("sync job {} received negative item counts", self.id);
        }
        if counts.created + counts.updated + counts.failed > counts.total {
            anyhow::bail!(
                "sync job {}: created({}) + updated({}) + failed({}) exceeds total({})",
                self.id,
                counts.created,
                counts.updated,
                counts.failed,
                counts.total
            );
        }
        self.total_items = counts.total;
        self.created_items = counts.created;
        self.updated_items = counts.updated;
        self.failed_items = counts.failed;
        self.result = Some(result);
        self.status = SyncJobStatus::Completed;
        self.end_time = Some(Utc::now());
        Ok(())
    }

    /// 回復不能なエラーでジョブを failed にする。
    pub fn fail(&mut self, error: String) -> anyhow::Result<()> {
        self.ensure_processing()?;
        self.error = Some(error);
        self.status = SyncJobStatus::Failed;
        self.end_time = Some(Utc::now());
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn ensure_processing(&self) -> anyhow::Result<()> {
        if self.status != SyncJobStatus::Processing {
            anyhow::bail!(
                "sync job {} is not processing (status: {})",
                self.id,
                self.status
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_job() -> SyncJob {
        SyncJob::new("school-1".to_string(), "user-1".to_string(), SyncJobType::Classes)
    }

    #[test]
    fn test_new_job_is_pending() {
        let job = make_job();
        assert_eq!(job.status, SyncJobStatus::Pending);
        assert!(job.end_time.is_none());
        assert_eq!(job.total_items, 0);
    }

    #[test]
    fn test_complete_records_counts() {
        let mut job = make_job();
        job.start().unwrap();
        let counts = ItemCounts { total: 3, created: 2, updated: 0, failed: 1 };
        job.complete(counts, serde_json::json!({"ok": true})).unwrap();
        assert_eq!(job.status, SyncJobStatus::Completed);
        assert_eq!(job.created_items, 2);
        assert_eq!(job.failed_items, 1);
        assert!(job.end_time.is_some());
    }

    #[test]
    fn test_complete_rejects_counts_over_total() {
        let mut job = make_job();
        job.start().unwrap();
        let counts = ItemCounts { total: 1, created: 1, updated: 1, failed: 0 };
        assert!(job.complete(counts, serde_json::json!({})).is_err());
        assert_eq!(job.status, SyncJobStatus::Processing);
    }

    #[test]
    fn test_terminal_state_is_absorbing() {
        let mut job = make_job();
        job.start().unwrap();
        job.fail("boom".to_string()).unwrap();
        assert!(job.is_terminal());
        assert!(job.complete(ItemCounts::default(), serde_json::json!({})).is_err());
        assert!(job.fail("again".to_string()).is_err());
        assert!(job.start().is_err());
        assert_eq!(job.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_complete_requires_processing() {
        let mut job = make_job();
        assert!(job.complete(ItemCounts::default(), serde_json::json!({})).is_err());
    }

    #[test]
    fn test_status_round_trip_strings() {
        for status in [
            SyncJobStatus::Pending,
            SyncJobStatus::Processing,
            SyncJobStatus::Completed,
            SyncJobStatus::Failed,
        ] {
            assert_eq!(SyncJobStatus::from_str_value(status.as_str()).unwrap(), status);
        }
        assert!(SyncJobStatus::from_str_value("unknown").is_err());
        assert_eq!(SyncJobType::from_str_value("all").unwrap(), SyncJobType::All);
    }

    #[test]
    fn test_item_counts_merge() {
        let a = ItemCounts { total: 2, created: 1, updated: 0, failed: 1 };
        let b = ItemCounts { total: 3, created: 1, updated: 1, failed: 0 };
        assert_eq!(a.merge(b), ItemCounts { total: 5, created: 2, updated: 1, failed: 1 });
    }
}
