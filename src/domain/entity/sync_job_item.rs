use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// SyncItemType は同期対象の種別。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncItemType {
    Class,
    Student,
}

impl SyncItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncItemType::Class => "class",
            SyncItemType::Student => "student",
        }
    }

    pub fn from_str_value(s: &str) -> anyhow::Result<Self> {
        match s {
            "class" => Ok(Self::Class),
            "student" => Ok(Self::Student),
            _ => anyhow::bail!("invalid sync item type: {}", s),
        }
    }
}

/// SyncItemStatus は同期対象 1 件の処理結果。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncItemStatus {
    Pending,
    Created,
    Updated,
    Skipped,
    Failed,
}

impl SyncItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncItemStatus::Pending => "pending",
            SyncItemStatus::Created => "created",
            SyncItemStatus::Updated => "updated",
            SyncItemStatus::Skipped => "skipped",
            SyncItemStatus::Failed => "failed",
        }
    }

    pub fn from_str_value(s: &str) -> anyhow::Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "created" => Ok(Self::Created),
            "updated" => Ok(Self::Updated),
            "skipped" => Ok(Self::Skipped),
            "failed" => Ok(Self::Failed),
            _ => anyhow::bail!("invalid sync item status: {}", s),
        }
    }
}

/// SyncJobItem は同期ジョブ内で処理したクラスまたは生徒 1 件の記録。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncJobItem {
    pub id: Uuid,
    pub job_id: Uuid,
    pub item_type: SyncItemType,
    pub external_id: Option<String>,
    pub internal_id: Option<String>,
    pub name: String,
    pub status: SyncItemStatus,
    pub details: serde_json::Value,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SyncJobItem {
    pub fn new(job_id: Uuid, item_type: SyncItemType, name: String, status: SyncItemStatus) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            item_type,
            external_id: None,
            internal_id: None,
            name,
            status,
            details: serde_json::Value::Null,
            error: None,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_external_id(mut self, external_id: Option<String>) -> Self {
        self.external_id = external_id;
        self
    }

    #[must_use]
    pub fn with_internal_id(mut self, internal_id: Option<String>) -> Self {
        self.internal_id = internal_id;
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_fields() {
        let job_id = Uuid::new_v4();
        let item = SyncJobItem::new(job_id, SyncItemType::Student, "Ana".to_string(), SyncItemStatus::Failed)
            .with_external_id(Some("123".to_string()))
            .with_error("create failed");
        assert_eq!(item.job_id, job_id);
        assert_eq!(item.external_id.as_deref(), Some("123"));
        assert!(item.internal_id.is_none());
        assert_eq!(item.error.as_deref(), Some("create failed"));
    }

    #[test]
    fn test_item_enums_from_str() {
        assert_eq!(SyncItemType::from_str_value("class").unwrap(), SyncItemType::Class);
        assert_eq!(SyncItemStatus::from_str_value("skipped").unwrap(), SyncItemStatus::Skipped);
        assert!(SyncItemStatus::from_str_value("done").is_err());
    }
}
