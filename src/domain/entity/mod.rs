pub mod roster;
pub mod school_class;
pub mod student;
pub mod sync_job;
pub mod sync_job_item;

pub use roster::{PhoneInput, RawStudentRow, RosterClass, RosterSnapshot, SnapshotMetadata, SnapshotSource};
pub use school_class::{ClassDiff, ExistingClass, ProcessedClass, Shift};
pub use student::{ExistingStudent, NewStudent, ProcessedStudent, StudentContext, StudentPatch};
pub use sync_job::{ItemCounts, SyncJob, SyncJobStatus, SyncJobType};
pub use sync_job_item::{SyncItemStatus, SyncItemType, SyncJobItem};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// ItemError はクラス・生徒 1 件分の処理失敗。バッチ全体は中断しない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemError {
    pub name: String,
    pub message: String,
}

impl ItemError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ItemError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

/// 内部システムの ID は数値・文字列のどちらでも返り得るため文字列に揃える。
pub(crate) fn id_value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    id_value_to_string(&value).ok_or_else(|| serde::de::Error::custom("expected string or numeric id"))
}

pub(crate) fn opt_id_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(id_value_to_string))
}
