use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// スナップショット内でメタデータ用に予約されたキー。
pub const METADATA_KEY: &str = "metadata";

/// SnapshotSource はスナップショットを取得した経路。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotSource {
    Cache,
    Remote,
    Empty,
}

/// SnapshotMetadata はスナップショットのバージョン・鮮度情報。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub generated_at: Option<DateTime<Utc>>,
    #[serde(default = "default_source")]
    pub source: SnapshotSource,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub stale: bool,
}

fn default_source() -> SnapshotSource {
    SnapshotSource::Remote
}

impl Default for SnapshotMetadata {
    fn default() -> Self {
        Self {
            version: None,
            generated_at: None,
            source: SnapshotSource::Remote,
            message: None,
            stale: false,
        }
    }
}

/// PhoneInput は名簿行の電話番号表現（単一・`|` 区切り・配列）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PhoneInput {
    Single(String),
    List(Vec<String>),
}

impl Default for PhoneInput {
    fn default() -> Self {
        PhoneInput::Single(String::new())
    }
}

/// RawStudentRow は外部名簿システムから受け取った生徒 1 行（未正規化）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawStudentRow {
    #[serde(alias = "nome")]
    pub name: String,
    #[serde(default, alias = "phone", alias = "telefone", alias = "telefones")]
    pub phones: PhoneInput,
    #[serde(default, alias = "data_nascimento", alias = "dataNascimento")]
    pub birthdate: Option<String>,
    #[serde(default, alias = "sexo")]
    pub gender: Option<String>,
    #[serde(
        default,
        alias = "matricula",
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub registration: Option<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// RosterClass はスナップショット内の 1 クラス分（クラスコードと生徒行）。
#[derive(Debug, Clone, PartialEq)]
pub struct RosterClass {
    pub name: String,
    pub rows: Vec<RawStudentRow>,
}

/// RosterSnapshot はある時点の学校全体の名簿。クラスはペイロードのキー順を保持する。
#[derive(Debug, Clone, PartialEq)]
pub struct RosterSnapshot {
    pub classes: Vec<RosterClass>,
    pub metadata: SnapshotMetadata,
}

impl RosterSnapshot {
    /// メタデータのみの空スナップショットを作成する。
    pub fn empty(message: impl Into<String>) -> Self {
        Self {
            classes: Vec::new(),
            metadata: SnapshotMetadata {
                version: None,
                generated_at: Some(Utc::now()),
                source: SnapshotSource::Empty,
                message: Some(message.into()),
                stale: false,
            },
        }
    }

    /// メタデータ以外のエントリを持たない場合 true。
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn student_count(&self) -> usize {
        self.classes.iter().map(|c| c.rows.len()).sum()
    }

    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.classes.iter().map(|c| c.name.as_str())
    }

    /// JSON オブジェクトからスナップショットを組み立てる。
    /// 配列でないエントリや解釈できない行は警告を出して読み飛ばす。
    pub fn from_json(value: Value) -> anyhow::Result<Self> {
        let Value::Object(map) = value else {
            anyhow::bail!("roster payload must be a JSON object");
        };

        let mut metadata = SnapshotMetadata::default();
        let mut classes = Vec::new();
        for (key, entry) in map {
            if key == METADATA_KEY {
                match serde_json::from_value::<SnapshotMetadata>(entry) {
                    Ok(m) => metadata = m,
                    Err(e) => tracing::warn!(error = %e, "ignoring malformed roster metadata"),
                }
                continue;
            }
            let Value::Array(items) = entry else {
                tracing::warn!(class = %key, "roster entry is not an array, skipping");
                continue;
            };
            let mut rows = Vec::with_capacity(items.len());
            for (idx, item) in items.into_iter().enumerate() {
                match serde_json::from_value::<RawStudentRow>(item) {
                    Ok(row) => rows.push(row),
                    Err(e) => tracing::warn!(
                        class = %key,
                        row = idx + 1,
                        error = %e,
                        "skipping malformed roster row"
                    ),
                }
            }
            classes.push(RosterClass { name: key, rows });
        }

        Ok(Self { classes, metadata })
    }

    pub fn from_slice(bytes: &[u8]) -> anyhow::Result<Self> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_json(value)
    }

    /// キャッシュファイル形式（クラス名キー + metadata キー）の JSON に変換する。
    pub fn to_json(&self) -> anyhow::Result<Value> {
        let mut map = Map::new();
        for class in &self.classes {
            map.insert(class.name.clone(), serde_json::to_value(&class.rows)?);
        }
        map.insert(METADATA_KEY.to_string(), serde_json::to_value(&self.metadata)?);
        Ok(Value::Object(map))
    }
}
