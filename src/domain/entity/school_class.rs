use serde::{Deserialize, Serialize};

/// Shift はクラスの授業時間帯（turno）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shift {
    Matutino,
    Vespertino,
    Noturno,
    Integral,
}

impl Shift {
    pub fn as_str(&self) -> &'static str {
        match self {
            Shift::Matutino => "matutino",
            Shift::Vespertino => "vespertino",
            Shift::Noturno => "noturno",
            Shift::Integral => "integral",
        }
    }

    /// 表示用ラベル（先頭大文字）。
    pub fn label(&self) -> &'static str {
        match self {
            Shift::Matutino => "Matutino",
            Shift::Vespertino => "Vespertino",
            Shift::Noturno => "Noturno",
            Shift::Integral => "Integral",
        }
    }

    /// 内部システムから返る文字列を解釈する。大文字小文字は区別しない。
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "matutino" => Some(Self::Matutino),
            "vespertino" => Some(Self::Vespertino),
            "noturno" => Some(Self::Noturno),
            "integral" => Some(Self::Integral),
            _ => None,
        }
    }
}

impl std::fmt::Display for Shift {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ProcessedClass は名簿のクラスコードから組み立てた、内部システム登録用のクラス。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedClass {
    pub name: String,
    pub description: String,
    pub shift: Shift,
    pub school_id: String,
    pub district_id: String,
    /// 内部システム側の ID。作成前は None。
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// 作成レスポンスから ID が得られず、一時 ID を採番した場合 true。
    #[serde(default)]
    pub provisional: bool,
}

impl ProcessedClass {
    #[must_use]
    pub fn with_id(mut self, id: String, provisional: bool) -> Self {
        self.id = Some(id);
        self.provisional = provisional;
        self
    }
}

/// ExistingClass は内部クラスサービスに登録済みのクラス。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExistingClass {
    #[serde(deserialize_with = "crate::domain::entity::id_string")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub shift: Option<String>,
    #[serde(default)]
    pub school_id: Option<String>,
}

/// ClassDiff は名簿由来のクラスと登録済みクラスの差分。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassDiff {
    /// 内部システムに存在しないクラス。
    pub new: Vec<ProcessedClass>,
    /// 既に存在するクラス（内部 ID 付き）。
    pub existing: Vec<ProcessedClass>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shift_parse_is_case_insensitive() {
        assert_eq!(Shift::parse("Matutino"), Some(Shift::Matutino));
        assert_eq!(Shift::parse(" NOTURNO "), Some(Shift::Noturno));
        assert_eq!(Shift::parse("tarde"), None);
    }

    #[test]
    fn test_existing_class_accepts_numeric_id() {
        let class: ExistingClass =
            serde_json::from_value(serde_json::json!({"id": 17, "name": "6M01"})).unwrap();
        assert_eq!(class.id, "17");
        assert!(class.shift.is_none());
    }

    #[test]
    fn test_processed_class_serializes_camel_case() {
        let class = ProcessedClass {
            name: "6M01".to_string(),
            description: "Turma 6M01 - Matutino".to_string(),
            shift: Shift::Matutino,
            school_id: "s1".to_string(),
            district_id: "d1".to_string(),
            id: None,
            provisional: false,
        };
        let value = serde_json::to_value(&class).unwrap();
        assert_eq!(value["schoolId"], "s1");
        assert_eq!(value["shift"], "matutino");
        assert!(value.get("id").is_none());
    }
}
