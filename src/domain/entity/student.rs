use serde::{Deserialize, Serialize};

use crate::domain::entity::school_class::Shift;

/// 生徒ユーザーに固定で付与するロール。
pub const STUDENT_ROLE: &str = "Aluno";

/// 生徒ユーザーの初期ステータス。
pub const ACTIVE_STATUS: &str = "active";

/// ExistingStudent は内部ユーザーサービスに登録済みの生徒。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExistingStudent {
    #[serde(deserialize_with = "crate::domain::entity::id_string")]
    pub id: String,
    pub name: String,
    #[serde(default, deserialize_with = "crate::domain::entity::opt_id_string")]
    pub grade_id: Option<String>,
    #[serde(default)]
    pub shift: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "crate::domain::entity::opt_id_string")]
    pub school_id: Option<String>,
    #[serde(default, deserialize_with = "crate::domain::entity::opt_id_string")]
    pub district_id: Option<String>,
}

/// NewStudent は内部ユーザーサービスへの作成リクエスト本体。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStudent {
    pub name: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birthdate: Option<String>,
    pub gender: String,
    pub shift: Shift,
    pub role: String,
    pub status: String,
    pub school_id: String,
    pub district_id: String,
    pub grade_id: String,
}

/// StudentContext は照合処理の間だけ使う補助情報。作成リクエストには含めない。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StudentContext {
    /// 名簿上の所属クラス名。
    pub origin_class_name: String,
    /// 乱数サフィックス付与前のユーザー名。
    pub base_username: String,
    /// 外部名簿システム側の識別子（学籍番号）。
    pub external_id: Option<String>,
    /// 学校内で既存の生徒と一致した場合、その内部 ID。
    pub existing_id: Option<String>,
    /// クラス移動の場合、移動元クラスの内部 ID。
    pub previous_grade_id: Option<String>,
    pub is_move: bool,
}

/// ProcessedStudent は名簿行を正規化した、内部システム登録用の生徒。
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedStudent {
    pub student: NewStudent,
    pub context: StudentContext,
}

impl ProcessedStudent {
    pub fn name(&self) -> &str {
        &self.student.name
    }

    /// 作成・更新後の内部側の状態を ExistingStudent として表す。
    pub fn as_existing(&self, id: String) -> ExistingStudent {
        ExistingStudent {
            id,
            name: self.student.name.clone(),
            grade_id: Some(self.student.grade_id.clone()),
            shift: Some(self.student.shift.as_str().to_string()),
            phone: Some(self.student.phone.clone()).filter(|p| !p.is_empty()),
            school_id: Some(self.student.school_id.clone()),
            district_id: Some(self.student.district_id.clone()),
        }
    }

    /// 既存生徒との差分から、変更のあった項目だけを含む部分更新を組み立てる。
    /// 差分がなければ None。
    pub fn changes_against(&self, existing: &ExistingStudent) -> Option<StudentPatch> {
        let mut patch = StudentPatch::default();

        if existing.grade_id.as_deref() != Some(self.student.grade_id.as_str()) {
            patch.grade_id = Some(self.student.grade_id.clone());
        }
        let existing_shift = existing.shift.as_deref().and_then(Shift::parse);
        if existing_shift != Some(self.student.shift) {
            patch.shift = Some(self.student.shift);
        }
        // 名簿側に有効な電話番号がない場合は既存値を消さない
        if !self.student.phone.is_empty()
            && existing.phone.as_deref().unwrap_or_default() != self.student.phone
        {
            patch.phone = Some(self.student.phone.clone());
        }

        if patch.is_empty() {
            None
        } else {
            Some(patch)
        }
    }
}

/// StudentPatch は PATCH /users/{id} に送る部分更新。None の項目は送らない。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shift: Option<Shift>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl StudentPatch {
    pub fn is_empty(&self) -> bool {
        self.grade_id.is_none() && self.shift.is_none() && self.phone.is_none()
    }

    /// 変更した項目名の一覧（ジョブ明細の details 用）。
    pub fn changed_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.grade_id.is_some() {
            fields.push("gradeId");
        }
        if self.shift.is_some() {
            fields.push("shift");
        }
        if self.phone.is_some() {
            fields.push("phone");
        }
        fields
    }
}
