use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tracing::{info, warn};

use crate::domain::entity::student::{ACTIVE_STATUS, STUDENT_ROLE};
use crate::domain::entity::{
    ExistingStudent, ItemError, NewStudent, ProcessedClass, ProcessedStudent, RawStudentRow, RosterSnapshot,
    StudentContext,
};
use crate::domain::service::identity_normalizer::{
    base_username, build_email, extract_display_name, format_gender, generate_username, match_keys,
    normalize_name, reformat_birthdate, validate_phones,
};
use crate::infrastructure::error::ClientError;
use crate::infrastructure::users_client::UsersClient;

/// StudentBatch は名簿から組み立てた登録・更新対象の生徒。
#[derive(Debug, Clone, Default)]
pub struct StudentBatch {
    pub students: Vec<ProcessedStudent>,
    /// 既に同じクラスに登録済みだった行数。
    pub already_synced: usize,
    /// 内部システムに存在しないため飛ばしたクラス。
    pub skipped_classes: Vec<String>,
}

/// ReconciledStudent は生徒 1 件の照合結果（ジョブ明細の元データ）。
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledStudent {
    pub name: String,
    pub class_name: String,
    pub internal_id: Option<String>,
    pub external_id: Option<String>,
    pub changed_fields: Vec<&'static str>,
    pub is_move: bool,
}

impl ReconciledStudent {
    fn from_processed(student: &ProcessedStudent, internal_id: Option<String>) -> Self {
        Self {
            name: student.name().to_string(),
            class_name: student.context.origin_class_name.clone(),
            internal_id,
            external_id: student.context.external_id.clone(),
            changed_fields: Vec::new(),
            is_move: student.context.is_move,
        }
    }
}

/// StudentOutcome は生徒 1 件の処理結果。
#[derive(Debug, Clone, PartialEq)]
pub enum StudentOutcome {
    Created(ReconciledStudent),
    Updated(ReconciledStudent),
    Skipped(ReconciledStudent),
    Failed(ItemError),
}

/// StudentReconcileReport は生徒照合バッチの集計。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StudentReconcileReport {
    pub created: Vec<ReconciledStudent>,
    pub updated: Vec<ReconciledStudent>,
    pub skipped: Vec<ReconciledStudent>,
    pub errors: Vec<ItemError>,
}

impl FromIterator<StudentOutcome> for StudentReconcileReport {
    fn from_iter<I: IntoIterator<Item = StudentOutcome>>(iter: I) -> Self {
        iter.into_iter().fold(Self::default(), |mut report, outcome| {
            match outcome {
                StudentOutcome::Created(s) => report.created.push(s),
                StudentOutcome::Updated(s) => report.updated.push(s),
                StudentOutcome::Skipped(s) => report.skipped.push(s),
                StudentOutcome::Failed(e) => report.errors.push(e),
            }
            report
        })
    }
}

/// 一覧取得の失敗は空一覧として扱い、処理を続ける。
fn list_or_empty(result: Result<Vec<ExistingStudent>, ClientError>, scope: &str) -> Vec<ExistingStudent> {
    match result {
        Ok(students) => students,
        Err(e) => {
            warn!(scope = %scope, error = %e, "failed to list existing students, treating as empty");
            Vec::new()
        }
    }
}

/// 既存生徒の照合用索引（正規化名 → 生徒）。
struct StudentIndex<'a> {
    by_key: HashMap<String, &'a ExistingStudent>,
}

impl<'a> StudentIndex<'a> {
    fn build(students: &'a [ExistingStudent]) -> Self {
        let mut by_key = HashMap::new();
        for student in students {
            for key in match_keys(&student.name) {
                by_key.entry(key).or_insert(student);
            }
        }
        Self { by_key }
    }

    fn find(&self, keys: &[String]) -> Option<&'a ExistingStudent> {
        keys.iter().find_map(|k| self.by_key.get(k).copied())
    }
}

/// ReconcileStudentsUseCase は名簿の生徒と内部ユーザーサービスの登録内容を突き合わせる。
pub struct ReconcileStudentsUseCase {
    users: Arc<dyn UsersClient>,
    default_password: SecretString,
}

impl ReconcileStudentsUseCase {
    pub fn new(users: Arc<dyn UsersClient>, default_password: SecretString) -> Self {
        Self {
            users,
            default_password,
        }
    }

    /// 名簿の生徒行を、新規作成・クラス移動・同期済みに振り分ける。
    pub async fn process_students(
        &self,
        roster: &RosterSnapshot,
        school_id: &str,
        district_id: &str,
        classes: &[ProcessedClass],
        token: &str,
    ) -> StudentBatch {
        let known: HashMap<&str, &ProcessedClass> = classes
            .iter()
            .filter(|c| c.id.is_some())
            .map(|c| (c.name.as_str(), c))
            .collect();

        let school_students = list_or_empty(self.users.list_by_school(token, school_id).await, school_id);
        let school_index = StudentIndex::build(&school_students);

        let mut batch = StudentBatch::default();
        for roster_class in &roster.classes {
            let Some(class) = known.get(roster_class.name.as_str()) else {
                warn!(class = %roster_class.name, "class not found in internal system, skipping its students");
                batch.skipped_classes.push(roster_class.name.clone());
                continue;
            };
            let grade_id = class.id.as_deref().unwrap_or_default();

            let class_students = list_or_empty(self.users.list_by_grade(token, grade_id).await, grade_id);
            let class_index = StudentIndex::build(&class_students);

            let mut seen = HashSet::new();
            for row in &roster_class.rows {
                let keys = match_keys(&row.name);
                let Some(primary) = keys.first() else {
                    warn!(class = %roster_class.name, "roster row without a usable name, skipping");
                    continue;
                };
                if !seen.insert(primary.clone()) {
                    continue;
                }

                if class_index.find(&keys).is_some() {
                    batch.already_synced += 1;
                    continue;
                }
                match school_index.find(&keys) {
                    Some(existing) if existing.grade_id.as_deref() == Some(grade_id) => {
                        batch.already_synced += 1;
                    }
                    Some(existing) => {
                        info!(
                            student = %existing.name,
                            from = existing.grade_id.as_deref().unwrap_or("-"),
                            to = %class.name,
                            "student changed class"
                        );
                        let mut student = self.build_student(row, class, school_id, district_id);
                        student.context.existing_id = Some(existing.id.clone());
                        student.context.previous_grade_id = existing.grade_id.clone();
                        student.context.is_move = true;
                        batch.students.push(student);
                    }
                    None => batch.students.push(self.build_student(row, class, school_id, district_id)),
                }
            }
        }

        info!(
            students = batch.students.len(),
            already_synced = batch.already_synced,
            skipped_classes = batch.skipped_classes.len(),
            "student processing finished"
        );
        batch
    }

    fn build_student(
        &self,
        row: &RawStudentRow,
        class: &ProcessedClass,
        school_id: &str,
        district_id: &str,
    ) -> ProcessedStudent {
        let display_name = extract_display_name(&row.name);
        let username = generate_username(&display_name);
        let base = base_username(&display_name).unwrap_or_else(|| username.clone());

        ProcessedStudent {
            student: NewStudent {
                email: build_email(&username),
                name: display_name,
                username,
                password: self.default_password.expose_secret().clone(),
                phone: validate_phones(&row.phones),
                birthdate: row.birthdate.as_deref().and_then(reformat_birthdate),
                gender: format_gender(row.gender.as_deref()),
                shift: class.shift,
                role: STUDENT_ROLE.to_string(),
                status: ACTIVE_STATUS.to_string(),
                school_id: school_id.to_string(),
                district_id: district_id.to_string(),
                grade_id: class.id.clone().unwrap_or_default(),
            },
            context: StudentContext {
                origin_class_name: class.name.clone(),
                base_username: base,
                external_id: row.registration.clone(),
                ..Default::default()
            },
        }
    }

    /// 生徒を 1 件ずつ順に作成・更新する。1 件の失敗で残りは止めない。
    /// 同じ実行内で既に処理した生徒（正規化名が一致）は、その結果に対する更新として扱う。
    pub async fn reconcile_students(&self, token: &str, students: Vec<ProcessedStudent>) -> StudentReconcileReport {
        let mut handled = HashMap::new();
        let mut outcomes = Vec::with_capacity(students.len());
        for student in students {
            outcomes.push(self.reconcile_one(token, student, &mut handled).await);
        }
        let report: StudentReconcileReport = outcomes.into_iter().collect();
        info!(
            created = report.created.len(),
            updated = report.updated.len(),
            skipped = report.skipped.len(),
            failed = report.errors.len(),
            "student reconciliation finished"
        );
        report
    }

    /// `handled` は正規化名 → 処理後の状態。作成済みで ID 不明なら None。
    async fn reconcile_one(
        &self,
        token: &str,
        mut student: ProcessedStudent,
        handled: &mut HashMap<String, Option<ExistingStudent>>,
    ) -> StudentOutcome {
        let key = normalize_name(student.name());
        let located = match handled.get(&key) {
            Some(Some(earlier)) => {
                info!(student = %student.name(), id = %earlier.id, "student already handled in this run");
                if earlier.grade_id.as_deref() != Some(student.student.grade_id.as_str()) {
                    student.context.is_move = true;
                    student.context.existing_id = Some(earlier.id.clone());
                    student.context.previous_grade_id = earlier.grade_id.clone();
                }
                Ok(Some(earlier.clone()))
            }
            Some(None) => {
                warn!(student = %student.name(), "student created earlier in this run without id, skipping duplicate");
                return StudentOutcome::Skipped(ReconciledStudent::from_processed(&student, None));
            }
            None => self.locate(token, &student).await,
        };

        let outcome = match located {
            Ok(Some(existing)) => self.update_existing(token, &student, &existing).await,
            Ok(None) => self.create(token, &student).await,
            Err(e) => {
                warn!(student = %student.name(), error = %e, "student lookup failed");
                StudentOutcome::Failed(ItemError::new(student.name(), e.to_string()))
            }
        };

        match &outcome {
            StudentOutcome::Created(s) | StudentOutcome::Updated(s) => {
                handled.insert(key, s.internal_id.clone().map(|id| student.as_existing(id)));
            }
            StudentOutcome::Skipped(s) => {
                if let Some(id) = s.internal_id.clone() {
                    handled.insert(key, Some(student.as_existing(id)));
                }
            }
            StudentOutcome::Failed(_) => {}
        }
        outcome
    }

    /// 名前 + 学校で再確認し、見つからなければ移動対象の既知 ID で確認する。
    async fn locate(&self, token: &str, student: &ProcessedStudent) -> Result<Option<ExistingStudent>, ClientError> {
        let found = self
            .users
            .find_existing(token, student.name(), &student.student.school_id)
            .await?;
        if found.is_some() {
            return Ok(found);
        }
        let Some(id) = student.context.existing_id.as_deref().filter(|_| student.context.is_move) else {
            return Ok(None);
        };
        match self.users.get_user(token, id).await {
            Ok(user) => Ok(Some(user)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn update_existing(&self, token: &str, student: &ProcessedStudent, existing: &ExistingStudent) -> StudentOutcome {
        let mut record = ReconciledStudent::from_processed(student, Some(existing.id.clone()));
        let Some(patch) = student.changes_against(existing) else {
            return StudentOutcome::Skipped(record);
        };
        match self.users.patch_user(token, &existing.id, &patch).await {
            Ok(()) => {
                record.changed_fields = patch.changed_fields();
                info!(student = %record.name, id = %existing.id, fields = ?record.changed_fields, "student updated");
                StudentOutcome::Updated(record)
            }
            Err(e) => {
                warn!(student = %record.name, id = %existing.id, error = %e, "student update failed");
                StudentOutcome::Failed(ItemError::new(record.name, e.to_string()))
            }
        }
    }

    async fn create(&self, token: &str, student: &ProcessedStudent) -> StudentOutcome {
        match self.users.create_user(token, &student.student).await {
            Ok(id) => {
                info!(student = %student.name(), username = %student.student.username, "student created");
                StudentOutcome::Created(ReconciledStudent::from_processed(student, id))
            }
            Err(e) => {
                warn!(student = %student.name(), error = %e, "student creation failed");
                StudentOutcome::Failed(ItemError::new(student.name(), e.to_string()))
            }
        }
    }
}
