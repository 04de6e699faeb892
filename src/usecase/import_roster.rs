use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::entity::{
    ExistingClass, ItemCounts, ItemError, ProcessedClass, RosterSnapshot, SyncItemStatus, SyncItemType, SyncJob,
    SyncJobItem, SyncJobType,
};
use crate::domain::repository::SyncJobRepository;
use crate::infrastructure::error::ClientError;
use crate::infrastructure::users_client::UsersClient;
use crate::usecase::reconcile_classes::{ClassCreationReport, ReconcileClassesUseCase};
use crate::usecase::reconcile_students::{ReconcileStudentsUseCase, StudentBatch, StudentReconcileReport};
use crate::usecase::resolve_roster::{ResolveRosterUseCase, SourceError};

/// ImportRequest は取り込み 1 回分の入力。
#[derive(Debug)]
pub struct ImportRequest {
    pub school_id: String,
    pub user_id: String,
    pub token: SecretString,
}

/// ClassSummary はクラス取り込みの集計。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSummary {
    pub processed: usize,
    pub existing: usize,
    pub created: usize,
    pub provisional: usize,
    pub failed: usize,
}

/// StudentSummary は生徒取り込みの集計。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentSummary {
    pub processed: usize,
    pub already_synced: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub skipped_classes: Vec<String>,
}

/// ImportOutcome は取り込み結果。公開操作は常にこの形で結果を返す。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOutcome {
    pub success: bool,
    pub job_id: Option<Uuid>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classes: Option<ClassSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub students: Option<StudentSummary>,
    pub errors: Vec<ItemError>,
}

impl ImportOutcome {
    fn failure(job_id: Option<Uuid>, message: String) -> Self {
        Self {
            success: false,
            job_id,
            message,
            classes: None,
            students: None,
            errors: Vec::new(),
        }
    }
}

/// ImportError はジョブ全体を失敗させるエラー。
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("failed to resolve initiating user {user_id}: {reason}")]
    Initiator { user_id: String, reason: String },

    #[error("failed to list existing classes: {0}")]
    Classes(ClientError),
}

/// パイプラインの結果。ジョブの集計・明細・応答の元になる。
#[derive(Debug, Default)]
struct ImportSummary {
    counts: ItemCounts,
    message: String,
    classes: Option<ClassSummary>,
    students: Option<StudentSummary>,
    errors: Vec<ItemError>,
    items: Vec<SyncJobItem>,
}

/// クラスを揃えた結果（生徒処理で使う全クラスと作成レポート）。
struct EnsuredClasses {
    all: Vec<ProcessedClass>,
    summary: ClassSummary,
    report: ClassCreationReport,
    existing: Vec<ProcessedClass>,
}

/// ImportRosterUseCase は名簿取り込みのジョブ管理とパイプライン実行を担う。
pub struct ImportRosterUseCase {
    job_repo: Arc<dyn SyncJobRepository>,
    users: Arc<dyn UsersClient>,
    resolver: Arc<ResolveRosterUseCase>,
    classes: Arc<ReconcileClassesUseCase>,
    students: Arc<ReconcileStudentsUseCase>,
    default_district_id: Option<String>,
}

impl ImportRosterUseCase {
    pub fn new(
        job_repo: Arc<dyn SyncJobRepository>,
        users: Arc<dyn UsersClient>,
        resolver: Arc<ResolveRosterUseCase>,
        classes: Arc<ReconcileClassesUseCase>,
        students: Arc<ReconcileStudentsUseCase>,
        default_district_id: Option<String>,
    ) -> Self {
        Self {
            job_repo,
            users,
            resolver,
            classes,
            students,
            default_district_id,
        }
    }

    pub async fn import_classes(&self, req: &ImportRequest) -> ImportOutcome {
        self.run(SyncJobType::Classes, req).await
    }

    pub async fn import_students(&self, req: &ImportRequest) -> ImportOutcome {
        self.run(SyncJobType::Students, req).await
    }

    pub async fn import_all(&self, req: &ImportRequest) -> ImportOutcome {
        self.run(SyncJobType::All, req).await
    }

    async fn run(&self, job_type: SyncJobType, req: &ImportRequest) -> ImportOutcome {
        let mut job = SyncJob::new(req.school_id.clone(), req.user_id.clone(), job_type);
        if let Err(e) = job.start() {
            return ImportOutcome::failure(None, e.to_string());
        }
        if let Err(e) = self.job_repo.create(&job).await {
            error!(school_id = %req.school_id, error = %e, "failed to create sync job");
            return ImportOutcome::failure(None, format!("failed to create sync job: {}", e));
        }
        info!(job_id = %job.id, school_id = %req.school_id, job_type = %job_type, "sync job started");

        let token = req.token.expose_secret().as_str();
        let result = match self.resolve_district(token, &req.user_id).await {
            Ok(district_id) => match job_type {
                SyncJobType::Classes => self.run_classes(job.id, token, &req.school_id, &district_id).await,
                SyncJobType::Students => self.run_students(job.id, token, &req.school_id, &district_id).await,
                SyncJobType::All => self.run_all(job.id, token, &req.school_id, &district_id).await,
            },
            Err(e) => Err(e),
        };

        match result {
            Ok(summary) => self.finish(job, summary).await,
            Err(e) => self.abort(job, e).await,
        }
    }

    /// 起動ユーザーの地区 ID を取得する。
    async fn resolve_district(&self, token: &str, user_id: &str) -> Result<String, ImportError> {
        let user = self
            .users
            .get_user(token, user_id)
            .await
            .map_err(|e| ImportError::Initiator {
                user_id: user_id.to_string(),
                reason: e.to_string(),
            })?;
        user.district_id
            .or_else(|| self.default_district_id.clone())
            .ok_or_else(|| ImportError::Initiator {
                user_id: user_id.to_string(),
                reason: "user has no district".to_string(),
            })
    }

    async fn run_classes(
        &self,
        job_id: Uuid,
        token: &str,
        school_id: &str,
        district_id: &str,
    ) -> Result<ImportSummary, ImportError> {
        let roster = self.resolver.fetch_roster(token, school_id).await?;
        if roster.is_empty() {
            return Ok(ImportSummary {
                message: empty_roster_message(&roster),
                ..Default::default()
            });
        }
        let existing = self.classes.list_existing(token, school_id).await.map_err(ImportError::Classes)?;
        let ensured = self.ensure_classes(token, &roster, &existing, school_id, district_id).await;

        let mut summary = ImportSummary {
            counts: ItemCounts {
                total: to_i32(ensured.summary.processed),
                created: to_i32(ensured.summary.created),
                updated: 0,
                failed: to_i32(ensured.summary.failed),
            },
            message: format!(
                "{} classes processed: {} created, {} already existed, {} failed",
                ensured.summary.processed, ensured.summary.created, ensured.summary.existing, ensured.summary.failed
            ),
            ..Default::default()
        };
        summary.record_classes(job_id, ensured);
        Ok(summary)
    }

    async fn run_students(
        &self,
        job_id: Uuid,
        token: &str,
        school_id: &str,
        district_id: &str,
    ) -> Result<ImportSummary, ImportError> {
        let roster = self.resolver.fetch_roster(token, school_id).await?;
        if roster.is_empty() {
            return Ok(ImportSummary {
                message: empty_roster_message(&roster),
                ..Default::default()
            });
        }
        let existing = self.classes.list_existing(token, school_id).await.map_err(ImportError::Classes)?;
        let ensured = self.ensure_classes(token, &roster, &existing, school_id, district_id).await;

        let batch = self
            .students
            .process_students(&roster, school_id, district_id, &ensured.all, token)
            .await;
        let (student_summary, report) = self.reconcile(token, batch).await;

        let mut summary = ImportSummary {
            counts: student_counts(&student_summary),
            message: students_message(&student_summary),
            ..Default::default()
        };
        summary.record_classes(job_id, ensured);
        summary.record_students(job_id, student_summary, report);
        Ok(summary)
    }

    async fn run_all(
        &self,
        job_id: Uuid,
        token: &str,
        school_id: &str,
        district_id: &str,
    ) -> Result<ImportSummary, ImportError> {
        let existing = self.classes.list_existing(token, school_id).await.map_err(ImportError::Classes)?;
        let roster = self.resolver.fetch_roster(token, school_id).await?;

        let mut summary = ImportSummary::default();
        let (classes, class_counts) = if existing.is_empty() {
            info!(school_id = %school_id, "no classes registered, deriving classes from roster");
            let ensured = self.ensure_classes(token, &roster, &existing, school_id, district_id).await;
            let counts = ItemCounts {
                total: to_i32(ensured.summary.created + ensured.summary.failed),
                created: to_i32(ensured.summary.created),
                updated: 0,
                failed: to_i32(ensured.summary.failed),
            };
            let all = ensured.all.clone();
            summary.record_classes(job_id, ensured);
            (all, counts)
        } else {
            let known = ReconcileClassesUseCase::from_existing(&existing, school_id, district_id);
            summary.classes = Some(ClassSummary {
                processed: known.len(),
                existing: known.len(),
                ..Default::default()
            });
            (known, ItemCounts::default())
        };

        if roster.is_empty() {
            summary.counts = class_counts;
            summary.message = empty_roster_message(&roster);
            return Ok(summary);
        }
        if classes.is_empty() {
            summary.counts = class_counts;
            summary.message = format!(
                "no classes available for students: {} roster classes, {} class creations failed",
                roster.classes.len(),
                class_counts.failed
            );
            return Ok(summary);
        }

        let batch = self
            .students
            .process_students(&roster, school_id, district_id, &classes, token)
            .await;
        let (student_summary, report) = self.reconcile(token, batch).await;

        summary.counts = class_counts.merge(student_counts(&student_summary));
        summary.message = if student_summary.processed == 0 {
            format!(
                "{} classes available but no students to process ({} already synchronized)",
                classes.len(),
                student_summary.already_synced
            )
        } else {
            students_message(&student_summary)
        };
        summary.record_students(job_id, student_summary, report);
        Ok(summary)
    }

    /// 名簿のクラスを登録済みクラスと突き合わせ、足りないものを作成する。
    async fn ensure_classes(
        &self,
        token: &str,
        roster: &RosterSnapshot,
        existing: &[ExistingClass],
        school_id: &str,
        district_id: &str,
    ) -> EnsuredClasses {
        let processed = ReconcileClassesUseCase::process_classes(roster, school_id, district_id);
        let processed_count = processed.len();
        let diff = ReconcileClassesUseCase::diff_classes(processed, existing);
        let report = self.classes.create_classes(token, diff.new).await;

        let summary = ClassSummary {
            processed: processed_count,
            existing: diff.existing.len(),
            created: report.created.len(),
            provisional: report.created.iter().filter(|c| c.provisional).count(),
            failed: report.errors.len(),
        };
        let mut all = diff.existing.clone();
        all.extend(report.created.iter().cloned());

        EnsuredClasses {
            all,
            summary,
            report,
            existing: diff.existing,
        }
    }

    async fn reconcile(&self, token: &str, batch: StudentBatch) -> (StudentSummary, StudentReconcileReport) {
        let processed = batch.students.len();
        let report = self.students.reconcile_students(token, batch.students).await;
        let summary = StudentSummary {
            processed,
            already_synced: batch.already_synced,
            created: report.created.len(),
            updated: report.updated.len(),
            skipped: report.skipped.len(),
            failed: report.errors.len(),
            skipped_classes: batch.skipped_classes,
        };
        (summary, report)
    }

    async fn finish(&self, mut job: SyncJob, summary: ImportSummary) -> ImportOutcome {
        if !summary.items.is_empty() {
            if let Err(e) = self.job_repo.add_items(job.id, &summary.items).await {
                error!(job_id = %job.id, error = %e, "failed to record sync job items");
            }
        }

        let result = serde_json::json!({
            "message": summary.message,
            "classes": summary.classes,
            "students": summary.students,
            "errors": summary.errors,
        });
        // 集計が不整合なら processing のまま残さず failed で確定させる
        if let Err(e) = job.complete(summary.counts, result) {
            error!(job_id = %job.id, error = %e, "invalid sync job completion, marking job as failed");
            let message = format!("invalid sync job totals: {}", e);
            if let Err(fail_err) = job.fail(message.clone()) {
                error!(job_id = %job.id, error = %fail_err, "invalid sync job failure transition");
            }
            self.persist_final(&job).await;
            return ImportOutcome {
                success: false,
                job_id: Some(job.id),
                message,
                classes: summary.classes,
                students: summary.students,
                errors: summary.errors,
            };
        }
        self.persist_final(&job).await;

        info!(
            job_id = %job.id,
            total = summary.counts.total,
            created = summary.counts.created,
            updated = summary.counts.updated,
            failed = summary.counts.failed,
            "sync job completed"
        );

        ImportOutcome {
            success: true,
            job_id: Some(job.id),
            message: summary.message,
            classes: summary.classes,
            students: summary.students,
            errors: summary.errors,
        }
    }

    async fn persist_final(&self, job: &SyncJob) {
        if let Err(e) = self.job_repo.finalize(job).await {
            error!(job_id = %job.id, error = %e, "failed to finalize sync job");
        }
    }

    async fn abort(&self, mut job: SyncJob, err: ImportError) -> ImportOutcome {
        let message = err.to_string();
        warn!(job_id = %job.id, error = %message, "sync job failed");
        match job.fail(message.clone()) {
            Ok(()) => self.persist_final(&job).await,
            Err(e) => error!(job_id = %job.id, error = %e, "invalid sync job failure transition"),
        }
        ImportOutcome::failure(Some(job.id), message)
    }
}

impl ImportSummary {
    fn record_classes(&mut self, job_id: Uuid, ensured: EnsuredClasses) {
        for class in &ensured.report.created {
            self.items.push(class_item(job_id, class, SyncItemStatus::Created));
        }
        for class in &ensured.existing {
            self.items.push(class_item(job_id, class, SyncItemStatus::Skipped));
        }
        for err in &ensured.report.errors {
            self.items.push(
                SyncJobItem::new(job_id, SyncItemType::Class, err.name.clone(), SyncItemStatus::Failed)
                    .with_error(err.message.clone()),
            );
        }
        self.errors.extend(ensured.report.errors);
        self.classes = Some(ensured.summary);
    }

    fn record_students(&mut self, job_id: Uuid, summary: StudentSummary, report: StudentReconcileReport) {
        let groups = [
            (&report.created, SyncItemStatus::Created),
            (&report.updated, SyncItemStatus::Updated),
            (&report.skipped, SyncItemStatus::Skipped),
        ];
        for (students, status) in groups {
            for s in students {
                self.items.push(
                    SyncJobItem::new(job_id, SyncItemType::Student, s.name.clone(), status)
                        .with_external_id(s.external_id.clone())
                        .with_internal_id(s.internal_id.clone())
                        .with_details(serde_json::json!({
                            "className": s.class_name,
                            "isMove": s.is_move,
                            "changedFields": s.changed_fields,
                        })),
                );
            }
        }
        for err in &report.errors {
            self.items.push(
                SyncJobItem::new(job_id, SyncItemType::Student, err.name.clone(), SyncItemStatus::Failed)
                    .with_error(err.message.clone()),
            );
        }
        self.errors.extend(report.errors);
        self.students = Some(summary);
    }
}

fn class_item(job_id: Uuid, class: &ProcessedClass, status: SyncItemStatus) -> SyncJobItem {
    SyncJobItem::new(job_id, SyncItemType::Class, class.name.clone(), status)
        .with_internal_id(class.id.clone())
        .with_details(serde_json::json!({
            "shift": class.shift,
            "description": class.description,
            "provisional": class.provisional,
        }))
}

fn empty_roster_message(roster: &RosterSnapshot) -> String {
    let reason = roster
        .metadata
        .message
        .as_deref()
        .unwrap_or("roster snapshot contains no classes");
    format!("nothing to import: {}", reason)
}

fn student_counts(summary: &StudentSummary) -> ItemCounts {
    ItemCounts {
        total: to_i32(summary.processed + summary.already_synced),
        created: to_i32(summary.created),
        updated: to_i32(summary.updated),
        failed: to_i32(summary.failed),
    }
}

fn students_message(summary: &StudentSummary) -> String {
    format!(
        "{} students processed: {} created, {} updated, {} unchanged, {} failed",
        summary.processed + summary.already_synced,
        summary.created,
        summary.updated,
        summary.skipped + summary.already_synced,
        summary.failed
    )
}

fn to_i32(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}
