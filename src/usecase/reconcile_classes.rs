use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::entity::{ClassDiff, ExistingClass, ItemError, ProcessedClass, RosterSnapshot, Shift};
use crate::domain::service::identity_normalizer::{describe_class, infer_shift};
use crate::infrastructure::classes_client::{ClassCreationResponse, ClassesClient};
use crate::infrastructure::error::ClientError;

/// ClassOutcome はクラス 1 件の作成結果。
#[derive(Debug, Clone, PartialEq)]
pub enum ClassOutcome {
    Created(ProcessedClass),
    Failed(ItemError),
}

/// ClassCreationReport はクラス作成バッチの集計。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassCreationReport {
    pub created: Vec<ProcessedClass>,
    pub errors: Vec<ItemError>,
}

impl ClassCreationReport {
    fn fold(mut self, outcome: ClassOutcome) -> Self {
        match outcome {
            ClassOutcome::Created(class) => self.created.push(class),
            ClassOutcome::Failed(err) => self.errors.push(err),
        }
        self
    }
}

impl FromIterator<ClassOutcome> for ClassCreationReport {
    fn from_iter<I: IntoIterator<Item = ClassOutcome>>(iter: I) -> Self {
        iter.into_iter().fold(Self::default(), Self::fold)
    }
}

/// ReconcileClassesUseCase は名簿のクラスと内部クラスサービスの登録内容を突き合わせる。
pub struct ReconcileClassesUseCase {
    classes: Arc<dyn ClassesClient>,
}

impl ReconcileClassesUseCase {
    pub fn new(classes: Arc<dyn ClassesClient>) -> Self {
        Self { classes }
    }

    /// 名簿の各クラスから登録用クラスを組み立てる。
    pub fn process_classes(roster: &RosterSnapshot, school_id: &str, district_id: &str) -> Vec<ProcessedClass> {
        roster
            .classes
            .iter()
            .map(|class| {
                let shift = infer_shift(&class.name);
                ProcessedClass {
                    name: class.name.clone(),
                    description: describe_class(&class.name, shift),
                    shift,
                    school_id: school_id.to_string(),
                    district_id: district_id.to_string(),
                    id: None,
                    provisional: false,
                }
            })
            .collect()
    }

    /// 登録済みクラスを生徒処理用の ProcessedClass に変換する。
    /// シフトが未登録・不明ならクラスコードから推定する。
    pub fn from_existing(existing: &[ExistingClass], school_id: &str, district_id: &str) -> Vec<ProcessedClass> {
        existing
            .iter()
            .map(|class| {
                let shift = class
                    .shift
                    .as_deref()
                    .and_then(Shift::parse)
                    .unwrap_or_else(|| infer_shift(&class.name));
                ProcessedClass {
                    name: class.name.clone(),
                    description: describe_class(&class.name, shift),
                    shift,
                    school_id: class.school_id.clone().unwrap_or_else(|| school_id.to_string()),
                    district_id: district_id.to_string(),
                    id: Some(class.id.clone()),
                    provisional: false,
                }
            })
            .collect()
    }

    pub async fn list_existing(&self, token: &str, school_id: &str) -> Result<Vec<ExistingClass>, ClientError> {
        self.classes.list_classes(token, school_id).await
    }

    /// クラス名の完全一致（大文字小文字を区別）で新規と既存に振り分ける。
    pub fn diff_classes(processed: Vec<ProcessedClass>, existing: &[ExistingClass]) -> ClassDiff {
        let ids: HashMap<&str, &str> = existing
            .iter()
            .map(|c| (c.name.as_str(), c.id.as_str()))
            .collect();

        processed
            .into_iter()
            .fold(ClassDiff::default(), |mut diff, class| {
                match ids.get(class.name.as_str()) {
                    Some(id) => {
                        let id = (*id).to_string();
                        diff.existing.push(class.with_id(id, false));
                    }
                    None => diff.new.push(class),
                }
                diff
            })
    }

    /// 新規クラスを 1 件ずつ順に作成する。1 件の失敗で残りは止めない。
    pub async fn create_classes(&self, token: &str, new: Vec<ProcessedClass>) -> ClassCreationReport {
        let mut outcomes = Vec::with_capacity(new.len());
        for class in new {
            outcomes.push(self.create_one(token, class).await);
        }
        let report: ClassCreationReport = outcomes.into_iter().collect();
        info!(
            created = report.created.len(),
            failed = report.errors.len(),
            "class creation finished"
        );
        report
    }

    async fn create_one(&self, token: &str, class: ProcessedClass) -> ClassOutcome {
        match self.classes.create_class(token, &class).await {
            Ok(ClassCreationResponse::Provisional) => {
                let tmp_id = format!("tmp-{}", Uuid::new_v4());
                warn!(class = %class.name, id = %tmp_id, "class created without id in response, using provisional id");
                ClassOutcome::Created(class.with_id(tmp_id, true))
            }
            Ok(resp) => {
                let id = resp.id().unwrap_or_default().to_string();
                info!(class = %class.name, id = %id, "class created");
                ClassOutcome::Created(class.with_id(id, false))
            }
            Err(e) => {
                warn!(class = %class.name, error = %e, "class creation failed");
                ClassOutcome::Failed(ItemError::new(class.name, e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::{RosterClass, SnapshotMetadata};
    use crate::infrastructure::classes_client::MockClassesClient;

    fn roster(names: &[&str]) -> RosterSnapshot {
        RosterSnapshot {
            classes: names
                .iter()
                .map(|n| RosterClass {
                    name: (*n).to_string(),
                    rows: vec![],
                })
                .collect(),
            metadata: SnapshotMetadata::default(),
        }
    }

    fn existing(id: &str, name: &str) -> ExistingClass {
        ExistingClass {
            id: id.to_string(),
            name: name.to_string(),
            shift: None,
            school_id: Some("s1".to_string()),
        }
    }

    #[test]
    fn test_process_classes() {
        let processed = ReconcileClassesUseCase::process_classes(&roster(&["6M01", "7V02", "8X03"]), "s1", "d1");
        assert_eq!(processed.len(), 3);
        assert_eq!(processed[0].shift, Shift::Matutino);
        assert_eq!(processed[0].description, "Turma 6M01 - Matutino");
        assert_eq!(processed[1].shift, Shift::Vespertino);
        assert_eq!(processed[2].shift, Shift::Integral);
        assert!(processed.iter().all(|c| c.id.is_none() && c.district_id == "d1"));
    }

    #[test]
    fn test_diff_classes_exact_name_match() {
        let processed = ReconcileClassesUseCase::process_classes(&roster(&["6M01", "7V02"]), "s1", "d1");
        let diff = ReconcileClassesUseCase::diff_classes(processed, &[existing("c1", "6M01"), existing("c2", "7v02")]);

        assert_eq!(diff.existing.len(), 1);
        assert_eq!(diff.existing[0].id.as_deref(), Some("c1"));
        assert_eq!(diff.new.len(), 1);
        assert_eq!(diff.new[0].name, "7V02");
    }

    #[test]
    fn test_from_existing_infers_missing_shift() {
        let mut with_shift = existing("c1", "6M01");
        with_shift.shift = Some("Noturno".to_string());
        let classes = ReconcileClassesUseCase::from_existing(&[with_shift, existing("c2", "7V02")], "s1", "d1");
        assert_eq!(classes[0].shift, Shift::Noturno);
        assert_eq!(classes[1].shift, Shift::Vespertino);
        assert_eq!(classes[1].id.as_deref(), Some("c2"));
    }

    #[tokio::test]
    async fn test_create_classes_isolates_failures() {
        let mut mock = MockClassesClient::new();
        mock.expect_create_class().times(3).returning(|_, class| match class.name.as_str() {
            "6M01" => Ok(ClassCreationResponse::NestedData("c1".to_string())),
            "7V02" => Err(ClientError::Status {
                status: 422,
                body: "invalid".to_string(),
            }),
            _ => Ok(ClassCreationResponse::Provisional),
        });

        let uc = ReconcileClassesUseCase::new(Arc::new(mock));
        let new = ReconcileClassesUseCase::process_classes(&roster(&["6M01", "7V02", "8N03"]), "s1", "d1");
        let report = uc.create_classes("tok", new).await;

        assert_eq!(report.created.len(), 2);
        assert_eq!(report.created[0].id.as_deref(), Some("c1"));
        assert!(!report.created[0].provisional);
        assert!(report.created[1].provisional);
        assert!(report.created[1].id.as_deref().unwrap().starts_with("tmp-"));
        assert_eq!(report.errors, vec![ItemError::new("7V02", "HTTP 422: invalid")]);
    }

    #[tokio::test]
    async fn test_create_classes_empty_makes_no_calls() {
        let mut mock = MockClassesClient::new();
        mock.expect_create_class().never();

        let uc = ReconcileClassesUseCase::new(Arc::new(mock));
        let report = uc.create_classes("tok", vec![]).await;
        assert_eq!(report, ClassCreationReport::default());
    }
}
