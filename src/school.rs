//! School records and the storage seams the sync coordinator drives
//!
//! A class maps to a set of subjects. From that mapping the store derives
//! each student's subject enrolment and the line items on their report cards.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type ClassId = i64;
pub type SubjectId = i64;
pub type TermId = i64;
pub type StudentId = Uuid;

/// Storage failures
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// The backing database cannot be reached
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("{0} not found")]
    NotFound(String),

    /// Operation would break a reference, e.g. deleting a subject still mapped
    #[error("{0}")]
    Conflict(String),
}

impl StoreError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: SubjectId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Class {
    pub id: ClassId,
    pub name: String,
    pub subject_ids: BTreeSet<SubjectId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Student {
    pub id: StudentId,
    pub class_id: ClassId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCardItem {
    pub subject_id: SubjectId,
    /// Percentage, filled from exam results when available
    pub score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCard {
    pub id: i64,
    pub student_id: StudentId,
    pub class_id: ClassId,
    pub term_id: TermId,
    pub items: Vec<ReportCardItem>,
}

impl ReportCard {
    pub fn has_subject(&self, subject_id: SubjectId) -> bool {
        self.items.iter().any(|i| i.subject_id == subject_id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExamResult {
    pub student_id: StudentId,
    pub subject_id: SubjectId,
    pub term_id: TermId,
    pub score: f64,
    pub max_score: f64,
}

impl ExamResult {
    pub fn percentage(&self) -> f64 {
        if self.max_score <= 0.0 {
            0.0
        } else {
            (self.score / self.max_score * 100.0).clamp(0.0, 100.0)
        }
    }
}

// ============================================================================
// Store seams
// ============================================================================

/// Outcome of re-deriving student enrolment for one class
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StudentSync {
    pub synced: usize,
    pub errors: Vec<String>,
}

/// Outcome of removing unmapped report card items
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportCardCleanup {
    pub items_removed: usize,
}

/// Outcome of adding newly mapped subjects to existing report cards
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportCardBackfill {
    pub items_added: usize,
    pub exam_scores_synced: usize,
    pub errors: Vec<String>,
}

/// Derived-record maintenance after a mapping change
#[async_trait]
pub trait MappingStore: Send + Sync {
    /// Align each student's subject enrolment with their class mapping
    async fn sync_students_with_class_mappings(&self, class_id: ClassId) -> Result<StudentSync, StoreError>;

    /// Remove report card items for subjects no longer mapped to the card's class
    async fn cleanup_report_cards_for_classes(
        &self,
        class_ids: &[ClassId],
    ) -> Result<ReportCardCleanup, StoreError>;

    /// Add items for newly mapped subjects, filling scores from exam results
    async fn add_missing_subjects_to_report_cards(
        &self,
        class_ids: &[ClassId],
    ) -> Result<ReportCardBackfill, StoreError>;
}

/// Class lookup and the mapping mutation
#[async_trait]
pub trait ClassStore: Send + Sync {
    async fn get_class(&self, class_id: ClassId) -> Result<Option<Class>, StoreError>;

    /// Replace the subjects mapped to a class
    async fn set_class_subjects(
        &self,
        class_id: ClassId,
        subject_ids: &[SubjectId],
    ) -> Result<Class, StoreError>;
}

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Debug, Default)]
struct SchoolData {
    subjects: HashMap<SubjectId, Subject>,
    classes: HashMap<ClassId, Class>,
    students: HashMap<StudentId, Student>,
    enrolments: HashMap<StudentId, BTreeSet<SubjectId>>,
    report_cards: HashMap<i64, ReportCard>,
    exam_results: Vec<ExamResult>,
    next_report_card_id: i64,
}

/// In-memory [`MappingStore`] and [`ClassStore`]
#[derive(Debug, Clone, Default)]
pub struct MemorySchoolStore {
    data: Arc<RwLock<SchoolData>>,
}

impl MemorySchoolStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_subject(&self, id: SubjectId, name: impl Into<String>) {
        self.data.write().subjects.insert(
            id,
            Subject {
                id,
                name: name.into(),
            },
        );
    }

    pub fn add_class(&self, id: ClassId, name: impl Into<String>, subject_ids: &[SubjectId]) {
        self.data.write().classes.insert(
            id,
            Class {
                id,
                name: name.into(),
                subject_ids: subject_ids.iter().copied().collect(),
            },
        );
    }

    /// Add a student enrolled in the class's current subjects
    pub fn add_student(&self, class_id: ClassId) -> StudentId {
        let id = Uuid::new_v4();
        let mut data = self.data.write();
        let subjects = data
            .classes
            .get(&class_id)
            .map(|c| c.subject_ids.clone())
            .unwrap_or_default();
        data.students.insert(id, Student { id, class_id });
        data.enrolments.insert(id, subjects);
        id
    }

    /// Create a report card with one empty item per subject currently mapped
    pub fn create_report_card(&self, student_id: StudentId, term_id: TermId) -> Result<i64, StoreError> {
        let mut data = self.data.write();
        let class_id = data
            .students
            .get(&student_id)
            .map(|s| s.class_id)
            .ok_or_else(|| StoreError::NotFound(format!("student {}", student_id)))?;
        let items = data
            .classes
            .get(&class_id)
            .map(|c| {
                c.subject_ids
                    .iter()
                    .map(|&subject_id| ReportCardItem {
                        subject_id,
                        score: None,
                    })
                    .collect()
            })
            .unwrap_or_default();

        data.next_report_card_id += 1;
        let id = data.next_report_card_id;
        data.report_cards.insert(
            id,
            ReportCard {
                id,
                student_id,
                class_id,
                term_id,
                items,
            },
        );
        Ok(id)
    }

    pub fn record_exam_result(&self, result: ExamResult) {
        self.data.write().exam_results.push(result);
    }

    pub fn report_card(&self, id: i64) -> Option<ReportCard> {
        self.data.read().report_cards.get(&id).cloned()
    }

    pub fn enrolment(&self, student_id: StudentId) -> BTreeSet<SubjectId> {
        self.data
            .read()
            .enrolments
            .get(&student_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl MappingStore for MemorySchoolStore {
    async fn sync_students_with_class_mappings(&self, class_id: ClassId) -> Result<StudentSync, StoreError> {
        let mut data = self.data.write();
        let mapped = data
            .classes
            .get(&class_id)
            .map(|c| c.subject_ids.clone())
            .ok_or_else(|| StoreError::NotFound(format!("class {}", class_id)))?;

        let unknown: Vec<SubjectId> = mapped
            .iter()
            .copied()
            .filter(|id| !data.subjects.contains_key(id))
            .collect();

        let mut report = StudentSync::default();
        let student_ids: Vec<StudentId> = data
            .students
            .values()
            .filter(|s| s.class_id == class_id)
            .map(|s| s.id)
            .collect();

        for student_id in student_ids {
            if !unknown.is_empty() {
                report.errors.push(format!(
                    "Student {}: mapped subjects {:?} do not exist",
                    student_id, unknown
                ));
                continue;
            }

            let enrolment = data.enrolments.entry(student_id).or_default();
            if *enrolment != mapped {
                *enrolment = mapped.clone();
                report.synced += 1;
            }
        }

        Ok(report)
    }

    async fn cleanup_report_cards_for_classes(
        &self,
        class_ids: &[ClassId],
    ) -> Result<ReportCardCleanup, StoreError> {
        let mut data = self.data.write();
        let SchoolData {
            classes,
            report_cards,
            ..
        } = &mut *data;

        let mut items_removed = 0;
        for card in report_cards
            .values_mut()
            .filter(|c| class_ids.contains(&c.class_id))
        {
            let Some(class) = classes.get(&card.class_id) else {
                continue;
            };
            let before = card.items.len();
            card.items.retain(|i| class.subject_ids.contains(&i.subject_id));
            items_removed += before - card.items.len();
        }

        Ok(ReportCardCleanup { items_removed })
    }

    async fn add_missing_subjects_to_report_cards(
        &self,
        class_ids: &[ClassId],
    ) -> Result<ReportCardBackfill, StoreError> {
        let mut data = self.data.write();
        let SchoolData {
            classes,
            report_cards,
            exam_results,
            ..
        } = &mut *data;

        let mut report = ReportCardBackfill::default();
        for card in report_cards
            .values_mut()
            .filter(|c| class_ids.contains(&c.class_id))
        {
            let Some(class) = classes.get(&card.class_id) else {
                report
                    .errors
                    .push(format!("Report card {}: class {} not found", card.id, card.class_id));
                continue;
            };

            for &subject_id in &class.subject_ids {
                if card.has_subject(subject_id) {
                    continue;
                }
                let score = exam_results
                    .iter()
                    .find(|r| {
                        r.student_id == card.student_id
                            && r.subject_id == subject_id
                            && r.term_id == card.term_id
                    })
                    .map(ExamResult::percentage);
                if score.is_some() {
                    report.exam_scores_synced += 1;
                }
                card.items.push(ReportCardItem { subject_id, score });
                report.items_added += 1;
            }
        }

        Ok(report)
    }
}

#[async_trait]
impl ClassStore for MemorySchoolStore {
    async fn get_class(&self, class_id: ClassId) -> Result<Option<Class>, StoreError> {
        Ok(self.data.read().classes.get(&class_id).cloned())
    }

    async fn set_class_subjects(
        &self,
        class_id: ClassId,
        subject_ids: &[SubjectId],
    ) -> Result<Class, StoreError> {
        let mut data = self.data.write();
        if let Some(missing) = subject_ids.iter().find(|id| !data.subjects.contains_key(*id)) {
            return Err(StoreError::NotFound(format!("subject {}", missing)));
        }
        let class = data
            .classes
            .get_mut(&class_id)
            .ok_or_else(|| StoreError::NotFound(format!("class {}", class_id)))?;
        class.subject_ids = subject_ids.iter().copied().collect();
        Ok(class.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MATH: SubjectId = 1;
    const ENGLISH: SubjectId = 2;
    const SCIENCE: SubjectId = 3;

    fn store() -> MemorySchoolStore {
        let store = MemorySchoolStore::new();
        store.add_subject(MATH, "Math");
        store.add_subject(ENGLISH, "English");
        store.add_subject(SCIENCE, "Science");
        store.add_class(12, "JSS 2", &[MATH, ENGLISH]);
        store
    }

    #[tokio::test]
    async fn test_student_sync_follows_mapping() {
        let store = store();
        let student = store.add_student(12);
        assert_eq!(store.enrolment(student), BTreeSet::from([MATH, ENGLISH]));

        store.set_class_subjects(12, &[MATH, SCIENCE]).await.unwrap();
        let sync = store.sync_students_with_class_mappings(12).await.unwrap();
        assert_eq!(sync.synced, 1);
        assert!(sync.errors.is_empty());
        assert_eq!(store.enrolment(student), BTreeSet::from([MATH, SCIENCE]));

        // already aligned
        let again = store.sync_students_with_class_mappings(12).await.unwrap();
        assert_eq!(again.synced, 0);
    }

    #[tokio::test]
    async fn test_sync_unknown_class() {
        let err = store().sync_students_with_class_mappings(99).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert!(!err.is_unavailable());
    }

    #[tokio::test]
    async fn test_cleanup_and_backfill() {
        let store = store();
        let student = store.add_student(12);
        let card = store.create_report_card(student, 1).unwrap();
        store.record_exam_result(ExamResult {
            student_id: student,
            subject_id: SCIENCE,
            term_id: 1,
            score: 36.0,
            max_score: 40.0,
        });

        store.set_class_subjects(12, &[MATH, SCIENCE]).await.unwrap();

        let cleanup = store.cleanup_report_cards_for_classes(&[12]).await.unwrap();
        assert_eq!(cleanup.items_removed, 1);

        let backfill = store.add_missing_subjects_to_report_cards(&[12]).await.unwrap();
        assert_eq!(backfill.items_added, 1);
        assert_eq!(backfill.exam_scores_synced, 1);

        let card = store.report_card(card).unwrap();
        let subjects: Vec<_> = card.items.iter().map(|i| i.subject_id).collect();
        assert_eq!(subjects, vec![MATH, SCIENCE]);
        assert_eq!(card.items[1].score, Some(90.0));
    }

    #[tokio::test]
    async fn test_set_class_subjects_validates() {
        let store = store();
        assert!(matches!(
            store.set_class_subjects(12, &[MATH, 42]).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.set_class_subjects(77, &[MATH]).await,
            Err(StoreError::NotFound(_))
        ));
        let class = store.get_class(12).await.unwrap().unwrap();
        assert_eq!(class.subject_ids, BTreeSet::from([MATH, ENGLISH]));
    }

    #[test]
    fn test_exam_percentage() {
        let result = ExamResult {
            student_id: Uuid::new_v4(),
            subject_id: MATH,
            term_id: 1,
            score: 30.0,
            max_score: 0.0,
        };
        assert_eq!(result.percentage(), 0.0);
    }
}
