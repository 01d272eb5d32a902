//! Subject mapping propagation
//!
//! After an administrator changes which subjects a class takes, every piece
//! of state derived from that mapping is brought back in line before the
//! request returns:
//!
//! 1. exam-visibility cache for each class
//! 2. subject-assignment cache for each class
//! 3. all report-card cache namespaces (not class-scoped)
//! 4. student enrolment for each class
//! 5. report card items for unmapped subjects (opt-in)
//! 6. report card items for newly mapped subjects, with exam scores (opt-out)
//!
//! Steps 4 to 6 report problems in [`SyncResult::sync_errors`] instead of
//! failing the call. The only error returned is the store being unreachable
//! during steps 4 or 5.

use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::cache::{report_card_patterns, ClassCacheInvalidator, PatternInvalidator};
use crate::observability::SecurityEvent;
use crate::school::{ClassId, MappingStore, StoreError};

/// Which derived records to rebuild
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncOptions {
    /// Remove report card items for subjects no longer mapped
    pub cleanup_report_cards: bool,
    /// Add report card items for newly mapped subjects
    pub add_missing_subjects: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            cleanup_report_cards: false,
            add_missing_subjects: true,
        }
    }
}

/// What a sync did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub students_synced: usize,
    pub report_card_items_removed: usize,
    pub report_card_items_added: usize,
    pub exam_scores_synced: usize,
    pub cache_keys_invalidated: usize,
    /// Non-fatal problems, in the order they happened
    pub sync_errors: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("store unavailable during {step}: {source}")]
    StoreUnavailable {
        step: &'static str,
        #[source]
        source: StoreError,
    },
}

/// Coordinates cache invalidation and derived-record sync
#[derive(Clone)]
pub struct SubjectMappingSync {
    exam_visibility: Arc<dyn ClassCacheInvalidator>,
    subject_assignments: Arc<dyn ClassCacheInvalidator>,
    patterns: Arc<dyn PatternInvalidator>,
    store: Arc<dyn MappingStore>,
    report_card_patterns: Arc<Vec<Regex>>,
}

impl SubjectMappingSync {
    pub fn new(
        exam_visibility: Arc<dyn ClassCacheInvalidator>,
        subject_assignments: Arc<dyn ClassCacheInvalidator>,
        patterns: Arc<dyn PatternInvalidator>,
        store: Arc<dyn MappingStore>,
    ) -> Self {
        Self {
            exam_visibility,
            subject_assignments,
            patterns,
            store,
            report_card_patterns: Arc::new(report_card_patterns()),
        }
    }

    /// Invalidate report-card caches; returns keys invalidated
    pub fn invalidate_report_card_caches(&self) -> usize {
        self.report_card_patterns
            .iter()
            .map(|p| self.patterns.invalidate_pattern(p))
            .sum()
    }

    /// Propagate a mapping change for `class_ids`.
    pub async fn invalidate_subject_mappings_and_sync(
        &self,
        class_ids: &[ClassId],
        options: SyncOptions,
    ) -> Result<SyncResult, SyncError> {
        let mut result = SyncResult::default();

        for &class_id in class_ids {
            result.cache_keys_invalidated += self.exam_visibility.invalidate_class(class_id);
        }
        for &class_id in class_ids {
            result.cache_keys_invalidated += self.subject_assignments.invalidate_class(class_id);
        }
        result.cache_keys_invalidated += self.invalidate_report_card_caches();

        for &class_id in class_ids {
            match self.store.sync_students_with_class_mappings(class_id).await {
                Ok(sync) => {
                    result.students_synced += sync.synced;
                    result.sync_errors.extend(sync.errors);
                }
                Err(e) if e.is_unavailable() => {
                    return Err(SyncError::StoreUnavailable {
                        step: "student sync",
                        source: e,
                    })
                }
                Err(e) => {
                    tracing::warn!(class_id = class_id, error = %e, "Student sync failed");
                    result
                        .sync_errors
                        .push(format!("Failed to sync students for class {}: {}", class_id, e));
                }
            }
        }

        if options.cleanup_report_cards && !class_ids.is_empty() {
            match self.store.cleanup_report_cards_for_classes(class_ids).await {
                Ok(cleanup) => result.report_card_items_removed = cleanup.items_removed,
                Err(e) if e.is_unavailable() => {
                    return Err(SyncError::StoreUnavailable {
                        step: "report card cleanup",
                        source: e,
                    })
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Report card cleanup failed");
                    result
                        .sync_errors
                        .push(format!("Failed to clean up report cards: {}", e));
                }
            }
        }

        if options.add_missing_subjects && !class_ids.is_empty() {
            match self.store.add_missing_subjects_to_report_cards(class_ids).await {
                Ok(backfill) => {
                    result.report_card_items_added = backfill.items_added;
                    result.exam_scores_synced = backfill.exam_scores_synced;
                    result.sync_errors.extend(backfill.errors);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Adding missing subjects to report cards failed");
                    result
                        .sync_errors
                        .push(format!("Failed to add missing subjects: {}", e));
                }
            }
        }

        crate::security_event!(
            SecurityEvent::SubjectMappingSynced,
            classes = class_ids.len(),
            students_synced = result.students_synced,
            cache_keys_invalidated = result.cache_keys_invalidated,
            items_removed = result.report_card_items_removed,
            items_added = result.report_card_items_added,
            exam_scores_synced = result.exam_scores_synced,
            errors = result.sync_errors.len(),
            "Subject mapping sync complete"
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::cache::{ExamVisibilityCache, MemoryCache, SubjectAssignmentCache, REPORT_CARD_PATTERNS};
    use crate::school::{
        ClassStore, ExamResult, MemorySchoolStore, ReportCardBackfill, ReportCardCleanup, StudentSync,
    };

    const MATH: i64 = 1;
    const ENGLISH: i64 = 2;
    const SCIENCE: i64 = 3;

    fn coordinator(cache: Arc<MemoryCache>, store: Arc<dyn MappingStore>) -> SubjectMappingSync {
        SubjectMappingSync::new(
            Arc::new(ExamVisibilityCache::new(cache.clone())),
            Arc::new(SubjectAssignmentCache::new(cache.clone())),
            cache,
            store,
        )
    }

    /// Store whose backfill step always fails and whose sync can be made unreachable
    struct FlakyStore {
        sync_error: Option<StoreError>,
    }

    #[async_trait]
    impl MappingStore for FlakyStore {
        async fn sync_students_with_class_mappings(&self, _: ClassId) -> Result<StudentSync, StoreError> {
            match &self.sync_error {
                Some(e) => Err(e.clone()),
                None => Ok(StudentSync {
                    synced: 2,
                    errors: vec!["student 7 has no class".to_string()],
                }),
            }
        }

        async fn cleanup_report_cards_for_classes(&self, _: &[ClassId]) -> Result<ReportCardCleanup, StoreError> {
            Ok(ReportCardCleanup { items_removed: 1 })
        }

        async fn add_missing_subjects_to_report_cards(
            &self,
            _: &[ClassId],
        ) -> Result<ReportCardBackfill, StoreError> {
            Err(StoreError::Query("deadlock detected".to_string()))
        }
    }

    #[tokio::test]
    async fn test_class_12_mapping_change() {
        let store = Arc::new(MemorySchoolStore::new());
        store.add_subject(MATH, "Math");
        store.add_subject(ENGLISH, "English");
        store.add_subject(SCIENCE, "Science");
        store.add_class(12, "JSS 2", &[MATH, ENGLISH]);

        let students: Vec<_> = (0..3).map(|_| store.add_student(12)).collect();
        let cards: Vec<_> = students
            .iter()
            .map(|&s| store.create_report_card(s, 1).unwrap())
            .collect();
        store.record_exam_result(ExamResult {
            student_id: students[0],
            subject_id: SCIENCE,
            term_id: 1,
            score: 45.0,
            max_score: 60.0,
        });

        store.set_class_subjects(12, &[MATH, SCIENCE]).await.unwrap();

        let cache = Arc::new(MemoryCache::new());
        let sync = coordinator(cache, store.clone());
        let result = sync
            .invalidate_subject_mappings_and_sync(
                &[12],
                SyncOptions {
                    cleanup_report_cards: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(result.students_synced, 3);
        assert_eq!(result.report_card_items_removed, 3);
        assert_eq!(result.report_card_items_added, 3);
        assert_eq!(result.exam_scores_synced, 1);
        assert!(result.sync_errors.is_empty());

        for id in cards {
            let card = store.report_card(id).unwrap();
            assert!(!card.has_subject(ENGLISH));
            assert!(card.has_subject(SCIENCE));
            assert!(card.has_subject(MATH));
        }
    }

    #[tokio::test]
    async fn test_cache_count_covers_every_invalidation() {
        let cache = Arc::new(MemoryCache::new());
        let sync = coordinator(cache.clone(), Arc::new(FlakyStore { sync_error: None }));

        let result = sync
            .invalidate_subject_mappings_and_sync(
                &[12],
                SyncOptions {
                    cleanup_report_cards: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        // visibility + assignment for one class, plus each report card pattern
        assert!(result.cache_keys_invalidated >= 2 + REPORT_CARD_PATTERNS.len());
    }

    #[tokio::test]
    async fn test_cached_entries_are_dropped() {
        let cache = Arc::new(MemoryCache::new());
        let ttl = std::time::Duration::from_secs(60);
        let student = uuid::Uuid::new_v4();
        cache.set(ExamVisibilityCache::student_key(12, &student), &true, ttl);
        cache.set(SubjectAssignmentCache::scope(12), &vec![MATH], ttl);
        cache.set(crate::cache::report_card_key(&student, 1), &1, ttl);
        cache.set(ExamVisibilityCache::student_key(13, &student), &true, ttl);

        let sync = coordinator(cache.clone(), Arc::new(FlakyStore { sync_error: None }));
        let result = sync
            .invalidate_subject_mappings_and_sync(&[12], SyncOptions::default())
            .await
            .unwrap();

        assert_eq!(result.cache_keys_invalidated, 3 + 2 + REPORT_CARD_PATTERNS.len());
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_backfill_failure_is_reported_not_raised() {
        let cache = Arc::new(MemoryCache::new());
        let sync = coordinator(cache, Arc::new(FlakyStore { sync_error: None }));

        let result = sync
            .invalidate_subject_mappings_and_sync(
                &[12],
                SyncOptions {
                    cleanup_report_cards: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(result.students_synced, 2);
        assert_eq!(result.report_card_items_removed, 1);
        assert_eq!(result.report_card_items_added, 0);
        assert_eq!(result.sync_errors.len(), 2);
        assert_eq!(result.sync_errors[0], "student 7 has no class");
        assert!(result.sync_errors[1].starts_with("Failed to add missing subjects"));
    }

    #[tokio::test]
    async fn test_per_class_failures_are_collected() {
        let cache = Arc::new(MemoryCache::new());
        let store = FlakyStore {
            sync_error: Some(StoreError::NotFound("class 12".to_string())),
        };
        let sync = coordinator(cache, Arc::new(store));

        let result = sync
            .invalidate_subject_mappings_and_sync(
                &[12, 13],
                SyncOptions {
                    add_missing_subjects: false,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(result.students_synced, 0);
        assert_eq!(result.sync_errors.len(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_store_propagates() {
        let cache = Arc::new(MemoryCache::new());
        let store = FlakyStore {
            sync_error: Some(StoreError::Unavailable("connection refused".to_string())),
        };
        let sync = coordinator(cache, Arc::new(store));

        let err = sync
            .invalidate_subject_mappings_and_sync(&[12], SyncOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::StoreUnavailable { step: "student sync", .. }));
    }

    #[tokio::test]
    async fn test_empty_class_list_skips_store_steps() {
        let cache = Arc::new(MemoryCache::new());
        let sync = coordinator(cache, Arc::new(FlakyStore { sync_error: None }));

        let result = sync
            .invalidate_subject_mappings_and_sync(
                &[],
                SyncOptions {
                    cleanup_report_cards: true,
                    add_missing_subjects: true,
                },
            )
            .await
            .unwrap();

        assert_eq!(result.cache_keys_invalidated, REPORT_CARD_PATTERNS.len());
        assert_eq!(result.report_card_items_removed, 0);
        assert!(result.sync_errors.is_empty());
    }

    #[test]
    fn test_options_and_result_wire_format() {
        let options: SyncOptions = serde_json::from_str(r#"{"cleanupReportCards":true}"#).unwrap();
        assert!(options.cleanup_report_cards);
        assert!(options.add_missing_subjects);

        let json = serde_json::to_value(SyncResult::default()).unwrap();
        assert!(json.get("cacheKeysInvalidated").is_some());
        assert!(json.get("syncErrors").is_some());
    }
}
