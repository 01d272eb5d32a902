//! In-process cache with scoped and pattern invalidation
//!
//! Keys are colon-separated namespaces (`exam-visibility:class:12:student:...`).
//! A *scope* is a key prefix ending at a segment boundary: the scope
//! `exam-visibility:class:1` covers `exam-visibility:class:1` and
//! `exam-visibility:class:1:...` but not `exam-visibility:class:12`.
//!
//! Every scope has a generation counter. Invalidating a scope removes its
//! entries and retires the current generation, so a computation that started
//! before the invalidation can detect that its result is stale and skip
//! [`MemoryCache::insert_if_current`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use regex::Regex;
use serde::{de::DeserializeOwned, Serialize};

use crate::school::ClassId;

/// Report-card namespaces dropped on every mapping change
pub const REPORT_CARD_PATTERNS: &[&str] = &[
    "^reportcard:",
    "^reportcards:",
    "^report-card",
    "^student-report",
];

#[derive(Debug, Clone)]
struct CacheEntry {
    value: serde_json::Value,
    expires_at: Instant,
}

/// Cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub invalidations: u64,
    pub keys_invalidated: u64,
}

/// Thread-safe TTL cache of JSON values
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    generations: RwLock<HashMap<String, u64>>,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
    keys_invalidated: AtomicU64,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a live entry
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let now = Instant::now();
        let value = {
            let entries = self.entries.read();
            entries
                .get(key)
                .filter(|e| e.expires_at > now)
                .map(|e| e.value.clone())
        };

        match value.and_then(|v| serde_json::from_value(v).ok()) {
            Some(v) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(v)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a value for `ttl`. Values that fail to serialize are not cached.
    pub fn set<T: Serialize>(&self, key: impl Into<String>, value: &T, ttl: Duration) {
        let key = key.into();
        match serde_json::to_value(value) {
            Ok(value) => {
                self.entries.write().insert(
                    key,
                    CacheEntry {
                        value,
                        expires_at: Instant::now() + ttl,
                    },
                );
            }
            Err(e) => tracing::warn!(key = %key, error = %e, "Value not cacheable"),
        }
    }

    /// Current generation of a scope
    pub fn generation(&self, scope: &str) -> u64 {
        self.generations.read().get(scope).copied().unwrap_or(0)
    }

    /// Store a value only if `scope` has not been invalidated since
    /// `observed_generation` was read. Returns whether the value was stored.
    pub fn insert_if_current<T: Serialize>(
        &self,
        scope: &str,
        key: impl Into<String>,
        value: &T,
        ttl: Duration,
        observed_generation: u64,
    ) -> bool {
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(_) => return false,
        };
        // hold the generation lock so an invalidation cannot slip in between
        let generations = self.generations.read();
        if generations.get(scope).copied().unwrap_or(0) != observed_generation {
            return false;
        }
        self.entries.write().insert(
            key.into(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        true
    }

    /// Remove every entry in `scope` and retire its generation.
    ///
    /// Returns entries removed plus one for the retired generation.
    pub fn invalidate_scope(&self, scope: &str) -> usize {
        let mut generations = self.generations.write();
        let removed = {
            let mut entries = self.entries.write();
            let before = entries.len();
            entries.retain(|key, _| !in_scope(key, scope));
            before - entries.len()
        };
        *generations.entry(scope.to_string()).or_insert(0) += 1;
        drop(generations);

        self.record_invalidation(removed + 1)
    }

    /// Remove every entry whose key matches `pattern`.
    ///
    /// The pattern source acts as its own scope for generation purposes.
    pub fn invalidate_matching(&self, pattern: &Regex) -> usize {
        let mut generations = self.generations.write();
        let removed = {
            let mut entries = self.entries.write();
            let before = entries.len();
            entries.retain(|key, _| !pattern.is_match(key));
            before - entries.len()
        };
        *generations.entry(pattern.as_str().to_string()).or_insert(0) += 1;
        drop(generations);

        self.record_invalidation(removed + 1)
    }

    /// Drop expired entries
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStats {
            entries: self.len(),
            hits,
            misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
            invalidations: self.invalidations.load(Ordering::Relaxed),
            keys_invalidated: self.keys_invalidated.load(Ordering::Relaxed),
        }
    }

    fn record_invalidation(&self, count: usize) -> usize {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        self.keys_invalidated
            .fetch_add(count as u64, Ordering::Relaxed);
        count
    }
}

fn in_scope(key: &str, scope: &str) -> bool {
    match key.strip_prefix(scope) {
        Some(rest) => rest.is_empty() || rest.starts_with(':'),
        None => false,
    }
}

// ============================================================================
// Invalidation seams
// ============================================================================

/// Drops cached state derived from one class
pub trait ClassCacheInvalidator: Send + Sync {
    /// Returns the number of keys invalidated
    fn invalidate_class(&self, class_id: ClassId) -> usize;
}

/// Drops cached state by key pattern
pub trait PatternInvalidator: Send + Sync {
    fn invalidate_pattern(&self, pattern: &Regex) -> usize;
}

impl PatternInvalidator for MemoryCache {
    fn invalidate_pattern(&self, pattern: &Regex) -> usize {
        self.invalidate_matching(pattern)
    }
}

/// Which exams a class's students may see
#[derive(Debug, Clone)]
pub struct ExamVisibilityCache {
    cache: Arc<MemoryCache>,
}

impl ExamVisibilityCache {
    const PREFIX: &'static str = "exam-visibility:class";

    pub fn new(cache: Arc<MemoryCache>) -> Self {
        Self { cache }
    }

    pub fn scope(class_id: ClassId) -> String {
        format!("{}:{}", Self::PREFIX, class_id)
    }

    /// Key for one student's visible exams
    pub fn student_key(class_id: ClassId, student_id: &uuid::Uuid) -> String {
        format!("{}:student:{}", Self::scope(class_id), student_id)
    }

    pub fn cache(&self) -> &MemoryCache {
        &self.cache
    }
}

impl ClassCacheInvalidator for ExamVisibilityCache {
    fn invalidate_class(&self, class_id: ClassId) -> usize {
        self.cache.invalidate_scope(&Self::scope(class_id))
    }
}

/// Which teachers and subjects are assigned to a class
#[derive(Debug, Clone)]
pub struct SubjectAssignmentCache {
    cache: Arc<MemoryCache>,
}

impl SubjectAssignmentCache {
    const PREFIX: &'static str = "subject-assignment:class";

    pub fn new(cache: Arc<MemoryCache>) -> Self {
        Self { cache }
    }

    pub fn scope(class_id: ClassId) -> String {
        format!("{}:{}", Self::PREFIX, class_id)
    }

    pub fn cache(&self) -> &MemoryCache {
        &self.cache
    }
}

impl ClassCacheInvalidator for SubjectAssignmentCache {
    fn invalidate_class(&self, class_id: ClassId) -> usize {
        self.cache.invalidate_scope(&Self::scope(class_id))
    }
}

/// Report card summary key for a student and term
pub fn report_card_key(student_id: &uuid::Uuid, term_id: i64) -> String {
    format!("reportcard:{}:{}", student_id, term_id)
}

/// Compile [`REPORT_CARD_PATTERNS`]
pub fn report_card_patterns() -> Vec<Regex> {
    REPORT_CARD_PATTERNS
        .iter()
        .filter_map(|p| match Regex::new(p) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::error!(pattern = p, error = %e, "Invalid cache pattern");
                None
            }
        })
        .collect()
}
