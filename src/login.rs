//! Login Attempt Tracking
//!
//! Brute-force protection for the login endpoint. Two in-memory tables are
//! kept per login key:
//!
//! - an **attempt record**: failure count and the time of the last failure,
//!   forgotten once the rate-limit window (15 minutes) has passed
//! - a **violation record**: timestamps of every time a caller came back while
//!   still over the attempt threshold; enough of them inside the violation
//!   window (1 hour) suspends the key regardless of password correctness
//!
//! Reserved test identifiers (`student`, `teacher`, ...) are exempt in every
//! environment unless the deployment replaces the exempt list.
//!
//! # Login key
//!
//! Both tables use the same key: the identifier, trimmed and lowercased (see
//! [`login_key`]). The client address is logged alongside but never part of
//! the key, so a username cannot dodge its counter by rotating addresses.
//!
//! # Usage
//!
//! ```ignore
//! use school_portal::login::{LoginTracker, LockoutPolicy, LoginStatus};
//!
//! let tracker = LoginTracker::new(LockoutPolicy::production());
//! let _sweeper = tracker.spawn_sweeper(Duration::from_secs(300));
//!
//! match tracker.guard(identifier) {
//!     LoginStatus::Ok => { /* check credentials */ }
//!     LoginStatus::RateLimited { remaining_minutes } => { /* 429 */ }
//!     LoginStatus::Suspended => { /* 429, contact administrator */ }
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::config::Environment;
use crate::observability::SecurityEvent;

/// Identifiers reserved for demo/test accounts
pub const TEST_IDENTIFIERS: &[&str] = &["student", "teacher", "admin", "parent", "superadmin"];

// ============================================================================
// Lockout Policy
// ============================================================================

/// Thresholds for attempt counting and suspension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockoutPolicy {
    /// Failures allowed inside the window before callers are rate limited
    pub max_attempts: u32,

    /// How long a failure counts against the key
    pub attempt_window: Duration,

    /// Violations inside the violation window that trigger a suspension
    pub max_violations: u32,

    /// How long a violation counts toward suspension
    pub violation_window: Duration,

    /// Lowercased identifiers that bypass all counting
    pub exempt_identifiers: Vec<String>,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self::production()
    }
}

impl LockoutPolicy {
    /// Production thresholds: 5 attempts per 15 minutes, 3 violations per hour.
    /// The test accounts are exempt.
    pub fn production() -> Self {
        Self {
            max_attempts: 5,
            attempt_window: Duration::from_secs(15 * 60),
            max_violations: 3,
            violation_window: Duration::from_secs(60 * 60),
            exempt_identifiers: TEST_IDENTIFIERS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Development thresholds
    pub fn development() -> Self {
        Self {
            max_attempts: 100,
            max_violations: 50,
            ..Self::production()
        }
    }

    pub fn for_environment(environment: Environment) -> Self {
        match environment {
            Environment::Production => Self::production(),
            Environment::Development => Self::development(),
        }
    }

    /// Create a new builder starting from production thresholds
    pub fn builder() -> LockoutPolicyBuilder {
        LockoutPolicyBuilder::default()
    }

    /// Whether an identifier bypasses counting (case-insensitive)
    pub fn is_exempt(&self, identifier: &str) -> bool {
        let key = login_key(identifier);
        self.exempt_identifiers.iter().any(|e| *e == key)
    }
}

/// Builder for LockoutPolicy
#[derive(Debug, Clone, Default)]
pub struct LockoutPolicyBuilder {
    policy: LockoutPolicy,
}

impl LockoutPolicyBuilder {
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.policy.max_attempts = attempts;
        self
    }

    pub fn attempt_window(mut self, window: Duration) -> Self {
        self.policy.attempt_window = window;
        self
    }

    pub fn max_violations(mut self, violations: u32) -> Self {
        self.policy.max_violations = violations;
        self
    }

    pub fn violation_window(mut self, window: Duration) -> Self {
        self.policy.violation_window = window;
        self
    }

    /// Add an exempt identifier
    pub fn exempt(mut self, identifier: &str) -> Self {
        self.policy.exempt_identifiers.push(login_key(identifier));
        self
    }

    pub fn build(self) -> LockoutPolicy {
        self.policy
    }
}

/// Normalize an identifier into the key used by both tables
pub fn login_key(identifier: &str) -> String {
    identifier.trim().to_lowercase()
}

// ============================================================================
// Records
// ============================================================================

/// Failed attempts for one login key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptRecord {
    /// Failures since the record was created
    pub count: u32,
    /// Time of the most recent failure
    pub last_attempt: Instant,
}

impl AttemptRecord {
    fn within_window(&self, window: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.last_attempt) < window
    }
}

/// Threshold violations for one login key, oldest first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViolationRecord {
    pub timestamps: Vec<Instant>,
}

impl ViolationRecord {
    /// Violations still inside the window
    pub fn recent(&self, window: Duration, now: Instant) -> usize {
        self.timestamps
            .iter()
            .filter(|&&t| now.saturating_duration_since(t) < window)
            .count()
    }

    fn prune(&mut self, window: Duration, now: Instant) {
        self.timestamps
            .retain(|&t| now.saturating_duration_since(t) < window);
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// Gate decision for a login key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStatus {
    /// Credentials may be checked
    Ok,
    /// Too many recent failures; wait for the window to pass
    RateLimited { remaining_minutes: u64 },
    /// Too many violations; an administrator must step in or the hour must pass
    Suspended,
}

impl LoginStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// Result of recording a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptResult {
    /// Failures currently on record
    pub failed_count: u32,
    /// Failures left before rate limiting kicks in
    pub remaining_attempts: u32,
    /// Whether this failure was itself a violation
    pub violation_recorded: bool,
}

/// Records removed by a sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub attempts_removed: usize,
    pub violations_pruned: usize,
    pub violation_records_removed: usize,
}

// ============================================================================
// Login Tracker
// ============================================================================

/// In-memory login attempt tracker
///
/// Cloning shares the underlying tables.
#[derive(Debug, Clone)]
pub struct LoginTracker {
    policy: Arc<LockoutPolicy>,
    attempts: Arc<RwLock<HashMap<String, AttemptRecord>>>,
    violations: Arc<RwLock<HashMap<String, ViolationRecord>>>,
}

impl LoginTracker {
    /// Create a new login tracker with the given policy
    pub fn new(policy: LockoutPolicy) -> Self {
        Self {
            policy: Arc::new(policy),
            attempts: Arc::new(RwLock::new(HashMap::new())),
            violations: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn policy(&self) -> &LockoutPolicy {
        &self.policy
    }

    /// Current gate decision, without side effects
    pub fn status(&self, identifier: &str) -> LoginStatus {
        self.status_at(identifier, Instant::now())
    }

    /// [`status`](Self::status) evaluated at `now`
    pub fn status_at(&self, identifier: &str, now: Instant) -> LoginStatus {
        if self.policy.is_exempt(identifier) {
            return LoginStatus::Ok;
        }
        let key = login_key(identifier);

        let recent_violations = self
            .violations
            .read()
            .get(&key)
            .map(|v| v.recent(self.policy.violation_window, now))
            .unwrap_or(0);
        if recent_violations >= self.policy.max_violations as usize {
            return LoginStatus::Suspended;
        }

        let attempts = self.attempts.read();
        match attempts.get(&key) {
            Some(record)
                if record.count >= self.policy.max_attempts
                    && record.within_window(self.policy.attempt_window, now) =>
            {
                let elapsed = now.saturating_duration_since(record.last_attempt);
                LoginStatus::RateLimited {
                    remaining_minutes: remaining_minutes(self.policy.attempt_window, elapsed),
                }
            }
            _ => LoginStatus::Ok,
        }
    }

    /// Gate a login attempt before credentials are checked.
    ///
    /// Same decision as [`status`](Self::status), except that being turned
    /// away while rate limited is itself recorded as a violation.
    pub fn guard(&self, identifier: &str) -> LoginStatus {
        self.guard_at(identifier, Instant::now())
    }

    /// [`guard`](Self::guard) evaluated at `now`
    pub fn guard_at(&self, identifier: &str, now: Instant) -> LoginStatus {
        let status = self.status_at(identifier, now);

        match status {
            LoginStatus::RateLimited { remaining_minutes } => {
                let key = login_key(identifier);
                let violations = self.add_violation(&key, now);
                log_rate_limited(&key, remaining_minutes, violations);
                if violations >= self.policy.max_violations as usize {
                    log_suspended(&key, violations);
                }
            }
            LoginStatus::Suspended => {
                crate::security_event!(
                    SecurityEvent::AccountSuspended,
                    identifier = %login_key(identifier),
                    "Login refused for suspended identifier"
                );
            }
            LoginStatus::Ok => {}
        }

        status
    }

    /// Record a failed login attempt
    pub fn record_failure(&self, identifier: &str) -> AttemptResult {
        self.record_failure_at(identifier, Instant::now())
    }

    /// [`record_failure`](Self::record_failure) at `now`
    pub fn record_failure_at(&self, identifier: &str, now: Instant) -> AttemptResult {
        if self.policy.is_exempt(identifier) {
            return AttemptResult {
                failed_count: 0,
                remaining_attempts: self.policy.max_attempts,
                violation_recorded: false,
            };
        }
        let key = login_key(identifier);

        let (failed_count, over_threshold) = {
            let mut attempts = self.attempts.write();
            let (previous, was_recent) = match attempts.get(&key) {
                Some(record) => (
                    record.count,
                    record.within_window(self.policy.attempt_window, now),
                ),
                None => (0, false),
            };
            // a stale record starts over
            let count = if was_recent { previous.saturating_add(1) } else { 1 };
            attempts.insert(
                key.clone(),
                AttemptRecord {
                    count,
                    last_attempt: now,
                },
            );
            (count, was_recent && previous >= self.policy.max_attempts)
        };

        if over_threshold {
            let violations = self.add_violation(&key, now);
            if violations >= self.policy.max_violations as usize {
                log_suspended(&key, violations);
            }
        }

        let remaining = self.policy.max_attempts.saturating_sub(failed_count);
        crate::security_event!(
            SecurityEvent::AuthenticationFailure,
            identifier = %key,
            failed_count = failed_count,
            remaining_attempts = remaining,
            "Login failed"
        );

        AttemptResult {
            failed_count,
            remaining_attempts: remaining,
            violation_recorded: over_threshold,
        }
    }

    /// Clear both records after a successful login
    pub fn record_success(&self, identifier: &str) {
        let key = login_key(identifier);
        self.attempts.write().remove(&key);
        self.violations.write().remove(&key);
    }

    /// Failures on record for an identifier
    pub fn attempt_count(&self, identifier: &str) -> u32 {
        self.attempts
            .read()
            .get(&login_key(identifier))
            .map(|r| r.count)
            .unwrap_or(0)
    }

    /// Violation timestamps on record for an identifier, pruned or not
    pub fn violation_count(&self, identifier: &str) -> usize {
        self.violations
            .read()
            .get(&login_key(identifier))
            .map(|v| v.timestamps.len())
            .unwrap_or(0)
    }

    /// Remove expired attempt records and stale violations
    pub fn sweep(&self) -> SweepStats {
        self.sweep_at(Instant::now())
    }

    /// [`sweep`](Self::sweep) at `now`
    pub fn sweep_at(&self, now: Instant) -> SweepStats {
        let mut stats = SweepStats::default();

        {
            let mut attempts = self.attempts.write();
            let before = attempts.len();
            attempts.retain(|_, r| r.within_window(self.policy.attempt_window, now));
            stats.attempts_removed = before - attempts.len();
        }

        {
            let mut violations = self.violations.write();
            let before = violations.len();
            violations.retain(|_, v| {
                let len = v.timestamps.len();
                v.prune(self.policy.violation_window, now);
                stats.violations_pruned += len - v.timestamps.len();
                !v.timestamps.is_empty()
            });
            stats.violation_records_removed = before - violations.len();
        }

        if stats != SweepStats::default() {
            crate::security_event!(
                SecurityEvent::LockoutRecordsSwept,
                attempts_removed = stats.attempts_removed,
                violations_pruned = stats.violations_pruned,
                violation_records_removed = stats.violation_records_removed,
                "Swept expired login records"
            );
        }

        stats
    }

    /// Run [`sweep`](Self::sweep) every `period` on the tokio runtime.
    ///
    /// Reads the time from the tokio clock, so a paused runtime drives it.
    /// The task stops when the returned handle is dropped.
    pub fn spawn_sweeper(&self, period: Duration) -> SweeperHandle {
        let tracker = self.clone();
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                tracker.sweep_at(tokio::time::Instant::now().into_std());
            }
        });

        tracing::debug!(period_secs = period.as_secs(), "Login sweeper started");
        SweeperHandle { task }
    }

    fn add_violation(&self, key: &str, now: Instant) -> usize {
        let mut violations = self.violations.write();
        let record = violations.entry(key.to_string()).or_default();
        record.timestamps.push(now);
        record.recent(self.policy.violation_window, now)
    }
}

/// Owns the background sweep task
#[derive(Debug)]
pub struct SweeperHandle {
    task: tokio::task::JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweep task
    pub fn shutdown(self) {
        // Drop aborts
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Whole minutes left in the window, rounded up, never below one
fn remaining_minutes(window: Duration, elapsed: Duration) -> u64 {
    let left_ms = window.saturating_sub(elapsed).as_millis() as u64;
    left_ms.div_ceil(60_000).max(1)
}

fn log_rate_limited(key: &str, remaining_minutes: u64, violations: usize) {
    crate::security_event!(
        SecurityEvent::LoginRateLimited,
        identifier = %key,
        remaining_minutes = remaining_minutes,
        violations = violations,
        "Login blocked by rate limit"
    );
}

fn log_suspended(key: &str, violations: usize) {
    crate::security_event!(
        SecurityEvent::AccountSuspended,
        identifier = %key,
        violations = violations,
        "Identifier suspended after repeated rate-limit violations"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    fn tracker() -> LoginTracker {
        LoginTracker::new(LockoutPolicy::production())
    }

    fn fail_n(tracker: &LoginTracker, id: &str, n: u32, at: Instant) {
        for _ in 0..n {
            tracker.record_failure_at(id, at);
        }
    }

    #[test]
    fn test_policies() {
        let prod = LockoutPolicy::production();
        assert_eq!(prod.max_attempts, 5);
        assert_eq!(prod.attempt_window, 15 * MINUTE);
        assert_eq!(prod.max_violations, 3);
        assert_eq!(prod.violation_window, 60 * MINUTE);
        assert!(!prod.is_exempt("parent55"));

        let dev = LockoutPolicy::development();
        assert_eq!(dev.max_attempts, 100);
        assert_eq!(dev.max_violations, 50);
        assert!(dev.is_exempt("SuperAdmin"));
        assert!(dev.is_exempt(" parent "));
        assert!(!dev.is_exempt("parent55"));
    }

    #[test]
    fn test_login_key_normalization() {
        let tracker = tracker();
        let now = Instant::now();
        tracker.record_failure_at("Parent55@School.org ", now);
        assert_eq!(tracker.attempt_count("parent55@school.org"), 1);
    }

    #[test]
    fn test_rate_limited_after_max_attempts() {
        let tracker = tracker();
        let start = Instant::now();
        fail_n(&tracker, "parent55", 4, start);
        assert_eq!(tracker.status_at("parent55", start), LoginStatus::Ok);

        let result = tracker.record_failure_at("parent55", start + 2 * MINUTE);
        assert_eq!(result.failed_count, 5);
        assert_eq!(result.remaining_attempts, 0);
        assert!(!result.violation_recorded);

        let status = tracker.status_at("parent55", start + 10 * MINUTE);
        assert_eq!(status, LoginStatus::RateLimited { remaining_minutes: 7 });
    }

    #[test]
    fn test_rate_limit_expires_with_window() {
        let tracker = tracker();
        let start = Instant::now();
        fail_n(&tracker, "parent55", 5, start);

        assert!(!tracker.status_at("parent55", start + 14 * MINUTE).is_ok());
        assert!(tracker.status_at("parent55", start + 15 * MINUTE).is_ok());
    }

    #[test]
    fn test_remaining_minutes_rounding() {
        assert_eq!(remaining_minutes(15 * MINUTE, Duration::ZERO), 15);
        assert_eq!(remaining_minutes(15 * MINUTE, Duration::from_secs(1)), 15);
        assert_eq!(remaining_minutes(15 * MINUTE, Duration::from_secs(14 * 60 + 59)), 1);
        assert_eq!(remaining_minutes(15 * MINUTE, 15 * MINUTE), 1);
    }

    #[test]
    fn test_guard_records_violation_when_rate_limited() {
        let tracker = tracker();
        let start = Instant::now();
        fail_n(&tracker, "parent55", 5, start);

        let status = tracker.guard_at("parent55", start + MINUTE);
        assert!(matches!(status, LoginStatus::RateLimited { .. }));
        assert_eq!(tracker.violation_count("parent55"), 1);

        // status alone has no side effects
        tracker.status_at("parent55", start + MINUTE);
        assert_eq!(tracker.violation_count("parent55"), 1);
    }

    #[test]
    fn test_suspended_after_max_violations() {
        let tracker = tracker();
        let start = Instant::now();

        // three separate lockouts within the hour
        for round in 0..3u32 {
            let t = start + round * 16 * MINUTE;
            fail_n(&tracker, "parent55", 5, t);
            assert!(matches!(
                tracker.guard_at("parent55", t + MINUTE),
                LoginStatus::RateLimited { .. }
            ));
        }

        // attempt window has reset, suspension still holds
        let later = start + 50 * MINUTE;
        assert_eq!(tracker.guard_at("parent55", later), LoginStatus::Suspended);

        // violations age out after an hour
        let much_later = start + 2 * 60 * MINUTE;
        assert_eq!(tracker.status_at("parent55", much_later), LoginStatus::Ok);
    }

    #[test]
    fn test_failure_over_threshold_is_violation() {
        let tracker = tracker();
        let start = Instant::now();
        fail_n(&tracker, "parent55", 5, start);

        let result = tracker.record_failure_at("parent55", start + MINUTE);
        assert!(result.violation_recorded);
        assert_eq!(tracker.violation_count("parent55"), 1);

        // previous failure outside the window: counter restarts
        let result = tracker.record_failure_at("parent55", start + 30 * MINUTE);
        assert!(!result.violation_recorded);
        assert_eq!(result.failed_count, 1);
    }

    #[test]
    fn test_success_clears_both_records() {
        let tracker = tracker();
        let start = Instant::now();
        fail_n(&tracker, "parent55", 5, start);
        tracker.guard_at("parent55", start + MINUTE);
        assert_eq!(tracker.violation_count("parent55"), 1);

        tracker.record_success("PARENT55");
        assert_eq!(tracker.attempt_count("parent55"), 0);
        assert_eq!(tracker.violation_count("parent55"), 0);
        assert!(tracker.status_at("parent55", start + MINUTE).is_ok());
    }

    #[test]
    fn test_exempt_identifiers_never_counted() {
        let tracker = LoginTracker::new(LockoutPolicy::development());
        let now = Instant::now();
        for _ in 0..500 {
            tracker.record_failure_at("Teacher", now);
            assert!(tracker.guard_at("teacher", now).is_ok());
        }
        assert_eq!(tracker.attempt_count("teacher"), 0);
        assert_eq!(tracker.violation_count("teacher"), 0);
    }

    #[test]
    fn test_test_accounts_exempt_in_production() {
        let policy = LockoutPolicy::production();
        for id in TEST_IDENTIFIERS {
            assert!(policy.is_exempt(id), "{id} should be exempt");
        }
        assert!(policy.is_exempt("Admin"));

        let tracker = tracker();
        let now = Instant::now();
        for _ in 0..20 {
            tracker.record_failure_at("student", now);
            assert!(tracker.guard_at("student", now).is_ok());
        }
        assert_eq!(tracker.attempt_count("student"), 0);
        assert_eq!(tracker.violation_count("student"), 0);
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let tracker = tracker();
        let start = Instant::now();

        fail_n(&tracker, "old", 5, start);
        tracker.guard_at("old", start + MINUTE);
        fail_n(&tracker, "fresh", 1, start + 20 * MINUTE);

        let stats = tracker.sweep_at(start + 30 * MINUTE);
        assert_eq!(stats.attempts_removed, 1);
        assert_eq!(stats.violation_records_removed, 0);
        assert_eq!(tracker.attempt_count("old"), 0);
        assert_eq!(tracker.attempt_count("fresh"), 1);
        assert_eq!(tracker.violation_count("old"), 1);

        let stats = tracker.sweep_at(start + 62 * MINUTE);
        assert_eq!(stats.violations_pruned, 1);
        assert_eq!(stats.violation_records_removed, 1);
        assert_eq!(tracker.violation_count("old"), 0);
    }

    #[test]
    fn test_sweep_prunes_partial_violation_records() {
        let tracker = tracker();
        let start = Instant::now();
        fail_n(&tracker, "parent55", 5, start);
        tracker.guard_at("parent55", start + MINUTE);
        tracker.guard_at("parent55", start + 10 * MINUTE);

        let stats = tracker.sweep_at(start + 65 * MINUTE);
        assert_eq!(stats.violations_pruned, 1);
        assert_eq!(stats.violation_records_removed, 0);
        assert_eq!(tracker.violation_count("parent55"), 1);
    }

    #[test]
    fn test_builder() {
        let policy = LockoutPolicy::builder()
            .max_attempts(2)
            .max_violations(1)
            .exempt("Demo")
            .build();
        assert_eq!(policy.max_attempts, 2);
        assert!(policy.is_exempt("demo"));
    }

    async fn settle() {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    fn clock_now() -> Instant {
        tokio::time::Instant::now().into_std()
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_sweeps_on_schedule() {
        let tracker = tracker();
        tracker.record_failure_at("parent55", clock_now());

        let handle = tracker.spawn_sweeper(5 * MINUTE);
        assert!(handle.is_running());
        settle().await;

        // ticks at 5 and 10 minutes, record still inside the window
        tokio::time::advance(10 * MINUTE).await;
        settle().await;
        assert_eq!(tracker.attempt_count("parent55"), 1);

        tokio::time::advance(10 * MINUTE).await;
        settle().await;
        assert_eq!(tracker.attempt_count("parent55"), 0);

        handle.shutdown();
        settle().await;
        tracker.record_failure_at("parent55", clock_now());
        tokio::time::advance(60 * MINUTE).await;
        settle().await;
        assert_eq!(tracker.attempt_count("parent55"), 1);
    }
}
