//! Client session guard
//!
//! The browser keeps the signed-in user, the token and a last-activity mark
//! in durable storage, plus a reload flag in per-tab storage. This module
//! holds the rules over those slots so any client shell (web, desktop,
//! test harness) enforces the same lifecycle:
//!
//! - interaction refreshes the activity mark
//! - a periodic check logs out after [`SessionPolicy::idle_timeout`]
//! - a reload (flag written on unload, seen on next load) always logs out
//! - stored state that fails to parse logs out
//!
//! ```ignore
//! use school_portal::session::{MemoryStore, SessionGuard, now_ms};
//!
//! let mut guard = SessionGuard::new(MemoryStore::new(), MemoryStore::new());
//! guard.on_load(now_ms());
//! guard.login(&user, &token, now_ms())?;
//! // on mousemove / keydown / click / scroll
//! guard.record_activity(now_ms());
//! // every guard.policy().check_interval
//! if let Some(reason) = guard.tick(now_ms()) {
//!     show_message(reason.message());
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::observability::SecurityEvent;
use crate::users::UserSummary;

/// Durable slot: signed-in user (JSON)
pub const USER_KEY: &str = "auth-user";
/// Durable slot: bearer token
pub const TOKEN_KEY: &str = "token";
/// Durable slot: last activity, unix millis
pub const ACTIVITY_KEY: &str = "last-activity";
/// Transient slot: set on unload, read on next load
pub const RELOAD_KEY: &str = "is-reload";

/// Current time in unix millis
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ============================================================================
// Storage
// ============================================================================

/// String key-value storage slot
pub trait ActivityStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String);
    fn remove(&self, key: &str);
}

/// In-process store, shared between clones
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ActivityStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: String) {
        self.values.write().insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        self.values.write().remove(key);
    }
}

// ============================================================================
// Policy
// ============================================================================

#[derive(Debug, Clone)]
pub struct SessionPolicy {
    /// Inactivity after which the session ends
    pub idle_timeout: Duration,
    /// How often the client should call [`SessionGuard::tick`]
    pub check_interval: Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(5 * 60),
            check_interval: Duration::from_secs(60),
        }
    }
}

impl SessionPolicy {
    /// Whether `last_activity_ms` is too old at `now_ms`
    pub fn is_idle(&self, last_activity_ms: i64, now_ms: i64) -> bool {
        let idle = now_ms.saturating_sub(last_activity_ms);
        idle >= self.idle_timeout.as_millis() as i64
    }
}

// ============================================================================
// Termination
// ============================================================================

/// Why a client session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTerminationReason {
    /// No interaction within the idle timeout
    IdleTimeout,
    /// The page was reloaded
    Reload,
    /// Stored session data could not be read
    Corrupt,
    /// User chose to sign out
    UserLogout,
}

impl SessionTerminationReason {
    pub fn message(&self) -> &'static str {
        match self {
            Self::IdleTimeout => "Your session timed out due to inactivity. Please sign in again.",
            Self::Reload => "You were signed out because the page was reloaded.",
            Self::Corrupt => "Your session could not be restored. Please sign in again.",
            Self::UserLogout => "You have been signed out.",
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::IdleTimeout => "idle_timeout",
            Self::Reload => "reload",
            Self::Corrupt => "corrupt",
            Self::UserLogout => "user_logout",
        }
    }
}

impl std::fmt::Display for SessionTerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Result of restoring state on page load
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// Stored session is live; activity mark refreshed
    Restored(UserSummary),
    /// Nothing stored
    Anonymous,
    /// Stored session was discarded
    Terminated(SessionTerminationReason),
}

// ============================================================================
// Guard
// ============================================================================

/// Session lifecycle over a durable and a transient store
pub struct SessionGuard<D: ActivityStore, T: ActivityStore> {
    durable: D,
    transient: T,
    policy: SessionPolicy,
    user: Option<UserSummary>,
}

impl<D: ActivityStore, T: ActivityStore> SessionGuard<D, T> {
    pub fn new(durable: D, transient: T) -> Self {
        Self::with_policy(durable, transient, SessionPolicy::default())
    }

    pub fn with_policy(durable: D, transient: T, policy: SessionPolicy) -> Self {
        Self {
            durable,
            transient,
            policy,
            user: None,
        }
    }

    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    pub fn user(&self) -> Option<&UserSummary> {
        self.user.as_ref()
    }

    pub fn token(&self) -> Option<String> {
        self.user.as_ref().and_then(|_| self.durable.get(TOKEN_KEY))
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// Restore the session stored by a previous page, if still valid.
    pub fn on_load(&mut self, now_ms: i64) -> LoadOutcome {
        let is_reload = self.transient.get(RELOAD_KEY).as_deref() == Some("true");
        if is_reload {
            self.terminate(SessionTerminationReason::Reload);
            return LoadOutcome::Terminated(SessionTerminationReason::Reload);
        }

        let Some(stored) = self.durable.get(USER_KEY) else {
            return LoadOutcome::Anonymous;
        };

        let user: UserSummary = match serde_json::from_str(&stored) {
            Ok(user) => user,
            Err(e) => {
                tracing::warn!(error = %e, "Stored session user unreadable");
                self.terminate(SessionTerminationReason::Corrupt);
                return LoadOutcome::Terminated(SessionTerminationReason::Corrupt);
            }
        };

        match self.last_activity() {
            Ok(Some(last)) if self.policy.is_idle(last, now_ms) => {
                self.terminate(SessionTerminationReason::IdleTimeout);
                return LoadOutcome::Terminated(SessionTerminationReason::IdleTimeout);
            }
            Err(()) => {
                self.terminate(SessionTerminationReason::Corrupt);
                return LoadOutcome::Terminated(SessionTerminationReason::Corrupt);
            }
            _ => {}
        }

        self.durable.set(ACTIVITY_KEY, now_ms.to_string());
        self.user = Some(user.clone());
        LoadOutcome::Restored(user)
    }

    /// Store a freshly issued session.
    pub fn login(&mut self, user: &UserSummary, token: &str, now_ms: i64) -> Result<(), serde_json::Error> {
        let stored = serde_json::to_string(user)?;
        self.durable.set(USER_KEY, stored);
        self.durable.set(TOKEN_KEY, token.to_string());
        self.durable.set(ACTIVITY_KEY, now_ms.to_string());
        self.transient.remove(RELOAD_KEY);
        self.user = Some(user.clone());
        Ok(())
    }

    /// Replace the stored profile (after a password or profile change).
    ///
    /// Ignored when signed out; returns whether anything was stored. The
    /// token and activity mark are left alone.
    pub fn update_user(&mut self, user: &UserSummary) -> Result<bool, serde_json::Error> {
        if self.user.is_none() {
            return Ok(false);
        }
        self.durable.set(USER_KEY, serde_json::to_string(user)?);
        self.user = Some(user.clone());
        Ok(true)
    }

    pub fn logout(&mut self) {
        if let Some(user) = &self.user {
            tracing::debug!(user_id = %user.id, "Client session signed out");
        }
        self.clear();
    }

    /// Interaction event (pointer, key, click or scroll)
    pub fn record_activity(&self, now_ms: i64) {
        if self.user.is_some() {
            self.durable.set(ACTIVITY_KEY, now_ms.to_string());
        }
    }

    /// Mark the page as unloading so the next load signs out
    pub fn before_unload(&self) {
        self.transient.set(RELOAD_KEY, "true".to_string());
    }

    /// Periodic idle check. Returns the reason if the session just ended.
    pub fn tick(&mut self, now_ms: i64) -> Option<SessionTerminationReason> {
        match self.last_activity() {
            Ok(Some(last)) if self.policy.is_idle(last, now_ms) => {
                self.terminate(SessionTerminationReason::IdleTimeout);
                Some(SessionTerminationReason::IdleTimeout)
            }
            Err(()) => {
                self.terminate(SessionTerminationReason::Corrupt);
                Some(SessionTerminationReason::Corrupt)
            }
            _ => None,
        }
    }

    fn last_activity(&self) -> Result<Option<i64>, ()> {
        match self.durable.get(ACTIVITY_KEY) {
            None => Ok(None),
            Some(raw) => raw.trim().parse().map(Some).map_err(|_| {
                tracing::warn!(value = %raw, "Stored activity mark unreadable");
            }),
        }
    }

    fn terminate(&mut self, reason: SessionTerminationReason) {
        crate::security_event!(
            SecurityEvent::SessionExpired,
            reason = %reason.code(),
            user_id = ?self.user.as_ref().map(|u| u.id),
            "Client session ended"
        );
        self.clear();
    }

    fn clear(&mut self) {
        self.user = None;
        self.durable.remove(USER_KEY);
        self.durable.remove(TOKEN_KEY);
        self.durable.remove(ACTIVITY_KEY);
        self.transient.remove(RELOAD_KEY);
    }
}
