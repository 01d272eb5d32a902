//! Security and audit event logging
//!
//! Every authentication decision, lockout change and administrative sync in
//! the portal is logged through [`security_event!`] so the audit trail has a
//! consistent shape: `security_event`, `category` and `severity` fields plus
//! whatever the call site adds.
//!
//! ```ignore
//! use school_portal::observability::SecurityEvent;
//!
//! school_portal::security_event!(
//!     SecurityEvent::LoginRateLimited,
//!     identifier = %key,
//!     remaining_minutes = minutes,
//!     "Login blocked by rate limit"
//! );
//! ```

use std::fmt;

/// Security event categories for audit logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityEvent {
    // Authentication
    /// Credentials accepted and a token issued
    AuthenticationSuccess,
    /// Credentials rejected
    AuthenticationFailure,
    /// Bearer token rejected (signature, expiry, user or role check)
    TokenRejected,
    /// User logged out
    Logout,
    /// Client-side session ended (idle timeout, reload, corrupt state)
    SessionExpired,

    // Authorization
    /// Role not permitted for a route
    AccessDenied,

    // Account protection
    /// Login attempt blocked by the attempt window
    LoginRateLimited,
    /// Repeated violations escalated to a suspension
    AccountSuspended,
    /// Housekeeping removed expired attempt/violation records
    LockoutRecordsSwept,
    /// Password changed by the account owner
    PasswordChanged,

    // Administrative data changes
    /// Class-subject mapping edited
    SubjectMappingChanged,
    /// Derived caches and records re-synchronized after a mapping change
    SubjectMappingSynced,

    // System
    /// Server started
    SystemStartup,
    /// Server shutting down
    SystemShutdown,
}

impl SecurityEvent {
    /// Get the event category for filtering/grouping
    pub fn category(&self) -> &'static str {
        match self {
            Self::AuthenticationSuccess
            | Self::AuthenticationFailure
            | Self::TokenRejected
            | Self::Logout
            | Self::SessionExpired => "authentication",

            Self::AccessDenied => "authorization",

            Self::LoginRateLimited
            | Self::AccountSuspended
            | Self::LockoutRecordsSwept
            | Self::PasswordChanged => "account_protection",

            Self::SubjectMappingChanged | Self::SubjectMappingSynced => "administration",

            Self::SystemStartup | Self::SystemShutdown => "system",
        }
    }

    /// Get the severity level for the event
    pub fn severity(&self) -> Severity {
        match self {
            Self::AccountSuspended => Severity::Critical,

            Self::AuthenticationFailure
            | Self::TokenRejected
            | Self::AccessDenied
            | Self::LoginRateLimited => Severity::High,

            Self::AuthenticationSuccess
            | Self::PasswordChanged
            | Self::SubjectMappingChanged
            | Self::SubjectMappingSynced => Severity::Medium,

            Self::Logout
            | Self::SessionExpired
            | Self::LockoutRecordsSwept
            | Self::SystemStartup
            | Self::SystemShutdown => Severity::Low,
        }
    }

    /// Get the event name as a string
    pub fn name(&self) -> &'static str {
        match self {
            Self::AuthenticationSuccess => "authentication_success",
            Self::AuthenticationFailure => "authentication_failure",
            Self::TokenRejected => "token_rejected",
            Self::Logout => "logout",
            Self::SessionExpired => "session_expired",
            Self::AccessDenied => "access_denied",
            Self::LoginRateLimited => "login_rate_limited",
            Self::AccountSuspended => "account_suspended",
            Self::LockoutRecordsSwept => "lockout_records_swept",
            Self::PasswordChanged => "password_changed",
            Self::SubjectMappingChanged => "subject_mapping_changed",
            Self::SubjectMappingSynced => "subject_mapping_synced",
            Self::SystemStartup => "system_startup",
            Self::SystemShutdown => "system_shutdown",
        }
    }
}

impl fmt::Display for SecurityEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Event severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Routine operations
    Low,
    /// Important state changes
    Medium,
    /// Security-relevant failures
    High,
    /// Immediate attention required
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Log a security event with structured fields.
///
/// The tracing level follows the event severity: critical → `error!`,
/// high → `warn!`, medium → `info!`, low → `debug!`.
#[macro_export]
macro_rules! security_event {
    ($event:expr, $($field:tt)*) => {{
        let event = $event;
        let category = event.category();
        let event_name = event.name();

        match event.severity() {
            $crate::observability::Severity::Critical => {
                ::tracing::error!(
                    security_event = event_name,
                    category = category,
                    severity = "critical",
                    $($field)*
                );
            }
            $crate::observability::Severity::High => {
                ::tracing::warn!(
                    security_event = event_name,
                    category = category,
                    severity = "high",
                    $($field)*
                );
            }
            $crate::observability::Severity::Medium => {
                ::tracing::info!(
                    security_event = event_name,
                    category = category,
                    severity = "medium",
                    $($field)*
                );
            }
            $crate::observability::Severity::Low => {
                ::tracing::debug!(
                    security_event = event_name,
                    category = category,
                    severity = "low",
                    $($field)*
                );
            }
        }
    }};
}

pub use crate::security_event;
