//! User-facing notices for refused logins
//!
//! The 429 and 401 bodies carry a machine-readable `statusType` next to the
//! message so the login page can pick its own banner, plus a longer
//! description worded for the account's role.

use serde::Serialize;

use crate::users::Role;

/// Shown with every credential failure
pub const INVALID_CREDENTIALS_HINT: &str =
    "Make sure CAPS LOCK is off and you're using the correct username and password.";

/// Banner category for a refused login
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStatusType {
    SuspendedStaff,
    SuspendedParent,
    SuspendedStudent,
    RateLimited,
}

impl AuthStatusType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SuspendedStaff => "suspended_staff",
            Self::SuspendedParent => "suspended_parent",
            Self::SuspendedStudent => "suspended_student",
            Self::RateLimited => "rate_limited",
        }
    }
}

/// Description and category attached to a 429 body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthNotice {
    pub description: String,
    pub status_type: AuthStatusType,
}

/// Notice for a suspended identifier, worded for the account's role.
///
/// Unknown identifiers get the student wording.
pub fn suspension_notice(role: Option<Role>) -> AuthNotice {
    match role {
        Some(Role::SuperAdmin | Role::Admin | Role::Teacher) => AuthNotice {
            description: "Access denied. Your account has been suspended by the school \
                          administrator due to security concerns. Please contact the school \
                          administrator to resolve this issue."
                .to_string(),
            status_type: AuthStatusType::SuspendedStaff,
        },
        Some(Role::Parent) => AuthNotice {
            description: "Your parent account has been automatically suspended after multiple \
                          failed login attempts. Contact the school administrator to restore \
                          access, and have your child's information ready for verification."
                .to_string(),
            status_type: AuthStatusType::SuspendedParent,
        },
        Some(Role::Student) | None => AuthNotice {
            description: "Your account has been suspended. Please contact your class teacher \
                          or the school administrator to resolve this issue."
                .to_string(),
            status_type: AuthStatusType::SuspendedStudent,
        },
    }
}

/// Notice for a rate-limited identifier
pub fn rate_limit_notice(remaining_minutes: u64) -> AuthNotice {
    AuthNotice {
        description: format!(
            "Too many failed login attempts. Your account has been temporarily locked for \
             security reasons. Please wait {} minutes before trying again, or use \
             'Forgot Password' to reset.",
            remaining_minutes
        ),
        status_type: AuthStatusType::RateLimited,
    }
}
