//! Authentication errors

use crate::school::StoreError;
use crate::users::Role;

/// Message shared by every credential failure
pub const INVALID_CREDENTIALS: &str =
    "Invalid username or password. Please check your credentials and try again.";

/// Authentication and token verification failures
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Unknown user, inactive account or wrong password
    #[error("{}", INVALID_CREDENTIALS)]
    InvalidCredentials,

    #[error("Too many login attempts. Please try again in {remaining_minutes} minutes.")]
    RateLimited { remaining_minutes: u64 },

    /// `role` is that of the account behind the identifier, if any
    #[error("Account temporarily locked due to repeated failed attempts")]
    Suspended { role: Option<Role> },

    #[error("Authentication required")]
    MissingToken,

    /// Bad signature, expired, or malformed claims
    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("User no longer exists")]
    UserNotFound,

    #[error("Account has been deactivated. Please contact administrator.")]
    AccountDeactivated,

    #[error("User role has changed, please log in again")]
    RoleChanged,

    /// Change-password with a wrong current password
    #[error("Current password is incorrect")]
    IncorrectPassword,

    #[error("{0}")]
    InvalidInput(String),

    #[error("password hashing failed: {0}")]
    Hashing(String),

    #[error("token encoding failed: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AuthError {
    /// Failures that end the request with 401
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredentials
                | Self::MissingToken
                | Self::InvalidToken
                | Self::UserNotFound
                | Self::AccountDeactivated
                | Self::RoleChanged
                | Self::IncorrectPassword
        )
    }
}
