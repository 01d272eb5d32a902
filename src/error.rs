//! HTTP error handling
//!
//! Every handler returns [`Result<T>`]; domain errors are converted into
//! [`AppError`] at the edge and rendered as `{"message": ...}` with an
//! optional `"details"` field.
//!
//! Authentication failures always carry one of a few fixed messages so
//! callers cannot tell an unknown user from a wrong password. Internal
//! failures are logged with a context tag and answered with a generic message.
//!
//! ```ignore
//! use school_portal::error::{AppError, ErrorConfig};
//!
//! school_portal::error::init(ErrorConfig::for_environment(config.environment));
//!
//! async fn handler() -> school_portal::error::Result<Json<Class>> {
//!     let class = store.class(id).await.map_err(|e| AppError::internal("classes.get", e))?;
//!     Ok(Json(class))
//! }
//! ```

use std::fmt;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::auth::messages::{self, AuthNotice, AuthStatusType, INVALID_CREDENTIALS_HINT};
use crate::config::Environment;
use crate::users::Role;

// ============================================================================
// Error Configuration
// ============================================================================

/// Error rendering configuration
#[derive(Debug, Clone)]
pub struct ErrorConfig {
    /// Include internal error details in responses (development only)
    pub expose_details: bool,

    /// Message returned for internal errors
    pub internal_error_message: String,
}

impl Default for ErrorConfig {
    fn default() -> Self {
        Self::production()
    }
}

impl ErrorConfig {
    /// Production configuration: no internal details
    pub fn production() -> Self {
        Self {
            expose_details: false,
            internal_error_message: "An internal error occurred".to_string(),
        }
    }

    /// Development configuration: internal details included
    pub fn development() -> Self {
        Self {
            expose_details: true,
            ..Self::production()
        }
    }

    pub fn for_environment(environment: Environment) -> Self {
        match environment {
            Environment::Production => Self::production(),
            Environment::Development => Self::development(),
        }
    }
}

// Global configuration (set once at startup)
static ERROR_CONFIG: std::sync::OnceLock<ErrorConfig> = std::sync::OnceLock::new();

/// Initialize error handling configuration. Later calls are ignored.
pub fn init(config: ErrorConfig) {
    let _ = ERROR_CONFIG.set(config);
}

/// Get the current error configuration
pub fn config() -> &'static ErrorConfig {
    ERROR_CONFIG.get_or_init(ErrorConfig::default)
}

// ============================================================================
// Error Types
// ============================================================================

/// Application error returned by HTTP handlers
#[derive(Debug)]
pub struct AppError {
    /// Error kind determines HTTP status and handling
    pub kind: ErrorKind,
    /// User-facing message
    pub message: String,
    /// Validation details, or internal details (logged, exposed only in development)
    pub details: Option<String>,
    /// Longer explanation for refused logins
    pub description: Option<String>,
    /// Banner category for refused logins
    pub status_type: Option<AuthStatusType>,
    /// Short tip shown under the message
    pub hint: Option<&'static str>,
    /// Where an internal error happened, e.g. "auth.login"
    pub context: Option<&'static str>,
    /// Original error (for logging)
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

/// Error categories with their HTTP status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input (400)
    Validation,
    /// Bad credentials, missing or invalid token (401)
    Authentication,
    /// Authenticated but role not permitted (403)
    Authorization,
    /// Too many login attempts (429)
    RateLimited,
    /// Identifier suspended after repeated violations (429)
    Suspended,
    /// Resource doesn't exist (404)
    NotFound,
    /// Operation conflicts with existing data (400)
    Conflict,
    /// Unexpected failure (500)
    Internal,
}

impl ErrorKind {
    /// Get the HTTP status code for this error kind
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation | Self::Conflict => StatusCode::BAD_REQUEST,
            Self::Authentication => StatusCode::UNAUTHORIZED,
            Self::Authorization => StatusCode::FORBIDDEN,
            Self::RateLimited | Self::Suspended => StatusCode::TOO_MANY_REQUESTS,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether details are always safe to return
    pub fn expose_details(&self) -> bool {
        matches!(self, Self::Validation)
    }
}

impl AppError {
    /// Create a new error
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
            description: None,
            status_type: None,
            hint: None,
            context: None,
            source: None,
        }
    }

    /// Create a validation error (400)
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Create an authentication error (401)
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authentication, message)
    }

    /// Create an authorization error (403)
    pub fn authorization(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authorization, message)
    }

    /// Create a rate-limited error (429) with the wait estimate in the message
    pub fn rate_limited(remaining_minutes: u64) -> Self {
        Self::new(
            ErrorKind::RateLimited,
            format!(
                "Too many login attempts. Please try again in {} minutes.",
                remaining_minutes
            ),
        )
        .with_notice(messages::rate_limit_notice(remaining_minutes))
    }

    /// Create a suspended error (429), worded for the account's role
    pub fn suspended(role: Option<Role>) -> Self {
        Self::new(
            ErrorKind::Suspended,
            "Account temporarily locked due to repeated failed attempts. \
             Please try again later or contact an administrator.",
        )
        .with_notice(messages::suspension_notice(role))
    }

    /// Create the uniform credential failure (401) with its hint
    pub fn invalid_credentials() -> Self {
        let mut err = Self::authentication(crate::auth::INVALID_CREDENTIALS);
        err.hint = Some(INVALID_CREDENTIALS_HINT);
        err
    }

    /// Create a not found error (404)
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Create a conflict error (400)
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    /// Create an internal error (500) tagged with where it happened.
    ///
    /// The source is logged; callers see a generic message.
    pub fn internal(
        context: &'static str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            details: Some(source.to_string()),
            context: Some(context),
            source: Some(Box::new(source)),
            ..Self::new(ErrorKind::Internal, config().internal_error_message.clone())
        }
    }

    /// Create an internal error without a source
    pub fn internal_msg(context: &'static str, details: impl Into<String>) -> Self {
        Self {
            context: Some(context),
            details: Some(details.into()),
            ..Self::new(ErrorKind::Internal, config().internal_error_message.clone())
        }
    }

    /// Add details
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Attach a refused-login notice
    pub fn with_notice(mut self, notice: AuthNotice) -> Self {
        self.description = Some(notice.description);
        self.status_type = Some(notice.status_type);
        self
    }

    /// Log the error (called automatically by IntoResponse)
    fn log(&self) {
        let context = self.context.unwrap_or("unknown");
        let details = self.details.as_deref().unwrap_or("none");

        match self.kind {
            ErrorKind::Internal => {
                tracing::error!(
                    error_kind = %self.kind,
                    context = context,
                    details = %details,
                    "Internal error"
                );
            }
            ErrorKind::Authentication | ErrorKind::Authorization => {
                tracing::warn!(
                    error_kind = %self.kind,
                    message = %self.message,
                    "Auth error"
                );
            }
            _ => {
                tracing::debug!(
                    error_kind = %self.kind,
                    message = %self.message,
                    "Client error"
                );
            }
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "validation_error"),
            Self::Authentication => write!(f, "authentication_error"),
            Self::Authorization => write!(f, "authorization_error"),
            Self::RateLimited => write!(f, "rate_limited"),
            Self::Suspended => write!(f, "suspended"),
            Self::NotFound => write!(f, "not_found"),
            Self::Conflict => write!(f, "conflict"),
            Self::Internal => write!(f, "internal_error"),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

// ============================================================================
// Error Response
// ============================================================================

/// JSON error body
#[derive(Debug, Clone, serde::Serialize)]
pub struct ErrorResponse {
    /// Human-readable message
    pub message: String,
    /// Validation details, or internal details in development
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "statusType", skip_serializing_if = "Option::is_none")]
    pub status_type: Option<AuthStatusType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<&'static str>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.log();

        let show_details = self.kind.expose_details()
            || (self.kind == ErrorKind::Internal && config().expose_details);

        let body = ErrorResponse {
            message: self.message,
            details: if show_details { self.details } else { None },
            description: self.description,
            status_type: self.status_type,
            hint: self.hint,
        };

        (self.kind.status_code(), Json(body)).into_response()
    }
}

// ============================================================================
// Conversions from domain error types
// ============================================================================

impl From<crate::auth::AuthError> for AppError {
    fn from(err: crate::auth::AuthError) -> Self {
        use crate::auth::AuthError;

        match err {
            AuthError::RateLimited { remaining_minutes } => AppError::rate_limited(remaining_minutes),
            AuthError::Suspended { role } => AppError::suspended(role),
            AuthError::InvalidCredentials => AppError::invalid_credentials(),
            AuthError::InvalidInput(msg) => AppError::validation(msg),
            AuthError::Store(e) => AppError::internal("auth.store", e),
            AuthError::Hashing(msg) => AppError::internal_msg("auth.password", msg),
            AuthError::Token(e) => AppError::internal("auth.token", e),
            other => AppError::authentication(other.to_string()),
        }
    }
}

impl From<crate::school::StoreError> for AppError {
    fn from(err: crate::school::StoreError) -> Self {
        use crate::school::StoreError;

        match err {
            StoreError::NotFound(what) => AppError::not_found(format!("{} not found", what)),
            StoreError::Conflict(msg) => AppError::conflict(msg),
            other => AppError::internal("store", other),
        }
    }
}

impl From<crate::sync::SyncError> for AppError {
    fn from(err: crate::sync::SyncError) -> Self {
        AppError::internal("sync.subject_mappings", err)
    }
}

impl From<axum::extract::rejection::JsonRejection> for AppError {
    fn from(err: axum::extract::rejection::JsonRejection) -> Self {
        AppError::validation("Invalid request body").with_details(err.body_text())
    }
}

impl From<axum::extract::rejection::PathRejection> for AppError {
    fn from(err: axum::extract::rejection::PathRejection) -> Self {
        AppError::validation("Invalid path parameter").with_details(err.body_text())
    }
}

// ============================================================================
// Result type alias
// ============================================================================

/// Result type alias for handlers returning AppError
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_error_kind_status_codes() {
        assert_eq!(ErrorKind::Validation.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorKind::Conflict.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorKind::Authentication.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorKind::Authorization.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorKind::RateLimited.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ErrorKind::Suspended.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ErrorKind::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorKind::Internal.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_rate_limited_message_has_wait_estimate() {
        let err = AppError::rate_limited(7);
        assert!(err.message.contains("try again in 7 minutes"));
    }

    #[test]
    fn test_suspended_message_mentions_administrator() {
        assert!(AppError::suspended(None).message.contains("administrator"));
    }

    #[tokio::test]
    async fn test_refused_login_bodies_carry_notices() {
        let response = AppError::from(crate::auth::AuthError::Suspended {
            role: Some(Role::Parent),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let body = body_json(response).await;
        assert_eq!(body["statusType"], "suspended_parent");
        assert!(body["description"].as_str().unwrap().contains("parent account"));

        let response =
            AppError::from(crate::auth::AuthError::RateLimited { remaining_minutes: 4 }).into_response();
        let body = body_json(response).await;
        assert_eq!(body["statusType"], "rate_limited");
        assert!(body["message"].as_str().unwrap().contains("try again in 4 minutes"));

        let response = AppError::from(crate::auth::AuthError::InvalidCredentials).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["message"], crate::auth::INVALID_CREDENTIALS);
        assert_eq!(body["hint"], INVALID_CREDENTIALS_HINT);
        assert!(body.get("statusType").is_none());
    }

    #[test]
    fn test_error_display() {
        let err = AppError::not_found("Class not found");
        assert_eq!(format!("{}", err), "not_found: Class not found");
    }

    #[tokio::test]
    async fn test_validation_details_in_body() {
        let response = AppError::validation("Invalid login data")
            .with_details("identifier is required")
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["message"], "Invalid login data");
        assert_eq!(body["details"], "identifier is required");
    }

    #[tokio::test]
    async fn test_auth_details_never_in_body() {
        let response = AppError::authentication("Invalid username or password")
            .with_details("no such user")
            .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = body_json(response).await;
        assert!(body.get("details").is_none());
    }

    #[tokio::test]
    async fn test_internal_message_is_generic() {
        let io = std::io::Error::other("connection refused on 10.0.0.5:5432");
        let err = AppError::internal("classes.list", io);
        assert_eq!(err.context, Some("classes.list"));

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["message"], config().internal_error_message);
    }
}
