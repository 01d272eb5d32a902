//! Bearer token middleware
//!
//! Validates the token on protected routes and makes the
//! [`AuthenticatedUser`] available to handlers as an extractor.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use super::service::{AuthService, AuthenticatedUser};
use super::token::bearer_token;
use super::AuthError;
use crate::error::AppError;
use crate::observability::SecurityEvent;
use crate::users::Role;

/// Middleware that requires a valid bearer token
pub async fn auth_middleware(
    State(auth): State<AuthService>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(bearer_token)
        .ok_or(AuthError::MissingToken)?;

    let user = auth.verify(token).await?;
    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

impl<S> axum::extract::FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| AuthError::MissingToken.into())
    }
}

/// Fail with 403 unless the user holds one of `allowed`
pub fn require_role(user: &AuthenticatedUser, allowed: &[Role], resource: &str) -> Result<(), AppError> {
    match user.role() {
        Some(role) if allowed.contains(&role) => Ok(()),
        role => {
            crate::security_event!(
                SecurityEvent::AccessDenied,
                user_id = %user.id(),
                role = role.map(|r| r.name()).unwrap_or("unknown"),
                resource = resource,
                "Role not permitted"
            );
            Err(AppError::authorization("Insufficient permissions"))
        }
    }
}

/// Admin or super-admin only
pub fn require_administrator(user: &AuthenticatedUser, resource: &str) -> Result<(), AppError> {
    require_role(user, &[Role::SuperAdmin, Role::Admin], resource)
}
