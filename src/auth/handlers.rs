//! Authentication handlers

use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};

use super::service::{AuthService, AuthenticatedUser};
use crate::error::{AppError, Result};
use crate::users::UserSummary;

// =============================================================================
// Login
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserSummary,
}

/// Authenticate by email or username and issue a token
pub async fn login(
    State(auth): State<AuthService>,
    headers: HeaderMap,
    body: std::result::Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>> {
    let Json(input) = body.map_err(|_| AppError::validation("Invalid login data"))?;
    if input.identifier.trim().is_empty() || input.password.is_empty() {
        return Err(AppError::validation("Invalid login data"));
    }

    let client_ip = client_ip(&headers);
    let outcome = auth
        .authenticate(&input.identifier, &input.password, client_ip.as_deref())
        .await?;

    Ok(Json(LoginResponse {
        token: outcome.token,
        user: outcome.user,
    }))
}

// =============================================================================
// Current user
// =============================================================================

pub async fn me(user: AuthenticatedUser) -> Json<UserSummary> {
    Json(user.user.summary())
}

// =============================================================================
// Change password
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

pub async fn change_password(
    State(auth): State<AuthService>,
    user: AuthenticatedUser,
    body: std::result::Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>> {
    let Json(input) = body.map_err(|_| AppError::validation("Invalid password data"))?;

    auth.change_password(user.id(), &input.current_password, &input.new_password)
        .await?;

    Ok(Json(MessageResponse {
        message: "Password changed successfully".into(),
    }))
}

// =============================================================================
// Logout
// =============================================================================

/// Tokens are stateless; the client discards its copy
pub async fn logout(State(auth): State<AuthService>, user: AuthenticatedUser) -> Json<MessageResponse> {
    auth.logout(&user);
    Json(MessageResponse {
        message: "Logged out successfully".into(),
    })
}

/// Client address from proxy headers, for logging only
fn client_ip(headers: &HeaderMap) -> Option<String> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };

    // first hop of X-Forwarded-For
    header("x-forwarded-for")
        .and_then(|xff| xff.split(',').next().map(|s| s.trim().to_string()))
        .or_else(|| header("x-real-ip"))
}
