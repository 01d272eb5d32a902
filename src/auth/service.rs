//! Rate-limited authenticator

use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use super::password::{validate_new_password, PasswordHasher};
use super::token::{Claims, TokenCodec};
use super::AuthError;
use crate::login::{LoginStatus, LoginTracker};
use crate::observability::SecurityEvent;
use crate::users::{Role, User, UserStore, UserSummary, UserUpdate};

/// A successful login
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub token: String,
    pub user: UserSummary,
}

/// The caller behind a verified token
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: User,
    pub claims: Claims,
}

impl AuthenticatedUser {
    pub fn id(&self) -> Uuid {
        self.user.id
    }

    pub fn role(&self) -> Option<Role> {
        self.user.role()
    }
}

/// Credential checks, token issue and verification
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    tracker: LoginTracker,
    tokens: TokenCodec,
    hasher: PasswordHasher,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        tracker: LoginTracker,
        tokens: TokenCodec,
        hasher: PasswordHasher,
    ) -> Self {
        Self {
            users,
            tracker,
            tokens,
            hasher,
        }
    }

    pub fn tracker(&self) -> &LoginTracker {
        &self.tracker
    }

    pub fn hasher(&self) -> &PasswordHasher {
        &self.hasher
    }

    /// Look up by email first, then username
    async fn find_user(&self, identifier: &str) -> Result<Option<User>, AuthError> {
        match self.users.get_user_by_email(identifier).await? {
            Some(user) => Ok(Some(user)),
            None => Ok(self.users.get_user_by_username(identifier).await?),
        }
    }

    /// Check credentials and issue a token.
    ///
    /// The login gate runs first, so a rate-limited caller is refused even
    /// with the right password. Unknown user, inactive account and wrong
    /// password all fail with [`AuthError::InvalidCredentials`] and all count
    /// as failures.
    pub async fn authenticate(
        &self,
        identifier: &str,
        password: &str,
        client_ip: Option<&str>,
    ) -> Result<LoginOutcome, AuthError> {
        self.authenticate_at(identifier, password, client_ip, Instant::now())
            .await
    }

    /// [`authenticate`](Self::authenticate) with the login gate evaluated at `now`
    pub async fn authenticate_at(
        &self,
        identifier: &str,
        password: &str,
        client_ip: Option<&str>,
        now: Instant,
    ) -> Result<LoginOutcome, AuthError> {
        let identifier = identifier.trim();
        let ip = client_ip.unwrap_or("unknown");

        match self.tracker.guard_at(identifier, now) {
            LoginStatus::Ok => {}
            LoginStatus::RateLimited { remaining_minutes } => {
                return Err(AuthError::RateLimited { remaining_minutes })
            }
            LoginStatus::Suspended => {
                // role only selects the notice wording
                let role = self.find_user(identifier).await?.and_then(|u| u.role());
                return Err(AuthError::Suspended { role });
            }
        }

        let user = self.find_user(identifier).await?;

        let rejection = match &user {
            None => Some("unknown_user"),
            Some(u) if !u.is_active => Some("inactive"),
            Some(u) => {
                let verified = match &u.password_hash {
                    Some(hash) => {
                        self.hasher
                            .verify(password.to_string(), hash.clone())
                            .await?
                    }
                    None => false,
                };
                (!verified).then_some("bad_password")
            }
        };

        let user = match (rejection, user) {
            (None, Some(user)) => user,
            (reason, _) => {
                tracing::debug!(
                    identifier = %identifier,
                    client_ip = %ip,
                    reason = reason.unwrap_or("unknown_user"),
                    "Credential check failed"
                );
                self.tracker.record_failure_at(identifier, now);
                return Err(AuthError::InvalidCredentials);
            }
        };

        self.tracker.record_success(identifier);
        let token = self.tokens.issue(user.id, user.role_id)?;

        crate::security_event!(
            SecurityEvent::AuthenticationSuccess,
            user_id = %user.id,
            role_id = user.role_id,
            client_ip = %ip,
            "User authenticated"
        );

        Ok(LoginOutcome {
            token,
            user: user.summary(),
        })
    }

    /// Resolve a bearer token to the current user.
    ///
    /// Rejects tokens whose role no longer matches the user's role.
    pub async fn verify(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        let result = self.verify_inner(token).await;
        if let Err(e) = &result {
            if e.is_unauthorized() {
                crate::security_event!(
                    SecurityEvent::TokenRejected,
                    reason = %e,
                    "Bearer token rejected"
                );
            }
        }
        result
    }

    async fn verify_inner(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        let claims = self.tokens.decode(token)?;

        let user = self
            .users
            .get_user(claims.sub)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if !user.is_active {
            return Err(AuthError::AccountDeactivated);
        }
        if user.role_id != claims.role_id {
            return Err(AuthError::RoleChanged);
        }

        Ok(AuthenticatedUser { user, claims })
    }

    /// Replace a user's password after checking the current one.
    ///
    /// Clears the must-change-password flag.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        if current_password.is_empty() {
            return Err(AuthError::InvalidInput("Current password is required".to_string()));
        }
        validate_new_password(new_password)?;

        let user = self
            .users
            .get_user(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let matches = match &user.password_hash {
            Some(hash) => {
                self.hasher
                    .verify(current_password.to_string(), hash.clone())
                    .await?
            }
            None => false,
        };
        if !matches {
            return Err(AuthError::IncorrectPassword);
        }

        let hash = self.hasher.hash(new_password.to_string()).await?;
        self.users
            .update_user(
                user_id,
                UserUpdate {
                    password_hash: Some(hash),
                    must_change_password: Some(false),
                    ..Default::default()
                },
            )
            .await?;

        crate::security_event!(
            SecurityEvent::PasswordChanged,
            user_id = %user_id,
            "Password changed"
        );
        Ok(())
    }

    /// Tokens are stateless; logging out only records the event
    pub fn logout(&self, user: &AuthenticatedUser) {
        crate::security_event!(
            SecurityEvent::Logout,
            user_id = %user.id(),
            jti = %user.claims.jti,
            "User logged out"
        );
    }
}
