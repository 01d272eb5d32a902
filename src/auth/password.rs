//! Password hashing with Argon2id
//!
//! Hashing and verification run on the blocking pool so a burst of logins
//! cannot starve the async runtime.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};

use super::AuthError;
use crate::config::Environment;

/// Shortest accepted new password
pub const MIN_PASSWORD_LEN: usize = 6;
/// Longest accepted new password
pub const MAX_PASSWORD_LEN: usize = 100;

/// Argon2 cost preset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashCost {
    /// OWASP minimum: 19 MiB, 2 iterations
    Production,
    /// 4 MiB, 1 iteration
    Development,
}

impl HashCost {
    pub fn for_environment(environment: Environment) -> Self {
        match environment {
            Environment::Production => Self::Production,
            Environment::Development => Self::Development,
        }
    }

    /// (memory KiB, iterations, parallelism)
    fn costs(&self) -> (u32, u32, u32) {
        match self {
            Self::Production => (19_456, 2, 1),
            Self::Development => (4_096, 1, 1),
        }
    }
}

/// Argon2id password hasher
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    cost: HashCost,
}

impl PasswordHasher {
    /// Output hash length in bytes
    const OUTPUT_LEN: usize = 32;

    pub fn new(cost: HashCost) -> Self {
        Self { cost }
    }

    pub fn cost(&self) -> HashCost {
        self.cost
    }

    fn params(&self) -> Result<Params, AuthError> {
        let (m, t, p) = self.cost.costs();
        Params::new(m, t, p, Some(Self::OUTPUT_LEN)).map_err(|e| AuthError::Hashing(e.to_string()))
    }

    /// Hash a password into a PHC string
    pub async fn hash(&self, password: String) -> Result<String, AuthError> {
        let params = self.params()?;
        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
                .hash_password(password.as_bytes(), &salt)
                .map(|h| h.to_string())
        })
        .await
        .map_err(|e| AuthError::Hashing(format!("hash task failed: {}", e)))?
        .map_err(|e| AuthError::Hashing(e.to_string()))
    }

    /// Check a password against a stored PHC string.
    ///
    /// A hash that cannot be parsed never matches.
    pub async fn verify(&self, password: String, hash: String) -> Result<bool, AuthError> {
        tokio::task::spawn_blocking(move || match PasswordHash::new(&hash) {
            // parameters come from the hash itself
            Ok(parsed) => Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(e) => {
                tracing::error!(error = %e, "Stored password hash is malformed");
                false
            }
        })
        .await
        .map_err(|e| AuthError::Hashing(format!("verify task failed: {}", e)))
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(HashCost::Production)
    }
}

/// Check the length bounds for a new password
pub fn validate_new_password(password: &str) -> Result<(), AuthError> {
    let len = password.chars().count();
    if !(MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&len) {
        return Err(AuthError::InvalidInput(format!(
            "New password must be between {} and {} characters",
            MIN_PASSWORD_LEN, MAX_PASSWORD_LEN
        )));
    }
    Ok(())
}
