//! Authentication
//!
//! Login with brute-force protection, short-lived HS256 access tokens, and
//! verification that re-checks the user on every request:
//!
//! - the user must still exist and be active
//! - the role embedded in the token must match the user's current role
//!
//! ```ignore
//! use school_portal::auth::{AuthService, PasswordHasher, TokenCodec};
//!
//! let auth = AuthService::new(users, tracker, TokenCodec::new(&secret, lifetime), hasher);
//! let login = auth.authenticate("parent55", "password", Some("10.0.0.7")).await?;
//! let caller = auth.verify(&login.token).await?;
//! ```

mod error;
pub mod handlers;
pub mod messages;
pub mod middleware;
pub mod password;
mod service;
pub mod token;

pub use error::{AuthError, INVALID_CREDENTIALS};
pub use messages::{AuthNotice, AuthStatusType, INVALID_CREDENTIALS_HINT};
pub use middleware::{auth_middleware, require_administrator, require_role};
pub use password::{HashCost, PasswordHasher};
pub use service::{AuthService, AuthenticatedUser, LoginOutcome};
pub use token::{Claims, TokenCodec};
