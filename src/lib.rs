//! # School Portal
//!
//! Authentication, session and report-card sync core for a school
//! management portal, served over Axum.
//!
//! ## Features
//!
//! - **Rate-limited login**: per-identifier attempt window with escalation
//!   to suspension after repeated violations
//! - **Short-lived tokens**: HS256 JWTs re-checked against the user's current
//!   role and active flag on every request
//! - **Password hashing**: Argon2id, cost tuned per environment
//! - **Mapping sync**: one call invalidates class-scoped caches and brings
//!   enrolments and report cards in line after a class's subjects change
//! - **Client session guard**: idle timeout and reload sign-out rules
//! - **Theory scoring**: key-point and sample-overlap scoring of free-text answers
//! - **Structured logging**: security events with category and severity
//!
//! ## Quick Start
//!
//! ```ignore
//! use school_portal::observability::{init, ObservabilityConfig};
//! use school_portal::{build_router, AppState, PortalConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     init(&ObservabilityConfig::from_env())?;
//!     let config = PortalConfig::from_env()?;
//!
//!     let state: AppState = /* stores, tracker, token codec, coordinator */;
//!     let app = build_router(state);
//!
//!     let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod cache;
pub mod comments;
mod config;
pub mod error;
pub mod login;
pub mod observability;
mod parse;
pub mod routes;
pub mod school;
pub mod scoring;
pub mod session;
pub mod sync;
pub mod users;

// Re-exports
pub use config::{ConfigError, Environment, PortalConfig};
pub use error::{AppError, ErrorKind};
pub use login::{LockoutPolicy, LoginStatus, LoginTracker, SweeperHandle};
pub use parse::{parse_bool, parse_duration, parse_list};
pub use routes::{build_router, AppState};
pub use sync::{SubjectMappingSync, SyncError, SyncOptions, SyncResult};
