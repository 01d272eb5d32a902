//! Portal HTTP server
//!
//! Runs the auth and mapping-sync API over in-memory stores.
//!
//! # Usage
//!
//! ```bash
//! PORTAL_ENV=production JWT_SECRET=... LISTEN_ADDR=0.0.0.0:5000 portal-server
//! ```
//!
//! In development, setting `SEED_PASSWORD` creates one account per reserved
//! test identifier (`student`, `teacher`, `admin`, `parent`, `superadmin`).

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use tokio::signal;
use tower_http::trace::TraceLayer;

use school_portal::auth::{AuthService, PasswordHasher, TokenCodec};
use school_portal::cache::{ExamVisibilityCache, MemoryCache, SubjectAssignmentCache};
use school_portal::observability::{self, ObservabilityConfig, SecurityEvent};
use school_portal::school::MemorySchoolStore;
use school_portal::users::{MemoryUserStore, Role, User};
use school_portal::{build_router, error, AppState, LoginTracker, PortalConfig, SubjectMappingSync};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let obs = ObservabilityConfig::from_env();
    observability::init(&obs).context("failed to initialize logging")?;

    let config = PortalConfig::from_env().context("invalid portal configuration")?;
    error::init(error::ErrorConfig::for_environment(config.environment));

    let hasher = PasswordHasher::new(config.hash_cost);
    let users = MemoryUserStore::new();
    if !config.environment.is_production() {
        seed_test_accounts(&users, &hasher).await?;
    }

    let tracker = LoginTracker::new(config.lockout.clone());
    let sweeper = tracker.spawn_sweeper(config.sweep_interval);

    let auth = AuthService::new(
        Arc::new(users),
        tracker,
        TokenCodec::new(&config.jwt_secret, config.token_lifetime),
        hasher,
    );

    let school = Arc::new(MemorySchoolStore::new());
    let cache = Arc::new(MemoryCache::new());
    let sync = SubjectMappingSync::new(
        Arc::new(ExamVisibilityCache::new(cache.clone())),
        Arc::new(SubjectAssignmentCache::new(cache.clone())),
        cache.clone(),
        school.clone(),
    );

    let state = AppState {
        auth,
        cache,
        classes: school,
        sync,
        environment: config.environment,
        started_at: Instant::now(),
    };

    let mut app = build_router(state);
    if obs.enable_request_tracing {
        app = app.layer(TraceLayer::new_for_http());
    }

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;

    school_portal::security_event!(
        SecurityEvent::SystemStartup,
        environment = config.environment.as_str(),
        listen_addr = %config.listen_addr,
        "Portal server started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.shutdown();
    school_portal::security_event!(SecurityEvent::SystemShutdown, "Portal server stopped");
    Ok(())
}

async fn seed_test_accounts(users: &MemoryUserStore, hasher: &PasswordHasher) -> anyhow::Result<()> {
    let Ok(password) = std::env::var("SEED_PASSWORD") else {
        return Ok(());
    };

    let hash = hasher
        .hash(password)
        .await
        .context("failed to hash seed password")?;

    for (username, role) in [
        ("superadmin", Role::SuperAdmin),
        ("admin", Role::Admin),
        ("teacher", Role::Teacher),
        ("student", Role::Student),
        ("parent", Role::Parent),
    ] {
        let email = format!("{}@portal.local", username);
        users.insert(User::new(username, email, "Test", role.name(), role).with_password_hash(hash.clone()));
    }

    tracing::info!(accounts = 5, "Seeded test accounts");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        park_on_error("Ctrl+C", signal::ctrl_c().await).await;
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => park_on_error("SIGTERM", Err(e)).await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}

/// A signal handler that failed to install never fires, so it must not
/// resolve the shutdown future either.
async fn park_on_error<E: std::fmt::Display>(signal: &'static str, result: Result<(), E>) {
    if let Err(e) = result {
        tracing::error!(signal, "Failed to install signal handler: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_failed_handler_never_resolves() {
        let failed = park_on_error("SIGTERM", Err(std::io::Error::other("unsupported")));
        let outcome = tokio::time::timeout(Duration::from_secs(3600), failed).await;
        assert!(outcome.is_err());
    }

    #[tokio::test]
    async fn test_received_signal_resolves() {
        park_on_error::<std::io::Error>("Ctrl+C", Ok(())).await;
    }
}
