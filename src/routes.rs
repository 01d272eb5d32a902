//! HTTP surface
//!
//! ```text
//! POST /api/auth/login                     public
//! GET  /api/health                         public
//! GET  /api/auth/me                        any signed-in user
//! POST /api/auth/change-password           any signed-in user
//! POST /api/auth/logout                    any signed-in user
//! GET  /api/health/cache-stats             admin, super admin
//! PUT  /api/admin/classes/{id}/subjects    admin, super admin
//! ```

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        FromRef, Path, State,
    },
    middleware,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::auth::{auth_middleware, handlers, require_administrator, AuthService, AuthenticatedUser};
use crate::cache::{CacheStats, MemoryCache};
use crate::config::Environment;
use crate::error::{AppError, Result};
use crate::observability::SecurityEvent;
use crate::school::{ClassId, ClassStore, SubjectId};
use crate::sync::{SubjectMappingSync, SyncOptions, SyncResult};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthService,
    pub cache: Arc<MemoryCache>,
    pub classes: Arc<dyn ClassStore>,
    pub sync: SubjectMappingSync,
    pub environment: Environment,
    pub started_at: Instant,
}

impl FromRef<AppState> for AuthService {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

/// Application routes. Request tracing is layered on by the caller.
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/auth/me", get(handlers::me))
        .route("/api/auth/change-password", post(handlers::change_password))
        .route("/api/auth/logout", post(handlers::logout))
        .route("/api/health/cache-stats", get(cache_stats))
        .route("/api/admin/classes/{id}/subjects", put(update_class_subjects))
        .route_layer(middleware::from_fn_with_state(
            state.auth.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/api/auth/login", post(handlers::login))
        .route("/api/health", get(health))
        .merge(protected)
        .with_state(state)
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub uptime_seconds: u64,
    pub environment: String,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    tracing::debug!(endpoint = "/api/health", "Health check");

    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        environment: state.environment.as_str().to_string(),
    })
}

async fn cache_stats(State(state): State<AppState>, user: AuthenticatedUser) -> Result<Json<CacheStats>> {
    require_administrator(&user, "cache-stats")?;
    Ok(Json(state.cache.stats()))
}

// ============================================================================
// Class subject mapping
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateClassSubjects {
    pub subject_ids: Vec<SubjectId>,
    #[serde(default)]
    pub cleanup_report_cards: bool,
}

/// Replace a class's subjects, then bring dependent state in line
async fn update_class_subjects(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    path: std::result::Result<Path<ClassId>, PathRejection>,
    body: std::result::Result<Json<UpdateClassSubjects>, JsonRejection>,
) -> Result<Json<SyncResult>> {
    require_administrator(&user, "class-subjects")?;
    let Path(class_id) = path?;
    let Json(input) = body?;

    let class = state.classes.set_class_subjects(class_id, &input.subject_ids).await?;

    crate::security_event!(
        SecurityEvent::SubjectMappingChanged,
        user_id = %user.id(),
        class_id = class.id,
        subjects = ?class.subject_ids,
        "Class subjects updated"
    );

    let options = SyncOptions {
        cleanup_report_cards: input.cleanup_report_cards,
        ..Default::default()
    };
    let result = state
        .sync
        .invalidate_subject_mappings_and_sync(&[class_id], options)
        .await
        .map_err(AppError::from)?;

    Ok(Json(result))
}
