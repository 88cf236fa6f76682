/**
 * API REST VIBESTATS - Vue dashboard en lecture sur les entrées configurées
 *
 * ROUTES :
 * - GET /health, GET /system/health
 * - GET /api/entries
 * - GET /api/entries/{id}/snapshot|stats|status
 * - POST /api/entries/{id}/refresh (202, coalescé par le coordinateur)
 * - PUT /api/entries/{id}/options (appliqué au prochain cycle)
 *
 * SÉCURITÉ :
 * - Si VIBESTATS_API_KEY est défini, header x-api-key obligatoire sauf /health
 * - Logs des tentatives d'accès non autorisé
 */

use crate::config::StatsOptions;
use crate::coordinator::CoordinatorStatus;
use crate::entries::{EntryInfo, SharedEntryManager};
use crate::error::{EntryError, StatsError};
use crate::health::{HealthTracker, KernelHealth};
use crate::sensors::{dashboard, DashboardTile};
use crate::snapshot::Snapshot;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::warn;

pub const API_KEY_ENV: &str = "VIBESTATS_API_KEY";

#[derive(Clone)]
pub struct AppState {
    pub entries: SharedEntryManager,
    pub health_tracker: HealthTracker,
}

type ApiError = (StatusCode, Json<Value>);
type ApiResult<T> = Result<Json<T>, ApiError>;

fn api_error(err: EntryError) -> ApiError {
    let code = match &err {
        EntryError::NotFound(_) => StatusCode::NOT_FOUND,
        EntryError::AlreadyConfigured(_) => StatusCode::CONFLICT,
        EntryError::SetupFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
        EntryError::Stats(StatsError::ConfigInvalid(_)) => StatusCode::UNPROCESSABLE_ENTITY,
        EntryError::Stats(StatsError::Shutdown) => StatusCode::SERVICE_UNAVAILABLE,
        EntryError::Stats(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (code, Json(json!({ "error": err.to_string() })))
}

async fn require_api_key(req: Request, next: Next) -> Result<Response, StatusCode> {
    if req.uri().path() == "/health" {
        return Ok(next.run(req).await);
    }

    let expected = std::env::var(API_KEY_ENV).unwrap_or_default();
    if expected.is_empty() {
        return Ok(next.run(req).await);
    }

    let ok = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected);
    if !ok {
        warn!(path = %req.uri().path(), "rejected request without a valid api key");
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/api/entries", get(list_entries))
        .route("/api/entries/{id}/snapshot", get(get_snapshot))
        .route("/api/entries/{id}/stats", get(get_stats))
        .route("/api/entries/{id}/status", get(get_status))
        .route("/api/entries/{id}/refresh", post(request_refresh))
        .route("/api/entries/{id}/options", put(update_options))
        .with_state(app_state)
        .layer(middleware::from_fn(require_api_key))
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<KernelHealth> {
    Json(app.health_tracker.get_health(&app.entries).await)
}

// GET /api/entries
async fn list_entries(State(app): State<AppState>) -> Json<Vec<EntryInfo>> {
    Json(app.entries.list().await)
}

// GET /api/entries/{id}/snapshot
async fn get_snapshot(State(app): State<AppState>, Path(id): Path<String>) -> ApiResult<Snapshot> {
    let entry = app.entries.get(&id).await.map_err(api_error)?;
    match entry.handle.snapshot() {
        Some(snapshot) => Ok(Json(snapshot.as_ref().clone())),
        None => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "no snapshot published yet" })),
        )),
    }
}

// GET /api/entries/{id}/stats (dashboard tiles keyed by entity id)
async fn get_stats(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<BTreeMap<String, DashboardTile>> {
    let entry = app.entries.get(&id).await.map_err(api_error)?;
    let snapshot = entry.handle.snapshot();
    let options = entry.handle.status().options;
    Ok(Json(dashboard(snapshot.as_deref(), &options)))
}

// GET /api/entries/{id}/status
async fn get_status(State(app): State<AppState>, Path(id): Path<String>) -> ApiResult<CoordinatorStatus> {
    let entry = app.entries.get(&id).await.map_err(api_error)?;
    Ok(Json(entry.handle.status()))
}

// POST /api/entries/{id}/refresh
async fn request_refresh(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    app.entries.request_refresh(&id).await.map_err(api_error)?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "ok": true }))))
}

// PUT /api/entries/{id}/options (applied at the next cycle)
async fn update_options(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<Value>,
) -> ApiResult<StatsOptions> {
    let options = app
        .entries
        .update_options_json(&id, &payload)
        .await
        .map_err(api_error)?;
    Ok(Json(options))
}
