use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, Response};
use axum::middleware::Next;
use axum::Json;
use control_plane::{
    AuthorityMap, IpListEntry, RefreshReport, RefreshState, ResolvedRoute, SnapshotSummary,
    ROUTE_REFRESH_TOPIC,
};
use serde::Serialize;
use tracing::info;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Serialize)]
pub struct SnapshotResponse {
    pub state: RefreshState,
    #[serde(flatten)]
    pub summary: SnapshotSummary,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub generation: u64,
}

#[derive(Serialize)]
pub struct NotifyResponse {
    pub delivered: usize,
}

#[derive(Serialize)]
pub struct SystemConfigResponse {
    pub path: String,
    pub content: String,
    pub keys: Vec<String>,
}

pub async fn admin_auth(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response<Body>, AppError> {
    if let Some(expected) = state.admin_token.as_deref() {
        let token = extract_bearer_token(req.headers());
        if token.as_deref() != Some(expected.trim()) {
            return Err(AppError::unauthorized("invalid admin token"));
        }
    }
    Ok(next.run(req).await)
}

pub async fn reload(State(state): State<Arc<AppState>>) -> Result<Json<RefreshReport>, AppError> {
    let coordinator = state.coordinator.clone();
    let report = tokio::task::spawn_blocking(move || coordinator.refresh()).await?;
    info!(
        generation = report.generation,
        installed = report.installed,
        "operator refresh finished"
    );
    Ok(Json(report))
}

/// Signals the change channel the same way an external notification does.
pub async fn notify(State(state): State<Arc<AppState>>) -> Result<Json<NotifyResponse>, AppError> {
    let changes = state.changes.clone();
    let delivered =
        tokio::task::spawn_blocking(move || changes.publish(ROUTE_REFRESH_TOPIC)).await?;
    Ok(Json(NotifyResponse { delivered }))
}

/// Liveness plus the generation being served; generation 0 means no
/// snapshot has been resolved yet.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        generation: state.coordinator.snapshot().generation,
    })
}

pub async fn get_snapshot(State(state): State<Arc<AppState>>) -> Json<SnapshotResponse> {
    Json(SnapshotResponse {
        state: state.coordinator.state(),
        summary: state.coordinator.snapshot().summary(),
    })
}

pub async fn list_routes(State(state): State<Arc<AppState>>) -> Json<Vec<ResolvedRoute>> {
    Json(state.coordinator.resolved_routes())
}

pub async fn list_authorities(State(state): State<Arc<AppState>>) -> Json<AuthorityMap> {
    Json(state.coordinator.authority_map())
}

pub async fn list_ip_blacklist(State(state): State<Arc<AppState>>) -> Json<Vec<IpListEntry>> {
    Json(state.coordinator.ip_blacklist())
}

pub async fn list_ip_whitelist(State(state): State<Arc<AppState>>) -> Json<Vec<IpListEntry>> {
    Json(state.coordinator.ip_whitelist())
}

pub async fn get_system_config(State(state): State<Arc<AppState>>) -> Json<SystemConfigResponse> {
    Json(SystemConfigResponse {
        path: state.config_path.display().to_string(),
        content: state.config_raw.clone(),
        keys: state.config.keys(),
    })
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ").or_else(|| value.strip_prefix("bearer "))?;
    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
