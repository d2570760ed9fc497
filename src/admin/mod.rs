//! Admin HTTP façade (§6).
//!
//! Out of scope per the core's own design ("the REST/HTTP admin surface
//! ... specified only at interface level"), but a thin binding still
//! belongs in this repo so the daemon is runnable end-to-end — narrow
//! handlers over [`Core`], modeled on the teacher's `router/mod.rs`
//! state-plus-layers shape, reduced to the handful of routes the core
//! actually needs honored.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::core::Core;
use crate::error::Result;
use crate::health::Probe;

#[derive(Clone)]
pub struct AppState {
    pub core: Core,
}

pub fn build_router(core: Core) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .route("/containers", get(list_containers))
        .route("/containers/select", post(select_containers))
        .route("/containers/:id/restart", post(restart_container))
        .route("/containers/:id/unquarantine", post(unquarantine_container))
        .route("/events", get(get_events).delete(clear_events))
        .route("/maintenance", post(enable_maintenance).delete(disable_maintenance))
        .route("/probes/:stable_id", post(set_probe).delete(remove_probe))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(AppState { core }))
}

async fn get_status(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>> {
    let status = state.core.status().await?;
    Ok(Json(json!(status)))
}

async fn list_containers(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>> {
    let containers = state.core.list_containers().await?;
    Ok(Json(json!(containers)))
}

#[derive(Debug, Deserialize)]
struct SelectRequest {
    ids: Vec<String>,
    enabled: bool,
}

async fn select_containers(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SelectRequest>,
) -> Result<Json<serde_json::Value>> {
    for id in &body.ids {
        state.core.set_selection(id, body.enabled);
    }
    Ok(Json(json!({ "ok": true })))
}

async fn restart_container(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    state.core.restart_now(&id).await?;
    Ok(Json(json!({ "ok": true })))
}

async fn unquarantine_container(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    state.core.unquarantine(&id);
    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
struct EventsQuery {
    limit: Option<usize>,
}

async fn get_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<serde_json::Value>> {
    let events = state.core.get_events(query.limit.unwrap_or(100));
    Ok(Json(json!(events)))
}

async fn clear_events(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>> {
    state.core.clear_events();
    Ok(Json(json!({ "ok": true })))
}

async fn enable_maintenance(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>> {
    state.core.enable_maintenance();
    Ok(Json(json!({ "ok": true })))
}

async fn disable_maintenance(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>> {
    state.core.disable_maintenance();
    Ok(Json(json!({ "ok": true })))
}

async fn set_probe(
    State(state): State<Arc<AppState>>,
    Path(stable_id): Path<String>,
    Json(probe): Json<Probe>,
) -> Result<Json<serde_json::Value>> {
    state.core.set_probe(&stable_id, probe);
    Ok(Json(json!({ "ok": true })))
}

async fn remove_probe(
    State(state): State<Arc<AppState>>,
    Path(stable_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    state.core.remove_probe(&stable_id);
    Ok(Json(json!({ "ok": true })))
}
