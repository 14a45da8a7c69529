//! Service health, manual heal, inboxes, declared state and config

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use serde::Serialize;
use serde_json::Value;

use super::{storage_failure, ApiState, LimitQuery};
use crate::api::envelope::{ApiErrorResponse, ApiResponse};
use crate::config::defaults;
use crate::storage::StoreError;

#[derive(Debug, Serialize)]
pub struct HealAccepted {
    pub service: String,
    /// False when a heal for the service was already running
    pub started: bool,
}

/// GET /api/services/status
pub async fn services_status(State(state): State<ApiState>) -> Response {
    ApiResponse::ok(state.monitor.statuses().await)
}

/// POST /api/services/:name/heal
pub async fn heal_service(State(state): State<ApiState>, Path(name): Path<String>) -> Response {
    match state.monitor.heal_now(&name) {
        Some(started) => {
            tracing::info!(service = %name, started, "Manual heal requested");
            ApiResponse::accepted(HealAccepted {
                service: name,
                started,
            })
        }
        None => ApiErrorResponse::unknown_service(&name),
    }
}

/// GET /api/services/:name/inbox?limit=
pub async fn service_inbox(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Response {
    if !state.topology.contains(&name) {
        return ApiErrorResponse::unknown_service(&name);
    }
    match state.inbox.inbox(&name, query.or(defaults::INBOX_CAPACITY)) {
        Ok(notifications) => ApiResponse::ok(notifications),
        Err(e) => storage_failure(e),
    }
}

// ============================================================================
// Declared state / config
// ============================================================================

fn read_document(
    state: &ApiState,
    name: &str,
    read: impl FnOnce(&ApiState) -> Result<Option<Value>, StoreError>,
) -> Response {
    if !state.topology.contains(name) {
        return ApiErrorResponse::unknown_service(name);
    }
    match read(state) {
        Ok(doc) => ApiResponse::ok(doc.unwrap_or(Value::Null)),
        Err(e) => storage_failure(e),
    }
}

fn write_document(
    state: &ApiState,
    name: &str,
    payload: Result<Json<Value>, JsonRejection>,
    write: impl FnOnce(&ApiState, &Value) -> Result<(), StoreError>,
) -> Response {
    if !state.topology.contains(name) {
        return ApiErrorResponse::unknown_service(name);
    }
    let Json(doc) = match payload {
        Ok(json) => json,
        Err(rejection) => return ApiErrorResponse::bad_request(rejection.body_text()),
    };
    match write(state, &doc) {
        Ok(()) => ApiResponse::ok(doc),
        Err(e) => storage_failure(e),
    }
}

/// GET /api/services/:name/state
pub async fn get_service_state(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Response {
    read_document(&state, &name, |s| s.states.read_state(&name))
}

/// PUT /api/services/:name/state
pub async fn put_service_state(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    write_document(&state, &name, payload, |s, doc| s.states.write_state(&name, doc))
}

/// GET /api/services/:name/config
pub async fn get_service_config(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Response {
    read_document(&state, &name, |s| s.states.read_config(&name))
}

/// PUT /api/services/:name/config
pub async fn put_service_config(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    write_document(&state, &name, payload, |s, doc| s.states.write_config(&name, doc))
}
