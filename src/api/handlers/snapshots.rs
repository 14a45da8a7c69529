//! Snapshot capture and listing

use axum::extract::{Path, State};
use axum::response::Response;

use super::{snapshot_failure, ApiState};
use crate::api::envelope::ApiResponse;

/// POST /api/snapshot/:service
pub async fn capture_snapshot(
    State(state): State<ApiState>,
    Path(service): Path<String>,
) -> Response {
    match state.snapshots.capture(&service) {
        Ok(snapshot) => ApiResponse::ok(snapshot),
        Err(e) => snapshot_failure(e),
    }
}

/// GET /api/snapshots/:service (newest first)
pub async fn list_snapshots(
    State(state): State<ApiState>,
    Path(service): Path<String>,
) -> Response {
    match state.snapshots.list(&service) {
        Ok(snapshots) => ApiResponse::ok(snapshots),
        Err(e) => snapshot_failure(e),
    }
}
