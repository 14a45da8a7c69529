//! Failure analysis and guided recovery

use axum::extract::{Path, Query, State};
use axum::response::Response;
use serde::{Deserialize, Serialize};

use super::{recovery_failure, ApiState, MAX_PAGE};
use crate::api::envelope::{ApiErrorResponse, ApiResponse};
use crate::types::{FailureAnalysis, RecoveryStrategy, StepResult};

const RECOVERIES_DEFAULT_LIMIT: usize = 50;

/// Body of `POST /api/recover/:service`.
#[derive(Debug, Serialize)]
pub struct RecoverResponse {
    pub success: bool,
    pub record_id: String,
    pub step_results: Vec<StepResult>,
    pub analysis: FailureAnalysis,
    pub strategy: RecoveryStrategy,
}

#[derive(Debug, Default, Deserialize)]
pub struct RecoveriesQuery {
    pub service: Option<String>,
    pub limit: Option<usize>,
}

/// POST /api/analyze-failure/:service
///
/// Read-only: returns the analysis and the strategy that would run.
pub async fn analyze_failure(
    State(state): State<ApiState>,
    Path(service): Path<String>,
) -> Response {
    match state.engine.analyze_with_strategy(&service) {
        Ok(report) => ApiResponse::ok(report),
        Err(e) => recovery_failure(e),
    }
}

/// POST /api/recover/:service
///
/// The run is detached from the request, so a client that disconnects
/// mid-recovery still gets every step executed and the record persisted.
/// A failed step is reported in `step_results`, not as an HTTP error.
pub async fn recover_service(
    State(state): State<ApiState>,
    Path(service): Path<String>,
) -> Response {
    let engine = state.engine.clone();
    let run = tokio::spawn(async move { engine.recover(&service).await });

    match run.await {
        Ok(Ok(outcome)) => ApiResponse::ok(RecoverResponse {
            success: outcome.success,
            record_id: outcome.record_id,
            step_results: outcome.step_results,
            analysis: outcome.analysis,
            strategy: outcome.strategy,
        }),
        Ok(Err(e)) => recovery_failure(e),
        Err(e) => {
            tracing::error!(error = %e, "Recovery task failed");
            ApiErrorResponse::internal(format!("recovery task failed: {e}"))
        }
    }
}

/// GET /api/recoveries?service=&limit=
pub async fn list_recoveries(
    State(state): State<ApiState>,
    Query(query): Query<RecoveriesQuery>,
) -> Response {
    if let Some(service) = query.service.as_deref() {
        if !state.topology.contains(service) {
            return ApiErrorResponse::unknown_service(service);
        }
    }
    let limit = query.limit.unwrap_or(RECOVERIES_DEFAULT_LIMIT).min(MAX_PAGE);
    ApiResponse::ok(state.engine.history(query.service.as_deref(), limit))
}
