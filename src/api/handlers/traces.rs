//! Trace ingest and queries

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;

use super::{storage_failure, ApiState, LimitQuery};
use crate::api::envelope::{ApiErrorResponse, ApiResponse};
use crate::collector::{CollectorError, SubmitOutcome};
use crate::config::defaults;
use crate::types::TraceInput;

/// POST /api/trace
///
/// Validates and ids the span, hands it to the ingest queue and answers
/// 202 with the record as it will be stored.
pub async fn submit_trace(
    State(state): State<ApiState>,
    payload: Result<Json<TraceInput>, JsonRejection>,
) -> Response {
    let Json(input) = match payload {
        Ok(json) => json,
        Err(rejection) => return ApiErrorResponse::bad_request(rejection.body_text()),
    };

    let record = match state.collector.prepare(input) {
        Ok(record) => record,
        Err(e @ CollectorError::MissingField(_)) => {
            return ApiErrorResponse::bad_request(e.to_string())
        }
        Err(e) => return storage_failure(e),
    };

    if state.ingest.submit(record.clone()) == SubmitOutcome::Dropped {
        tracing::warn!(span_id = %record.span_id, "Trace accepted but ingest is stopped");
    }
    ApiResponse::accepted(record)
}

/// GET /api/trace/:trace_id
pub async fn get_trace_chain(
    State(state): State<ApiState>,
    Path(trace_id): Path<String>,
) -> Response {
    match state.collector.trace_chain(&trace_id) {
        Ok(chain) if chain.is_empty() => {
            ApiErrorResponse::not_found(format!("no spans recorded for trace {trace_id}"))
        }
        Ok(chain) => ApiResponse::ok(chain),
        Err(e) => storage_failure(e),
    }
}

/// GET /api/interactions/:service?limit=
pub async fn get_interactions(
    State(state): State<ApiState>,
    Path(service): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Response {
    if !state.topology.contains(&service) {
        return ApiErrorResponse::unknown_service(&service);
    }
    let limit = query.or(defaults::INTERACTIONS_DEFAULT_LIMIT);
    match state.collector.interactions(&service, limit) {
        Ok(records) => ApiResponse::ok(records),
        Err(e) => storage_failure(e),
    }
}
