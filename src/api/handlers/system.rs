//! Engine-wide views: critical issues, events, metrics, liveness

use axum::extract::{Query, State};
use axum::response::Response;
use serde::Serialize;
use std::collections::BTreeMap;

use super::{storage_failure, ApiState, LimitQuery};
use crate::api::envelope::ApiResponse;
use crate::collector::IngestStats;
use crate::types::ServiceState;

const CRITICAL_ISSUES_LIMIT: usize = 100;
const EVENTS_DEFAULT_LIMIT: usize = 100;

/// Per-service counters for `/api/system/metrics`.
#[derive(Debug, Serialize)]
pub struct ServiceMetrics {
    pub status: ServiceState,
    pub failures: u32,
    pub recoveries: u32,
    pub critical: bool,
    pub healing: bool,
}

#[derive(Debug, Serialize)]
pub struct SystemMetrics {
    pub uptime_secs: u64,
    pub services: BTreeMap<String, ServiceMetrics>,
    pub ingest: IngestStats,
    pub durable_traces: usize,
    pub event_subscribers: usize,
}

#[derive(Debug, Serialize)]
pub struct EngineHealth {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub services: usize,
}

/// GET /api/issues/critical (newest first)
pub async fn critical_issues(State(state): State<ApiState>) -> Response {
    match state.monitor.critical_issues(CRITICAL_ISSUES_LIMIT) {
        Ok(issues) => ApiResponse::ok(issues),
        Err(e) => storage_failure(e),
    }
}

/// GET /api/events?limit=
pub async fn recent_events(
    State(state): State<ApiState>,
    Query(query): Query<LimitQuery>,
) -> Response {
    match state.journal.recent(query.or(EVENTS_DEFAULT_LIMIT)) {
        Ok(events) => ApiResponse::ok(events),
        Err(e) => storage_failure(e),
    }
}

/// GET /api/system/metrics
pub async fn system_metrics(State(state): State<ApiState>) -> Response {
    let services = state
        .monitor
        .statuses()
        .await
        .into_iter()
        .map(|(name, status)| {
            let metrics = ServiceMetrics {
                status: status.status,
                failures: status.consecutive_failures,
                recoveries: status.recoveries,
                critical: state.topology.is_critical(&name),
                healing: state.monitor.is_healing(&name),
            };
            (name, metrics)
        })
        .collect();

    ApiResponse::ok(SystemMetrics {
        uptime_secs: state.started_at.elapsed().as_secs(),
        services,
        ingest: state.ingest.stats(),
        durable_traces: state.collector.trace_store().durable_count(),
        event_subscribers: state.events.subscriber_count(),
    })
}

/// GET /health
pub async fn engine_health(State(state): State<ApiState>) -> Response {
    ApiResponse::ok(EngineHealth {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
        services: state.topology.len(),
    })
}
