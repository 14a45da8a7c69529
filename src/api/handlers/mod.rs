//! API route handlers
//!
//! - traces: ingest, trace chains, interaction history
//! - snapshots: on-demand capture and listing
//! - recovery: failure analysis, guided recovery, audit log
//! - services: health, manual heal, inboxes, state and config
//! - system: critical issues, events, metrics, liveness

mod recovery;
mod services;
mod snapshots;
mod system;
mod traces;

pub use recovery::*;
pub use services::*;
pub use snapshots::*;
pub use system::*;
pub use traces::*;

use axum::response::Response;
use serde::Deserialize;
use std::sync::Arc;

use super::envelope::ApiErrorResponse;
use crate::app::Components;
use crate::recovery::RecoveryError;
use crate::snapshot::SnapshotError;

// ============================================================================
// API State
// ============================================================================

/// Shared state for API handlers
pub type ApiState = Arc<Components>;

/// Upper bound on any `limit` query parameter
const MAX_PAGE: usize = 1_000;

/// `?limit=` with a per-endpoint default.
#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

impl LimitQuery {
    fn or(&self, default: usize) -> usize {
        self.limit.unwrap_or(default).min(MAX_PAGE)
    }
}

// ============================================================================
// Error mapping
// ============================================================================

fn recovery_failure(err: RecoveryError) -> Response {
    match err {
        RecoveryError::UnknownService(service) => ApiErrorResponse::unknown_service(&service),
        other => {
            tracing::error!(error = %other, "Recovery request failed");
            ApiErrorResponse::internal(other.to_string())
        }
    }
}

fn snapshot_failure(err: SnapshotError) -> Response {
    match err {
        SnapshotError::UnknownService(service) => ApiErrorResponse::unknown_service(&service),
        other => {
            tracing::error!(error = %other, "Snapshot request failed");
            ApiErrorResponse::internal(other.to_string())
        }
    }
}

fn storage_failure(err: impl std::fmt::Display) -> Response {
    tracing::error!(error = %err, "Storage request failed");
    ApiErrorResponse::internal(err.to_string())
}
