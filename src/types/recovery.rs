//! Failure analysis, recovery strategies and the recovery audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::snapshot::ServiceSnapshot;
use super::trace::{NeighborAwareness, TraceRecord};

// ============================================================================
// Analysis
// ============================================================================

/// Statistical summary of a service's recent interactions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InteractionPattern {
    /// operation → occurrences
    pub operation_counts: BTreeMap<String, usize>,
    pub avg_response_time_ms: f64,
    /// Share of sampled traces with status >= 400, 0–100
    pub error_rate_percent: f64,
    /// neighbor → number of sampled traces that invoked it
    pub dependency_weights: BTreeMap<String, usize>,
}

/// Everything the strategy generator needs about a failed service.
#[derive(Debug, Clone, Serialize)]
pub struct FailureAnalysis {
    pub service_name: String,
    pub analyzed_at: DateTime<Utc>,
    /// Number of interactions sampled from the durable log
    pub sample_size: usize,
    /// The newest sampled interactions (at most 10)
    pub recent_traces: Vec<TraceRecord>,
    /// neighbor → what that neighbor last saw of this service
    pub neighbor_states: BTreeMap<String, NeighborAwareness>,
    pub last_good_snapshot: Option<ServiceSnapshot>,
    pub pattern: InteractionPattern,
    /// Successful sampled operations eligible for cache replay, newest first
    pub successful_ops: Vec<ReplayedOperation>,
}

// ============================================================================
// Strategy
// ============================================================================

/// Operation replayed into the cache by a `warm_cache` step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayedOperation {
    pub operation: String,
    pub response: Value,
    pub trace_id: String,
}

/// Recovery step kinds, each with its own payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "data", rename_all = "snake_case")]
pub enum StepKind {
    RestoreState {
        snapshot_version: u64,
        state: Value,
    },
    RestoreConfig {
        snapshot_version: u64,
        configuration: Value,
    },
    ReconnectNeighbors {
        neighbors: Vec<String>,
        states: BTreeMap<String, NeighborAwareness>,
    },
    WarmCache {
        operations: Vec<ReplayedOperation>,
    },
    VerifyHealth,
}

impl StepKind {
    pub fn action(&self) -> ActionKind {
        match self {
            StepKind::RestoreState { .. } => ActionKind::RestoreState,
            StepKind::RestoreConfig { .. } => ActionKind::RestoreConfig,
            StepKind::ReconnectNeighbors { .. } => ActionKind::ReconnectNeighbors,
            StepKind::WarmCache { .. } => ActionKind::WarmCache,
            StepKind::VerifyHealth => ActionKind::VerifyHealth,
        }
    }
}

/// Payload-free step discriminant, used in results and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    RestoreState,
    RestoreConfig,
    ReconnectNeighbors,
    WarmCache,
    VerifyHealth,
}

impl ActionKind {
    /// Fixed duration estimate in seconds.
    pub fn estimated_time_sec(self) -> u32 {
        match self {
            ActionKind::RestoreState => 5,
            ActionKind::RestoreConfig => 2,
            ActionKind::ReconnectNeighbors => 10,
            ActionKind::WarmCache => 15,
            ActionKind::VerifyHealth => 5,
        }
    }

    /// Confidence contributed when the rule applies.
    pub fn confidence(self) -> u8 {
        match self {
            ActionKind::RestoreState => 30,
            ActionKind::RestoreConfig => 20,
            ActionKind::ReconnectNeighbors => 25,
            ActionKind::WarmCache => 15,
            ActionKind::VerifyHealth => 10,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::RestoreState => "restore_state",
            ActionKind::RestoreConfig => "restore_config",
            ActionKind::ReconnectNeighbors => "reconnect_neighbors",
            ActionKind::WarmCache => "warm_cache",
            ActionKind::VerifyHealth => "verify_health",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ordered remediation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryStep {
    pub order: u32,
    #[serde(flatten)]
    pub kind: StepKind,
    pub description: String,
    pub estimated_time_sec: u32,
}

impl RecoveryStep {
    pub fn action(&self) -> ActionKind {
        self.kind.action()
    }
}

/// Ordered, confidence-scored recovery plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryStrategy {
    pub steps: Vec<RecoveryStep>,
    /// Sum of the applied rule weights, 0–100
    pub confidence: u8,
    /// Sum of the step estimates
    pub estimated_time_sec: u32,
}

impl RecoveryStrategy {
    pub fn actions(&self) -> Vec<ActionKind> {
        self.steps.iter().map(RecoveryStep::action).collect()
    }

    pub fn step(&self, action: ActionKind) -> Option<&RecoveryStep> {
        self.steps.iter().find(|s| s.action() == action)
    }
}

// ============================================================================
// Execution
// ============================================================================

/// Outcome of a single executed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub order: u32,
    pub action: ActionKind,
    pub success: bool,
    pub duration_ms: u64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Append-only audit entry written after every recovery run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryRecord {
    pub id: String,
    pub service_name: String,
    pub strategy: RecoveryStrategy,
    pub step_results: Vec<StepResult>,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

/// Result of executing a strategy.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub record_id: String,
    pub success: bool,
    pub step_results: Vec<StepResult>,
}

/// Full analyze → generate → execute result returned to callers.
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryOutcome {
    pub success: bool,
    pub step_results: Vec<StepResult>,
    pub analysis: FailureAnalysis,
    pub strategy: RecoveryStrategy,
    pub record_id: String,
}

/// Read-only analysis plus the strategy it would produce.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub analysis: FailureAnalysis,
    pub strategy: RecoveryStrategy,
}
