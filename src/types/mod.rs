//! Core data model shared by the collector, snapshot manager, monitor and
//! recovery engine.

mod health;
mod recovery;
mod snapshot;
mod trace;

pub use health::{
    CriticalIssue, HealMethod, HealingRecord, HealthStatus, RecoveryNotice, ServiceState,
};
pub use recovery::{
    ActionKind, AnalysisReport, ExecutionReport, FailureAnalysis, InteractionPattern,
    RecoveryOutcome, RecoveryRecord, RecoveryStep, RecoveryStrategy, ReplayedOperation,
    StepKind, StepResult,
};
pub use snapshot::ServiceSnapshot;
pub use trace::{NeighborAwareness, TraceInput, TraceRecord};
