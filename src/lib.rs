//! Mesh Healer: distributed trace collection and self-healing
//!
//! Services report spans to the collector; neighbours keep a short-lived
//! view of each other; periodic snapshots record known-good state; the
//! health monitor probes every service and, when one stays down, runs a
//! guided recovery built from its recent interactions.
//!
//! ## Architecture
//!
//! - **Collector**: trace ingest, durable log, neighbour awareness
//! - **Snapshot Manager**: per-service ring buffer of state captures
//! - **Recovery Engine**: failure analysis, rule-based strategy, executor
//! - **Health Monitor**: polling state machine and heal pipeline
//! - **Events**: typed broadcast bus plus a persisted journal

pub mod api;
pub mod app;
pub mod collector;
pub mod config;
pub mod events;
pub mod monitor;
pub mod recovery;
pub mod snapshot;
pub mod storage;
pub mod topology;
pub mod types;

#[cfg(test)]
mod test_support;

// Re-export configuration
pub use config::EngineConfig;

// Re-export wiring
pub use app::{Adapters, BackgroundWorkers, BuildError, Components};

// Re-export commonly used types
pub use types::{
    FailureAnalysis, HealthStatus, RecoveryRecord, RecoveryStrategy, ServiceSnapshot,
    ServiceState, TraceInput, TraceRecord,
};

// Re-export the engine's main components
pub use collector::{TraceCollector, TraceIngest};
pub use monitor::HealthMonitor;
pub use recovery::RecoveryEngine;
pub use snapshot::SnapshotManager;
