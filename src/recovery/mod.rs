//! Recovery Engine
//!
//! analyze → generate → execute. The analyzer and generator are read-only;
//! only the executor mutates service state.

pub mod analyzer;
pub mod executor;
pub mod notifier;
pub mod strategy;

pub use analyzer::{extract_interaction_pattern, FailureAnalyzer};
pub use executor::RecoveryExecutor;
pub use notifier::{NeighborNotifier, Notification, NotifyError, StoreInbox};

use crate::config::defaults;
use crate::snapshot::SnapshotError;
use crate::storage::{StorageError, StoreError};
use crate::types::{AnalysisReport, RecoveryOutcome, RecoveryRecord};

/// Neighbors carried by a `reconnect_neighbors` step
pub const TOP_NEIGHBORS: usize = defaults::TOP_NEIGHBORS;

#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    #[error("unknown service: {0}")]
    UnknownService(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<SnapshotError> for RecoveryError {
    fn from(err: SnapshotError) -> Self {
        match err {
            SnapshotError::UnknownService(s) => RecoveryError::UnknownService(s),
            SnapshotError::Store(e) => RecoveryError::Store(e),
        }
    }
}

pub struct RecoveryEngine {
    analyzer: FailureAnalyzer,
    executor: RecoveryExecutor,
}

impl RecoveryEngine {
    pub fn new(analyzer: FailureAnalyzer, executor: RecoveryExecutor) -> Self {
        Self { analyzer, executor }
    }

    /// Analysis plus the strategy it would produce. No side effects.
    pub fn analyze_with_strategy(&self, service: &str) -> Result<AnalysisReport, RecoveryError> {
        let analysis = self.analyzer.analyze(service)?;
        let strategy = strategy::generate(&analysis);
        Ok(AnalysisReport { analysis, strategy })
    }

    /// Full run. Step failures show up in the outcome, never as `Err`.
    pub async fn recover(&self, service: &str) -> Result<RecoveryOutcome, RecoveryError> {
        let AnalysisReport { analysis, strategy } = self.analyze_with_strategy(service)?;
        let report = self.executor.execute(service, &strategy).await?;
        Ok(RecoveryOutcome {
            success: report.success,
            step_results: report.step_results,
            analysis,
            strategy,
            record_id: report.record_id,
        })
    }

    pub fn history(&self, service: Option<&str>, limit: usize) -> Vec<RecoveryRecord> {
        self.executor.history(service, limit)
    }

    pub fn executor(&self) -> &RecoveryExecutor {
        &self.executor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{keys, KeyValueStore};
    use crate::test_support::{failing_config_store, Harness};
    use crate::types::{ActionKind, TraceInput};
    use serde_json::json;

    fn emit(h: &Harness, op: &str, status: u16, neighbors: &[&str]) {
        let mut input = TraceInput::new("payments", op);
        input.status_code = Some(status);
        input.response = Some(json!({"op": op}));
        input.neighbors_invoked = neighbors.iter().map(|n| n.to_string()).collect();
        h.collector.record_trace(input).unwrap();
    }

    #[tokio::test]
    async fn test_unknown_service_is_an_error() {
        let h = Harness::new();
        let engine = h.engine();
        assert!(matches!(
            engine.analyze_with_strategy("ghost"),
            Err(RecoveryError::UnknownService(_))
        ));
        assert!(matches!(
            engine.recover("ghost").await,
            Err(RecoveryError::UnknownService(_))
        ));
    }

    #[tokio::test]
    async fn test_analysis_reads_neighbor_view_of_failed_service() {
        let h = Harness::new();
        emit(&h, "charge", 200, &["ledger"]);
        let report = h.engine().analyze_with_strategy("payments").unwrap();
        // ledger and wallet both neighbor payments, so both saw the span
        assert_eq!(report.analysis.neighbor_states.len(), 2);
        assert_eq!(report.analysis.sample_size, 1);
        assert_eq!(report.analysis.pattern.dependency_weights["ledger"], 1);
    }

    #[tokio::test]
    async fn test_scenario_without_snapshot() {
        let h = Harness::new();
        emit(&h, "charge", 200, &["ledger", "wallet"]);
        emit(&h, "charge", 503, &["ledger"]);

        let report = h.engine().analyze_with_strategy("payments").unwrap();
        assert_eq!(
            report.strategy.actions(),
            vec![
                ActionKind::ReconnectNeighbors,
                ActionKind::WarmCache,
                ActionKind::VerifyHealth
            ]
        );
        assert!(report.strategy.confidence <= 50);
        assert_eq!(report.strategy.steps[0].order, 1);
    }

    #[tokio::test]
    async fn test_scenario_with_snapshot_restores_state_first() {
        let h = Harness::new();
        h.states.write_state("payments", &json!({"balance": 100})).unwrap();
        h.snapshots(50).capture("payments").unwrap();

        let report = h.engine().analyze_with_strategy("payments").unwrap();
        let first = &report.strategy.steps[0];
        assert_eq!(first.order, 1);
        assert_eq!(first.action(), ActionKind::RestoreState);
        let v = serde_json::to_value(first).unwrap();
        assert_eq!(v["data"]["state"]["balance"], 100);
    }

    #[tokio::test]
    async fn test_scenario_failing_config_step_continues() {
        let h = Harness::new();
        h.states.write_state("payments", &json!({"balance": 100})).unwrap();
        h.states.write_config("payments", &json!({"fee": 2})).unwrap();
        emit(&h, "charge", 200, &["ledger"]);
        h.snapshots(50).capture("payments").unwrap();

        let engine = h.engine_with_states(failing_config_store(h.kv.clone()));
        let outcome = engine.recover("payments").await.unwrap();

        let results: Vec<(u32, ActionKind, bool)> = outcome
            .step_results
            .iter()
            .map(|r| (r.order, r.action, r.success))
            .collect();
        assert_eq!(
            results,
            vec![
                (1, ActionKind::RestoreState, true),
                (2, ActionKind::RestoreConfig, false),
                (3, ActionKind::ReconnectNeighbors, true),
                (4, ActionKind::WarmCache, true),
                (5, ActionKind::VerifyHealth, true),
            ]
        );
        assert!(!outcome.success);
        assert!(outcome.step_results[1].error.is_some());

        let records = engine.history(Some("payments"), 10);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, outcome.record_id);
        assert!(!records[0].success);
    }

    #[tokio::test]
    async fn test_successful_recovery_side_effects() {
        let h = Harness::new();
        emit(&h, "charge", 200, &["ledger"]);

        let outcome = h.engine().recover("payments").await.unwrap();
        assert!(outcome.success);
        assert_eq!(
            h.kv.get(&keys::cache("payments", "charge")).unwrap(),
            Some(json!({"op": "charge"}))
        );
        let inbox = h.inbox.inbox("ledger", 10).unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].service, "payments");
    }

    #[tokio::test]
    async fn test_unhealthy_service_fails_verification() {
        let h = Harness::new();
        h.probe.set("payments", false);
        let outcome = h.engine().recover("payments").await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.step_results.len(), 1);
        assert_eq!(outcome.step_results[0].action, ActionKind::VerifyHealth);
    }

    #[tokio::test]
    async fn test_verify_health_is_idempotent() {
        let h = Harness::new();
        let engine = h.engine();
        let first = engine.executor().verify_health("payments").await;
        let second = engine.executor().verify_health("payments").await;
        assert!(first.is_ok());
        assert!(second.is_ok());
        assert!(h.kv.get(&keys::service_state("payments")).unwrap().is_none());
        assert_eq!(engine.history(None, 10).len(), 0);
    }
}
