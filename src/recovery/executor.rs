//! Recovery Executor
//!
//! Runs strategy steps strictly in `order`, one at a time. Each step is
//! timed and isolated: a failing step is recorded and the next one still
//! runs. The run succeeds only if every step did. A `RecoveryRecord` is
//! appended to the audit log whatever the outcome.

use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::notifier::{NeighborNotifier, Notification};
use super::RecoveryError;
use crate::events::{EngineEvent, EventBus};
use crate::monitor::{probe_with_timeout, LivenessProbe};
use crate::storage::{keys, KeyValueStore, RecoveryLog, ServiceStateStore};
use crate::topology::TopologyRegistry;
use crate::types::{
    ExecutionReport, RecoveryRecord, RecoveryStep, RecoveryStrategy, ReplayedOperation, StepKind,
    StepResult,
};

type StepOutcome = Result<String, String>;

pub struct RecoveryExecutor {
    kv: Arc<dyn KeyValueStore>,
    topology: Arc<TopologyRegistry>,
    states: Arc<dyn ServiceStateStore>,
    notifier: Arc<dyn NeighborNotifier>,
    probe: Arc<dyn LivenessProbe>,
    log: RecoveryLog,
    events: EventBus,
    cache_ttl: Duration,
    probe_timeout: Duration,
}

impl RecoveryExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        kv: Arc<dyn KeyValueStore>,
        topology: Arc<TopologyRegistry>,
        states: Arc<dyn ServiceStateStore>,
        notifier: Arc<dyn NeighborNotifier>,
        probe: Arc<dyn LivenessProbe>,
        log: RecoveryLog,
        events: EventBus,
        cache_ttl: Duration,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            kv,
            topology,
            states,
            notifier,
            probe,
            log,
            events,
            cache_ttl,
            probe_timeout,
        }
    }

    pub async fn execute(
        &self,
        service: &str,
        strategy: &RecoveryStrategy,
    ) -> Result<ExecutionReport, RecoveryError> {
        if !self.topology.contains(service) {
            return Err(RecoveryError::UnknownService(service.to_string()));
        }

        info!(
            service = %service,
            steps = strategy.steps.len(),
            confidence = strategy.confidence,
            estimated_time_sec = strategy.estimated_time_sec,
            "Executing recovery"
        );

        let mut ordered: Vec<&RecoveryStep> = strategy.steps.iter().collect();
        ordered.sort_by_key(|s| s.order);

        let mut step_results = Vec::with_capacity(ordered.len());
        for step in ordered {
            let started = Instant::now();
            let outcome = self.run_step(service, step).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            let result = match outcome {
                Ok(message) => {
                    info!(
                        service = %service,
                        step = step.order,
                        action = %step.action(),
                        duration_ms,
                        "Step completed"
                    );
                    StepResult {
                        order: step.order,
                        action: step.action(),
                        success: true,
                        duration_ms,
                        message,
                        error: None,
                    }
                }
                Err(e) => {
                    warn!(
                        service = %service,
                        step = step.order,
                        action = %step.action(),
                        error = %e,
                        "Step failed"
                    );
                    StepResult {
                        order: step.order,
                        action: step.action(),
                        success: false,
                        duration_ms,
                        message: format!("{} failed", step.action()),
                        error: Some(e),
                    }
                }
            };
            step_results.push(result);
        }

        let success = step_results.iter().all(|r| r.success);
        let record = RecoveryRecord {
            id: Uuid::new_v4().to_string(),
            service_name: service.to_string(),
            strategy: strategy.clone(),
            step_results: step_results.clone(),
            success,
            timestamp: Utc::now(),
        };
        if let Err(e) = self.log.append(&record) {
            error!(service = %service, error = %e, "Failed to persist recovery record");
        }

        info!(service = %service, success, record_id = %record.id, "Recovery finished");
        self.events.publish(EngineEvent::RecoveryCompleted {
            service: service.to_string(),
            success,
            confidence: strategy.confidence,
            record_id: record.id.clone(),
            timestamp: record.timestamp,
        });

        Ok(ExecutionReport {
            record_id: record.id,
            success,
            step_results,
        })
    }

    async fn run_step(&self, service: &str, step: &RecoveryStep) -> StepOutcome {
        match &step.kind {
            StepKind::RestoreState { state, snapshot_version } => {
                self.states
                    .write_state(service, state)
                    .map_err(|e| e.to_string())?;
                Ok(format!("State restored from snapshot v{snapshot_version}"))
            }
            StepKind::RestoreConfig { configuration, snapshot_version } => {
                self.states
                    .write_config(service, configuration)
                    .map_err(|e| e.to_string())?;
                Ok(format!("Configuration restored from snapshot v{snapshot_version}"))
            }
            StepKind::ReconnectNeighbors { neighbors, .. } => {
                self.reconnect_neighbors(service, neighbors).await
            }
            StepKind::WarmCache { operations } => self.warm_cache(service, operations),
            StepKind::VerifyHealth => self.verify_health(service).await,
        }
    }

    async fn reconnect_neighbors(&self, service: &str, neighbors: &[String]) -> StepOutcome {
        let notification = Notification::neighbor_recovered(service);
        let mut delivered = 0usize;
        for neighbor in neighbors {
            match self.notifier.notify(neighbor, &notification).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!(
                    service = %service,
                    neighbor = %neighbor,
                    error = %e,
                    "Neighbor notification failed"
                ),
            }
        }
        if delivered > 0 {
            Ok(format!("Notified {delivered}/{} neighbors", neighbors.len()))
        } else {
            Err(format!("0/{} neighbor notifications delivered", neighbors.len()))
        }
    }

    fn warm_cache(&self, service: &str, operations: &[ReplayedOperation]) -> StepOutcome {
        for op in operations {
            self.kv
                .set(
                    &keys::cache(service, &op.operation),
                    op.response.clone(),
                    Some(self.cache_ttl),
                )
                .map_err(|e| e.to_string())?;
        }
        Ok(format!("Warmed {} cache entries", operations.len()))
    }

    /// Same probe the monitor uses. Side-effect free.
    pub async fn verify_health(&self, service: &str) -> StepOutcome {
        let entry = self
            .topology
            .get(service)
            .ok_or_else(|| format!("unknown service: {service}"))?;
        let latency = probe_with_timeout(self.probe.as_ref(), service, entry, self.probe_timeout)
            .await
            .map_err(|e| e.to_string())?;
        Ok(format!("Healthy ({} ms)", latency.as_millis()))
    }

    pub fn history(&self, service: Option<&str>, limit: usize) -> Vec<RecoveryRecord> {
        self.log.recent(service, limit)
    }
}
