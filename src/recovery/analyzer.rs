//! Failure Analyzer
//!
//! Pure read: samples the durable log, reads what neighbors last saw of the
//! failed service, fetches the newest snapshot and summarizes the sample
//! into an [`InteractionPattern`].

use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use super::RecoveryError;
use crate::snapshot::SnapshotManager;
use crate::storage::{keys, KeyValueStore, KeyValueStoreExt, TraceStore};
use crate::topology::TopologyRegistry;
use crate::types::{
    FailureAnalysis, InteractionPattern, NeighborAwareness, ReplayedOperation, TraceRecord,
};

/// Traces kept verbatim in the analysis
const RECENT_TRACES_IN_ANALYSIS: usize = 10;

pub struct FailureAnalyzer {
    traces: TraceStore,
    kv: Arc<dyn KeyValueStore>,
    topology: Arc<TopologyRegistry>,
    snapshots: Arc<SnapshotManager>,
    sample_size: usize,
    replay_limit: usize,
}

impl FailureAnalyzer {
    pub fn new(
        traces: TraceStore,
        kv: Arc<dyn KeyValueStore>,
        topology: Arc<TopologyRegistry>,
        snapshots: Arc<SnapshotManager>,
        sample_size: usize,
        replay_limit: usize,
    ) -> Self {
        Self {
            traces,
            kv,
            topology,
            snapshots,
            sample_size,
            replay_limit,
        }
    }

    pub fn analyze(&self, service: &str) -> Result<FailureAnalysis, RecoveryError> {
        if !self.topology.contains(service) {
            return Err(RecoveryError::UnknownService(service.to_string()));
        }

        let sample = self.traces.interactions(service, self.sample_size)?;

        // What each neighbor last saw of the failed service
        let mut neighbor_states = BTreeMap::new();
        for neighbor in self.topology.neighbors(service) {
            if let Some(seen) = self
                .kv
                .get_json::<NeighborAwareness>(&keys::awareness(neighbor, service))?
            {
                neighbor_states.insert(neighbor.clone(), seen);
            }
        }

        let last_good_snapshot = self.snapshots.latest(service)?;
        let pattern = extract_interaction_pattern(&sample);
        let successful_ops = successful_operations(&sample, self.replay_limit);

        debug!(
            service = %service,
            sample = sample.len(),
            neighbors = neighbor_states.len(),
            has_snapshot = last_good_snapshot.is_some(),
            error_rate = pattern.error_rate_percent,
            "Failure analysis complete"
        );

        Ok(FailureAnalysis {
            service_name: service.to_string(),
            analyzed_at: Utc::now(),
            sample_size: sample.len(),
            recent_traces: sample.iter().take(RECENT_TRACES_IN_ANALYSIS).cloned().collect(),
            neighbor_states,
            last_good_snapshot,
            pattern,
            successful_ops,
        })
    }
}

/// Summarize a trace sample. An empty sample yields all-zero metrics.
pub fn extract_interaction_pattern(traces: &[TraceRecord]) -> InteractionPattern {
    let mut pattern = InteractionPattern::default();
    if traces.is_empty() {
        return pattern;
    }

    let mut total_ms: u64 = 0;
    let mut errors = 0usize;
    for trace in traces {
        *pattern
            .operation_counts
            .entry(trace.operation.clone())
            .or_insert(0) += 1;
        total_ms = total_ms.saturating_add(trace.duration_ms);
        if !trace.is_success() {
            errors += 1;
        }
        for neighbor in &trace.neighbors_invoked {
            *pattern
                .dependency_weights
                .entry(neighbor.clone())
                .or_insert(0) += 1;
        }
    }

    let n = traces.len() as f64;
    pattern.avg_response_time_ms = total_ms as f64 / n;
    pattern.error_rate_percent = errors as f64 / n * 100.0;
    pattern
}

/// Up to `limit` successful operations, in sample order (newest first).
fn successful_operations(traces: &[TraceRecord], limit: usize) -> Vec<ReplayedOperation> {
    traces
        .iter()
        .filter(|t| t.is_success())
        .take(limit)
        .map(|t| ReplayedOperation {
            operation: t.operation.clone(),
            response: t.response.clone(),
            trace_id: t.trace_id.clone(),
        })
        .collect()
}
