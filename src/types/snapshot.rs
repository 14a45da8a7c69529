//! Point-in-time service snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::trace::{NeighborAwareness, TraceRecord};

/// Immutable capture of a service's declared state, configuration and
/// recent activity. Used as the restore point during recovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSnapshot {
    pub service_name: String,
    /// Monotonic per-service version
    pub version: u64,
    pub timestamp: DateTime<Utc>,
    /// Declared state (`Null` when the service never published one)
    pub state: Value,
    /// Declared configuration (`Null` when absent)
    pub configuration: Value,
    /// Most recent traces, newest first
    pub recent_traces: Vec<TraceRecord>,
    /// Neighbor → last interaction observed by this service
    pub neighbor_states: BTreeMap<String, NeighborAwareness>,
    pub health_metrics: Value,
}

impl ServiceSnapshot {
    /// True when the snapshot carries a usable configuration block.
    pub fn has_configuration(&self) -> bool {
        match &self.configuration {
            Value::Null => false,
            Value::Object(map) => !map.is_empty(),
            Value::Array(items) => !items.is_empty(),
            _ => true,
        }
    }
}
