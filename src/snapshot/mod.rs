//! Snapshot Manager
//!
//! Captures a service's declared state, configuration, recent traces,
//! neighbor awareness and health metrics into an immutable, versioned
//! snapshot. Each service keeps a ring buffer of the newest snapshot keys;
//! versions pushed past the retention cap are deleted.
//!
//! Every capture produces a new version, even when nothing changed, so the
//! retained snapshots form a time series.

use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SnapshotConfig;
use crate::events::{EngineEvent, EventBus};
use crate::storage::{
    keys, KeyValueStore, KeyValueStoreExt, ServiceStateStore, StoreError, TraceStore,
};
use crate::topology::TopologyRegistry;
use crate::types::{NeighborAwareness, ServiceSnapshot};

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("unknown service: {0}")]
    UnknownService(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct SnapshotManager {
    kv: Arc<dyn KeyValueStore>,
    states: Arc<dyn ServiceStateStore>,
    traces: TraceStore,
    topology: Arc<TopologyRegistry>,
    events: EventBus,
    retention: usize,
    recent_traces: usize,
    ttl: Duration,
}

impl SnapshotManager {
    pub fn new(
        kv: Arc<dyn KeyValueStore>,
        states: Arc<dyn ServiceStateStore>,
        traces: TraceStore,
        topology: Arc<TopologyRegistry>,
        events: EventBus,
        config: &SnapshotConfig,
    ) -> Self {
        Self {
            kv,
            states,
            traces,
            topology,
            events,
            retention: config.retention,
            recent_traces: config.recent_traces,
            ttl: config.ttl(),
        }
    }

    /// Capture and store a new snapshot version.
    pub fn capture(&self, service: &str) -> Result<ServiceSnapshot, SnapshotError> {
        if !self.topology.contains(service) {
            return Err(SnapshotError::UnknownService(service.to_string()));
        }

        let state = self.states.read_state(service)?.unwrap_or(Value::Null);
        let configuration = self.states.read_config(service)?.unwrap_or(Value::Null);
        let recent_traces = self.traces.recent(service, self.recent_traces)?;

        // What this service last observed of each neighbor
        let mut neighbor_states = BTreeMap::new();
        for neighbor in self.topology.neighbors(service) {
            if let Some(seen) = self
                .kv
                .get_json::<NeighborAwareness>(&keys::awareness(service, neighbor))?
            {
                neighbor_states.insert(neighbor.clone(), seen);
            }
        }

        let health_metrics = self.kv.get(&keys::metrics(service))?.unwrap_or(Value::Null);
        let version = self.kv.incr(&keys::snapshot_sequence(service))?;

        let snapshot = ServiceSnapshot {
            service_name: service.to_string(),
            version,
            timestamp: Utc::now(),
            state,
            configuration,
            recent_traces,
            neighbor_states,
            health_metrics,
        };

        let key = keys::snapshot(service, version);
        self.kv.set_json(&key, &snapshot, Some(self.ttl))?;
        let evicted = self.kv.push_front_capped(
            &keys::snapshot_index(service),
            Value::String(key),
            self.retention,
        )?;
        for old in evicted {
            if let Some(old_key) = old.as_str() {
                self.kv.remove(old_key)?;
            }
        }

        info!(
            service = %service,
            version,
            traces = snapshot.recent_traces.len(),
            neighbors = snapshot.neighbor_states.len(),
            "Snapshot captured"
        );
        self.events.publish(EngineEvent::SnapshotCaptured {
            service: service.to_string(),
            version,
            timestamp: snapshot.timestamp,
        });

        Ok(snapshot)
    }

    /// Retained snapshots, newest first. Expired entries are skipped.
    pub fn list(&self, service: &str) -> Result<Vec<ServiceSnapshot>, SnapshotError> {
        if !self.topology.contains(service) {
            return Err(SnapshotError::UnknownService(service.to_string()));
        }
        let index: Vec<String> =
            self.kv
                .range_json(&keys::snapshot_index(service), 0, self.retention)?;
        let mut snapshots = Vec::with_capacity(index.len());
        for key in index {
            if let Some(snapshot) = self.kv.get_json::<ServiceSnapshot>(&key)? {
                snapshots.push(snapshot);
            }
        }
        Ok(snapshots)
    }

    /// Most recent retained snapshot, if any.
    pub fn latest(&self, service: &str) -> Result<Option<ServiceSnapshot>, SnapshotError> {
        let index: Vec<String> =
            self.kv
                .range_json(&keys::snapshot_index(service), 0, self.retention)?;
        for key in index {
            if let Some(snapshot) = self.kv.get_json::<ServiceSnapshot>(&key)? {
                return Ok(Some(snapshot));
            }
        }
        Ok(None)
    }

    pub fn get(
        &self,
        service: &str,
        version: u64,
    ) -> Result<Option<ServiceSnapshot>, SnapshotError> {
        Ok(self.kv.get_json(&keys::snapshot(service, version))?)
    }

    /// Capture every registered service once. Returns (captured, failed).
    pub fn capture_all(&self) -> (usize, usize) {
        let mut captured = 0;
        let mut failed = 0;
        for service in self.topology.names() {
            match self.capture(service) {
                Ok(_) => captured += 1,
                Err(e) => {
                    failed += 1;
                    warn!(service = %service, error = %e, "Scheduled snapshot failed");
                }
            }
        }
        (captured, failed)
    }

    /// Capture all services every `interval` until cancelled.
    pub async fn run_scheduler(self: Arc<Self>, interval: Duration, shutdown: CancellationToken) {
        info!(
            interval_secs = interval.as_secs(),
            services = self.topology.len(),
            "Snapshot scheduler started"
        );
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick fires immediately; skip it so startup isn't a capture storm
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let (captured, failed) = self.capture_all();
                    debug!(captured, failed, "Snapshot cycle complete");
                }
            }
        }
        info!("Snapshot scheduler stopped");
    }
}
