//! Trace Collector
//!
//! Validates incoming spans, assigns ids, persists them (durable log first,
//! then the capped fast list) and refreshes neighbor awareness for every
//! topology neighbor of the emitting service.

mod ingest;

pub use ingest::{IngestStats, IngestWriter, SubmitOutcome, TraceIngest};

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::storage::{keys, KeyValueStore, KeyValueStoreExt, StorageError, StoreError, TraceStore};
use crate::topology::TopologyRegistry;
use crate::types::{NeighborAwareness, TraceInput, TraceRecord};

#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct TraceCollector {
    traces: TraceStore,
    kv: Arc<dyn KeyValueStore>,
    topology: Arc<TopologyRegistry>,
    awareness_ttl: Duration,
}

impl TraceCollector {
    pub fn new(
        traces: TraceStore,
        kv: Arc<dyn KeyValueStore>,
        topology: Arc<TopologyRegistry>,
        awareness_ttl: Duration,
    ) -> Self {
        Self {
            traces,
            kv,
            topology,
            awareness_ttl,
        }
    }

    /// Validate input and materialize a record with generated ids.
    ///
    /// `span_id` is always generated here; `trace_id` only when absent.
    pub fn prepare(&self, input: TraceInput) -> Result<TraceRecord, CollectorError> {
        if input.service_name.trim().is_empty() {
            return Err(CollectorError::MissingField("service_name"));
        }
        if input.operation.trim().is_empty() {
            return Err(CollectorError::MissingField("operation"));
        }
        Ok(input.into_record(Uuid::new_v4().to_string(), Uuid::new_v4().to_string()))
    }

    /// Validate and persist synchronously.
    pub fn record_trace(&self, input: TraceInput) -> Result<TraceRecord, CollectorError> {
        let record = self.prepare(input)?;
        self.write(&record)?;
        Ok(record)
    }

    /// Full write: durable log, fast list, awareness.
    pub fn write(&self, record: &TraceRecord) -> Result<(), CollectorError> {
        self.traces.append_durable(record)?;
        self.traces.cache_recent(record)?;
        self.propagate_awareness(record)?;
        Ok(())
    }

    /// Backpressure path: durable log and awareness only.
    pub fn write_durable(&self, record: &TraceRecord) -> Result<(), CollectorError> {
        self.traces.append_durable(record)?;
        self.propagate_awareness(record)?;
        Ok(())
    }

    /// Upsert `awareness:{neighbor}:{service}` for each neighbor of the
    /// emitting service. Returns how many entries were written.
    fn propagate_awareness(&self, record: &TraceRecord) -> Result<usize, StoreError> {
        if !self.topology.contains(&record.service_name) {
            warn!(
                service = %record.service_name,
                trace_id = %record.trace_id,
                "Orphan trace: service not in topology, awareness skipped"
            );
            return Ok(0);
        }

        let awareness = NeighborAwareness::from_trace(record);
        let neighbors = self.topology.neighbors(&record.service_name);
        for neighbor in neighbors {
            self.kv.set_json(
                &keys::awareness(neighbor, &record.service_name),
                &awareness,
                Some(self.awareness_ttl),
            )?;
        }
        debug!(
            service = %record.service_name,
            neighbors = neighbors.len(),
            "Neighbor awareness refreshed"
        );
        Ok(neighbors.len())
    }

    /// Every span sharing `trace_id`, oldest first.
    pub fn trace_chain(&self, trace_id: &str) -> Result<Vec<TraceRecord>, CollectorError> {
        Ok(self.traces.chain(trace_id)?)
    }

    /// Durable history for a service, newest first.
    pub fn interactions(
        &self,
        service: &str,
        limit: usize,
    ) -> Result<Vec<TraceRecord>, CollectorError> {
        Ok(self.traces.interactions(service, limit)?)
    }

    /// Newest spans from the fast list.
    pub fn recent(&self, service: &str, limit: usize) -> Result<Vec<TraceRecord>, CollectorError> {
        Ok(self.traces.recent(service, limit)?)
    }

    pub fn trace_store(&self) -> &TraceStore {
        &self.traces
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{InMemoryStore, TraceLog};
    use crate::test_support::payments_topology;
    use tempfile::TempDir;

    fn collector() -> (TraceCollector, Arc<dyn KeyValueStore>, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path().join("db")).unwrap();
        let kv: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        let traces = TraceStore::new(kv.clone(), TraceLog::open(&db).unwrap(), 1000);
        let collector = TraceCollector::new(
            traces,
            kv.clone(),
            payments_topology(),
            Duration::from_secs(3600),
        );
        (collector, kv, dir)
    }

    #[test]
    fn test_missing_fields_rejected() {
        let (collector, _kv, _dir) = collector();
        let err = collector.record_trace(TraceInput::new("", "charge")).unwrap_err();
        assert!(matches!(err, CollectorError::MissingField("service_name")));
        let err = collector.record_trace(TraceInput::new("payments", "  ")).unwrap_err();
        assert!(matches!(err, CollectorError::MissingField("operation")));
    }

    #[test]
    fn test_span_ids_generated_and_unique() {
        let (collector, _kv, _dir) = collector();
        let a = collector.record_trace(TraceInput::new("payments", "charge")).unwrap();
        let b = collector.record_trace(TraceInput::new("payments", "charge")).unwrap();
        assert_ne!(a.span_id, b.span_id);
        assert_ne!(a.trace_id, b.trace_id);
    }

    #[test]
    fn test_awareness_written_for_each_neighbor() {
        let (collector, kv, _dir) = collector();
        let record = collector.record_trace(TraceInput::new("payments", "charge")).unwrap();

        for neighbor in ["ledger", "wallet"] {
            let seen: NeighborAwareness = kv
                .get_json(&keys::awareness(neighbor, "payments"))
                .unwrap()
                .unwrap();
            assert_eq!(seen.last_operation, "charge");
            assert_eq!(seen.trace_id, record.trace_id);
        }
        // Reverse direction untouched
        assert!(kv.get(&keys::awareness("payments", "ledger")).unwrap().is_none());
    }

    #[test]
    fn test_orphan_trace_stored_without_awareness() {
        let (collector, _kv, _dir) = collector();
        let record = collector.record_trace(TraceInput::new("ghost", "boo")).unwrap();
        let chain = collector.trace_chain(&record.trace_id).unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(collector.recent("ghost", 10).unwrap().len(), 1);
    }

    #[test]
    fn test_chain_is_ascending_and_homogeneous() {
        let (collector, _kv, _dir) = collector();
        let base = chrono::Utc::now();
        for (i, svc) in ["wallet", "payments", "ledger"].iter().enumerate() {
            let mut input = TraceInput::new(*svc, "step");
            input.trace_id = Some("chain-1".into());
            input.timestamp = Some(base - chrono::Duration::seconds(i as i64));
            collector.record_trace(input).unwrap();
        }
        let mut other = TraceInput::new("payments", "unrelated");
        other.trace_id = Some("chain-2".into());
        collector.record_trace(other).unwrap();

        let chain = collector.trace_chain("chain-1").unwrap();
        assert_eq!(chain.len(), 3);
        assert!(chain.iter().all(|r| r.trace_id == "chain-1"));
        assert!(chain.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(chain[0].service_name, "ledger");
    }

    #[test]
    fn test_write_durable_skips_fast_list() {
        let (collector, kv, _dir) = collector();
        let record = collector.prepare(TraceInput::new("payments", "charge")).unwrap();
        collector.write_durable(&record).unwrap();

        assert!(collector.recent("payments", 10).unwrap().is_empty());
        assert_eq!(collector.interactions("payments", 10).unwrap().len(), 1);
        assert!(kv.get(&keys::awareness("ledger", "payments")).unwrap().is_some());
    }
}
