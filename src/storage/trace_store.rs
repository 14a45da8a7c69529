//! TraceStore: the fast per-service list plus the durable log
//!
//! The fast list `traces:{service}` holds the newest spans (bounded,
//! most-recent-first) for cheap "what happened lately" reads. The durable
//! log keeps everything for chain reconstruction and failure analysis.

use std::sync::Arc;

use super::kv::{keys, KeyValueStore, KeyValueStoreExt, StoreError};
use super::trace_log::TraceLog;
use super::StorageError;
use crate::types::TraceRecord;

#[derive(Clone)]
pub struct TraceStore {
    kv: Arc<dyn KeyValueStore>,
    log: TraceLog,
    capacity: usize,
}

impl TraceStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, log: TraceLog, capacity: usize) -> Self {
        Self { kv, log, capacity }
    }

    /// Durable log first, then the fast list.
    pub fn append(&self, record: &TraceRecord) -> Result<(), StorageError> {
        self.append_durable(record)?;
        self.cache_recent(record)?;
        Ok(())
    }

    pub fn append_durable(&self, record: &TraceRecord) -> Result<(), StorageError> {
        self.log.append(record)
    }

    /// Prepend to `traces:{service}` and trim to capacity.
    pub fn cache_recent(&self, record: &TraceRecord) -> Result<(), StoreError> {
        self.kv
            .push_json(&keys::traces(&record.service_name), record, self.capacity)?;
        Ok(())
    }

    /// Newest spans from the fast list.
    pub fn recent(&self, service: &str, limit: usize) -> Result<Vec<TraceRecord>, StoreError> {
        self.kv.range_json(&keys::traces(service), 0, limit)
    }

    pub fn cached_len(&self, service: &str) -> Result<usize, StoreError> {
        self.kv.list_len(&keys::traces(service))
    }

    /// Newest spans from the durable log.
    pub fn interactions(
        &self,
        service: &str,
        limit: usize,
    ) -> Result<Vec<TraceRecord>, StorageError> {
        self.log.recent_for_service(service, limit)
    }

    /// Full call chain, oldest first.
    pub fn chain(&self, trace_id: &str) -> Result<Vec<TraceRecord>, StorageError> {
        self.log.chain(trace_id)
    }

    pub fn durable_count(&self) -> usize {
        self.log.count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;
    use crate::types::TraceInput;
    use tempfile::tempdir;

    #[test]
    fn test_fast_list_is_capped_but_log_keeps_everything() {
        let dir = tempdir().unwrap();
        let db = sled::open(dir.path().join("db")).unwrap();
        let store = TraceStore::new(
            Arc::new(InMemoryStore::new()),
            TraceLog::open(&db).unwrap(),
            1000,
        );

        for i in 0..1500 {
            let record = TraceInput::new("coin", format!("op-{i}"))
                .into_record(format!("t{i}"), format!("s{i}"));
            store.append(&record).unwrap();
        }

        assert_eq!(store.cached_len("coin").unwrap(), 1000);
        let newest = store.recent("coin", 1).unwrap();
        assert_eq!(newest[0].operation, "op-1499");
        assert_eq!(store.durable_count(), 1500);
        assert_eq!(store.interactions("coin", 2000).unwrap().len(), 1500);
    }
}
