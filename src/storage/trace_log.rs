//! Durable trace log
//!
//! Append-only record of every ingested span, kept in sled so call chains
//! and per-service history survive restarts. Three trees:
//! - `spans`: span_id → JSON-serialized TraceRecord
//! - `by_trace`: trace_id \0 ts(be) span_id → span_id
//! - `by_service`: service \0 ts(be) span_id → span_id
//!
//! Index keys embed the timestamp as big-endian bytes, so a prefix scan
//! yields spans in chronological order without sorting.

use super::StorageError;
use crate::types::TraceRecord;
use chrono::{DateTime, Utc};

const SPANS_TREE: &str = "spans";
const BY_TRACE_TREE: &str = "by_trace";
const BY_SERVICE_TREE: &str = "by_service";

/// Order-preserving 8-byte encoding of a timestamp.
///
/// Flips the sign bit so pre-epoch timestamps still sort first.
pub(crate) fn timestamp_key(ts: DateTime<Utc>) -> [u8; 8] {
    let nanos = ts
        .timestamp_nanos_opt()
        .unwrap_or_else(|| ts.timestamp_millis().saturating_mul(1_000_000));
    ((nanos as u64) ^ (1 << 63)).to_be_bytes()
}

fn index_prefix(name: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(name.len() + 1);
    key.extend_from_slice(name.as_bytes());
    key.push(0);
    key
}

fn index_key(name: &str, ts: DateTime<Utc>, span_id: &str) -> Vec<u8> {
    let mut key = index_prefix(name);
    key.extend_from_slice(&timestamp_key(ts));
    key.extend_from_slice(span_id.as_bytes());
    key
}

/// sled-backed trace log
#[derive(Clone)]
pub struct TraceLog {
    spans: sled::Tree,
    by_trace: sled::Tree,
    by_service: sled::Tree,
}

impl TraceLog {
    pub fn open(db: &sled::Db) -> Result<Self, StorageError> {
        Ok(Self {
            spans: db.open_tree(SPANS_TREE)?,
            by_trace: db.open_tree(BY_TRACE_TREE)?,
            by_service: db.open_tree(BY_SERVICE_TREE)?,
        })
    }

    /// Append a span. Re-appending the same span_id overwrites in place,
    /// so at-least-once delivery never duplicates entries.
    pub fn append(&self, record: &TraceRecord) -> Result<(), StorageError> {
        let value = serde_json::to_vec(record)?;
        self.spans.insert(record.span_id.as_bytes(), value)?;
        self.by_trace.insert(
            index_key(&record.trace_id, record.timestamp, &record.span_id),
            record.span_id.as_bytes(),
        )?;
        self.by_service.insert(
            index_key(&record.service_name, record.timestamp, &record.span_id),
            record.span_id.as_bytes(),
        )?;
        Ok(())
    }

    /// All spans sharing `trace_id`, oldest first.
    pub fn chain(&self, trace_id: &str) -> Result<Vec<TraceRecord>, StorageError> {
        let mut records = Vec::new();
        for item in self.by_trace.scan_prefix(index_prefix(trace_id)) {
            let (_key, span_id) = item?;
            if let Some(record) = self.load(&span_id)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Up to `limit` spans reported by `service`, newest first.
    pub fn recent_for_service(
        &self,
        service: &str,
        limit: usize,
    ) -> Result<Vec<TraceRecord>, StorageError> {
        let mut records = Vec::with_capacity(limit.min(1024));
        for item in self.by_service.scan_prefix(index_prefix(service)).rev() {
            if records.len() >= limit {
                break;
            }
            let (_key, span_id) = item?;
            if let Some(record) = self.load(&span_id)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Total number of stored spans
    pub fn count(&self) -> usize {
        self.spans.len()
    }

    fn load(&self, span_id: &[u8]) -> Result<Option<TraceRecord>, StorageError> {
        let Some(bytes) = self.spans.get(span_id)? else {
            return Ok(None);
        };
        match serde_json::from_slice(&bytes) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                tracing::warn!(
                    span_id = %String::from_utf8_lossy(span_id),
                    error = %e,
                    "Skipping corrupt span in trace log"
                );
                Ok(None)
            }
        }
    }
}
