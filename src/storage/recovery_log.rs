//! Recovery audit trail
//!
//! One append-only sled tree of RecoveryRecords keyed by
//! timestamp(be) ++ record id, so iteration in reverse is newest first.

use super::trace_log::timestamp_key;
use super::StorageError;
use crate::types::RecoveryRecord;

const RECOVERY_TREE: &str = "recovery_records";

#[derive(Clone)]
pub struct RecoveryLog {
    tree: sled::Tree,
}

impl RecoveryLog {
    pub fn open(db: &sled::Db) -> Result<Self, StorageError> {
        Ok(Self {
            tree: db.open_tree(RECOVERY_TREE)?,
        })
    }

    pub fn append(&self, record: &RecoveryRecord) -> Result<(), StorageError> {
        let mut key = timestamp_key(record.timestamp).to_vec();
        key.extend_from_slice(record.id.as_bytes());
        self.tree.insert(key, serde_json::to_vec(record)?)?;
        Ok(())
    }

    /// Newest first, optionally filtered by service.
    pub fn recent(&self, service: Option<&str>, limit: usize) -> Vec<RecoveryRecord> {
        let mut records = Vec::with_capacity(limit.min(256));
        for item in self.tree.iter().rev() {
            if records.len() >= limit {
                break;
            }
            let Ok((_key, value)) = item else { continue };
            let Ok(record) = serde_json::from_slice::<RecoveryRecord>(&value) else {
                continue;
            };
            if service.is_some_and(|s| s != record.service_name) {
                continue;
            }
            records.push(record);
        }
        records
    }

    pub fn count(&self) -> usize {
        self.tree.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RecoveryStrategy;
    use chrono::{Duration, Utc};
    use tempfile::tempdir;

    fn record(id: &str, service: &str, offset_secs: i64) -> RecoveryRecord {
        RecoveryRecord {
            id: id.to_string(),
            service_name: service.to_string(),
            strategy: RecoveryStrategy {
                steps: vec![],
                confidence: 0,
                estimated_time_sec: 0,
            },
            step_results: vec![],
            success: true,
            timestamp: Utc::now() + Duration::seconds(offset_secs),
        }
    }

    #[test]
    fn test_recent_newest_first_with_filter() {
        let dir = tempdir().unwrap();
        let db = sled::open(dir.path().join("db")).unwrap();
        let log = RecoveryLog::open(&db).unwrap();

        log.append(&record("r1", "coin", 0)).unwrap();
        log.append(&record("r2", "auth", 1)).unwrap();
        log.append(&record("r3", "coin", 2)).unwrap();

        let all: Vec<_> = log.recent(None, 10).into_iter().map(|r| r.id).collect();
        assert_eq!(all, vec!["r3", "r2", "r1"]);

        let coin: Vec<_> = log.recent(Some("coin"), 10).into_iter().map(|r| r.id).collect();
        assert_eq!(coin, vec!["r3", "r1"]);

        assert_eq!(log.recent(None, 1).len(), 1);
        assert_eq!(log.count(), 3);
    }
}
