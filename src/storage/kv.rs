//! KeyValueStore trait: the shared fast store
//!
//! Every component receives an `Arc<dyn KeyValueStore>` at construction
//! instead of reaching for module-level maps. The store offers plain values
//! with optional TTL, capped lists (most-recent-first) and counters, which is
//! everything the collector, snapshot manager, monitor and executor need:
//! - `InMemoryStore`: sharded in-process store (default)
//! - A networked cache can implement the same trait without touching callers
//!
//! All mutations are single-key, so no cross-key transactions are required.

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Key-value store errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Trait for pluggable key-value backends
///
/// Implementations must be thread-safe (Send + Sync) for shared access
/// across async tasks.
pub trait KeyValueStore: Send + Sync {
    /// Read a value; expired entries read as absent.
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Write a value, replacing any previous one and its TTL.
    fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Delete a value. Returns whether something was removed.
    fn remove(&self, key: &str) -> Result<bool, StoreError>;

    /// Prepend to a list and trim it to `max_len`, returning evicted items
    /// (oldest last).
    fn push_front_capped(
        &self,
        key: &str,
        value: Value,
        max_len: usize,
    ) -> Result<Vec<Value>, StoreError>;

    /// Items `start..start + count` of a list (index 0 = most recent).
    fn range(&self, key: &str, start: usize, count: usize) -> Result<Vec<Value>, StoreError>;

    fn list_len(&self, key: &str) -> Result<usize, StoreError>;

    /// Atomically increment a counter, returning the new value.
    fn incr(&self, key: &str) -> Result<u64, StoreError>;

    /// Drop expired values. Returns how many were removed.
    fn purge_expired(&self) -> usize;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

/// Typed helpers over any [`KeyValueStore`].
pub trait KeyValueStoreExt: KeyValueStore {
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.get(key)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    fn set_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        self.set(key, serde_json::to_value(value)?, ttl)
    }

    fn push_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        max_len: usize,
    ) -> Result<Vec<Value>, StoreError> {
        self.push_front_capped(key, serde_json::to_value(value)?, max_len)
    }

    /// Decode a list range, skipping entries that no longer parse.
    fn range_json<T: DeserializeOwned>(
        &self,
        key: &str,
        start: usize,
        count: usize,
    ) -> Result<Vec<T>, StoreError> {
        let items = self.range(key, start, count)?;
        Ok(items
            .into_iter()
            .filter_map(|v| match serde_json::from_value(v) {
                Ok(item) => Some(item),
                Err(e) => {
                    tracing::warn!(key = key, error = %e, "Skipping undecodable list entry");
                    None
                }
            })
            .collect())
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStoreExt for S {}

// ============================================================================
// Key layout
// ============================================================================

/// Key naming for everything kept in the fast store.
pub mod keys {
    /// Escalated issues, newest first
    pub const CRITICAL_ISSUES: &str = "critical_issues";
    /// Services that came back on their own
    pub const RECOVERIES: &str = "recoveries";
    /// Services healed by the monitor
    pub const HEALINGS: &str = "healings";
    /// Event journal
    pub const EVENTS: &str = "events";

    pub fn traces(service: &str) -> String {
        format!("traces:{service}")
    }

    /// What `observer` last saw of `observed`.
    pub fn awareness(observer: &str, observed: &str) -> String {
        format!("awareness:{observer}:{observed}")
    }

    pub fn service_state(service: &str) -> String {
        format!("service:{service}:state")
    }

    pub fn service_config(service: &str) -> String {
        format!("service:{service}:config")
    }

    pub fn metrics(service: &str) -> String {
        format!("metrics:{service}")
    }

    pub fn snapshot(service: &str, version: u64) -> String {
        format!("snapshot:{service}:{version}")
    }

    /// Ring buffer of snapshot keys, newest first
    pub fn snapshot_index(service: &str) -> String {
        format!("snapshots:{service}")
    }

    pub fn snapshot_sequence(service: &str) -> String {
        format!("snapshot_seq:{service}")
    }

    pub fn cache(service: &str, operation: &str) -> String {
        format!("cache:{service}:{operation}")
    }

    pub fn inbox(service: &str) -> String {
        format!("inbox:{service}")
    }
}

// ============================================================================
// In-memory backend
// ============================================================================

#[derive(Debug, Clone)]
struct StoredValue {
    value: Value,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-process store for single-node deployments and tests
///
/// Sharded via `DashMap`, so concurrent writers to different keys never
/// contend on a global lock. Not durable: data is lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    values: DashMap<String, StoredValue>,
    lists: DashMap<String, VecDeque<Value>>,
    counters: DashMap<String, u64>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let now = Instant::now();
        match self.values.get(key) {
            None => return Ok(None),
            Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
            Some(_) => {}
        }
        // Expired: evict lazily (guard released above)
        self.values.remove_if(key, |_, v| v.is_expired(now));
        Ok(None)
    }

    fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<(), StoreError> {
        let expires_at = ttl.map(|d| Instant::now() + d);
        self.values
            .insert(key.to_string(), StoredValue { value, expires_at });
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, StoreError> {
        let value = self.values.remove(key).is_some();
        let list = self.lists.remove(key).is_some();
        Ok(value || list)
    }

    fn push_front_capped(
        &self,
        key: &str,
        value: Value,
        max_len: usize,
    ) -> Result<Vec<Value>, StoreError> {
        let mut list = self.lists.entry(key.to_string()).or_default();
        list.push_front(value);
        let mut evicted = Vec::new();
        while list.len() > max_len {
            if let Some(old) = list.pop_back() {
                evicted.push(old);
            }
        }
        Ok(evicted)
    }

    fn range(&self, key: &str, start: usize, count: usize) -> Result<Vec<Value>, StoreError> {
        Ok(self
            .lists
            .get(key)
            .map(|list| list.iter().skip(start).take(count).cloned().collect())
            .unwrap_or_default())
    }

    fn list_len(&self, key: &str) -> Result<usize, StoreError> {
        Ok(self.lists.get(key).map(|l| l.len()).unwrap_or(0))
    }

    fn incr(&self, key: &str) -> Result<u64, StoreError> {
        let mut counter = self.counters.entry(key.to_string()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.values.len();
        self.values.retain(|_, v| !v.is_expired(now));
        before.saturating_sub(self.values.len())
    }

    fn backend_name(&self) -> &'static str {
        "InMemory"
    }
}
