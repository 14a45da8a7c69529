//! Neighbor notifications
//!
//! `reconnect_neighbors` tells each listed neighbor that the failed service
//! is back. The bundled notifier drops messages into a capped per-service
//! inbox in the fast store, which services poll via
//! `GET /api/services/:name/inbox`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::storage::{keys, KeyValueStore, KeyValueStoreExt, StoreError};

pub const NEIGHBOR_RECOVERED: &str = "neighbor_recovered";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub event: String,
    pub service: String,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn neighbor_recovered(service: &str) -> Self {
        Self {
            event: NEIGHBOR_RECOVERED.to_string(),
            service: service.to_string(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[async_trait]
pub trait NeighborNotifier: Send + Sync {
    async fn notify(&self, neighbor: &str, notification: &Notification) -> Result<(), NotifyError>;
}

/// Inbox-per-service notifier backed by the fast store.
#[derive(Clone)]
pub struct StoreInbox {
    kv: Arc<dyn KeyValueStore>,
    capacity: usize,
}

impl StoreInbox {
    pub fn new(kv: Arc<dyn KeyValueStore>, capacity: usize) -> Self {
        Self { kv, capacity }
    }

    /// Pending notifications for `service`, newest first.
    pub fn inbox(&self, service: &str, limit: usize) -> Result<Vec<Notification>, StoreError> {
        self.kv.range_json(&keys::inbox(service), 0, limit)
    }
}

#[async_trait]
impl NeighborNotifier for StoreInbox {
    async fn notify(&self, neighbor: &str, notification: &Notification) -> Result<(), NotifyError> {
        self.kv
            .push_json(&keys::inbox(neighbor), notification, self.capacity)?;
        Ok(())
    }
}
