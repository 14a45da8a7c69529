//! Engine events
//!
//! One-to-many fan-out of notable state changes (service down, healed,
//! escalated, ...) over a tokio broadcast channel. The journal task keeps
//! the most recent events in the fast store for `GET /api/events`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::storage::{keys, KeyValueStore, KeyValueStoreExt, StoreError};
use crate::types::HealMethod;

/// Default broadcast buffer
const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    ServiceDown {
        service: String,
        consecutive_failures: u32,
        timestamp: DateTime<Utc>,
    },
    ServiceRecovered {
        service: String,
        timestamp: DateTime<Utc>,
    },
    ServiceHealed {
        service: String,
        method: HealMethod,
        timestamp: DateTime<Utc>,
    },
    RecoveryCompleted {
        service: String,
        success: bool,
        confidence: u8,
        record_id: String,
        timestamp: DateTime<Utc>,
    },
    SnapshotCaptured {
        service: String,
        version: u64,
        timestamp: DateTime<Utc>,
    },
    Escalated {
        service: String,
        critical: bool,
        timestamp: DateTime<Utc>,
    },
}

impl EngineEvent {
    pub fn service(&self) -> &str {
        match self {
            EngineEvent::ServiceDown { service, .. }
            | EngineEvent::ServiceRecovered { service, .. }
            | EngineEvent::ServiceHealed { service, .. }
            | EngineEvent::RecoveryCompleted { service, .. }
            | EngineEvent::SnapshotCaptured { service, .. }
            | EngineEvent::Escalated { service, .. } => service,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            EngineEvent::ServiceDown { .. } => "service_down",
            EngineEvent::ServiceRecovered { .. } => "service_recovered",
            EngineEvent::ServiceHealed { .. } => "service_healed",
            EngineEvent::RecoveryCompleted { .. } => "recovery_completed",
            EngineEvent::SnapshotCaptured { .. } => "snapshot_captured",
            EngineEvent::Escalated { .. } => "escalated",
        }
    }
}

/// Cloneable publisher handle.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_BUFFER)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish to all current subscribers. Returns how many received it;
    /// zero subscribers is not an error.
    pub fn publish(&self, event: EngineEvent) -> usize {
        debug!(kind = event.kind(), service = event.service(), "Event published");
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

// ============================================================================
// Journal
// ============================================================================

/// Persists events into the capped `events` list.
#[derive(Clone)]
pub struct EventJournal {
    kv: Arc<dyn KeyValueStore>,
    capacity: usize,
}

impl EventJournal {
    pub fn new(kv: Arc<dyn KeyValueStore>, capacity: usize) -> Self {
        Self { kv, capacity }
    }

    pub fn record(&self, event: &EngineEvent) -> Result<(), StoreError> {
        self.kv.push_json(keys::EVENTS, event, self.capacity)?;
        Ok(())
    }

    /// Newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<EngineEvent>, StoreError> {
        self.kv.range_json(keys::EVENTS, 0, limit)
    }

    /// Drain the bus into the journal until cancelled or the bus closes.
    pub async fn run(self, mut rx: broadcast::Receiver<EngineEvent>, shutdown: CancellationToken) {
        info!(capacity = self.capacity, "Event journal started");
        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                received = rx.recv() => received,
            };
            match event {
                Ok(event) => {
                    if let Err(e) = self.record(&event) {
                        warn!(error = %e, kind = event.kind(), "Failed to journal event");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event journal lagged; events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        info!("Event journal stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;

    fn down(service: &str) -> EngineEvent {
        EngineEvent::ServiceDown {
            service: service.to_string(),
            consecutive_failures: 3,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new(4);
        assert_eq!(bus.publish(down("coin")), 0);
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let v = serde_json::to_value(down("coin")).unwrap();
        assert_eq!(v["type"], "service_down");
        assert_eq!(v["service"], "coin");
    }

    #[tokio::test]
    async fn test_journal_keeps_newest_first() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        let bus = EventBus::new(16);
        let token = CancellationToken::new();
        let journal = EventJournal::new(kv.clone(), 2);
        let handle = tokio::spawn(journal.run(bus.subscribe(), token.clone()));

        bus.publish(down("a"));
        bus.publish(down("b"));
        bus.publish(down("c"));

        let reader = EventJournal::new(kv, 2);
        for _ in 0..100 {
            if reader.recent(10).unwrap().first().map(|e| e.service().to_string())
                == Some("c".to_string())
            {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        token.cancel();
        handle.await.unwrap();

        let services: Vec<_> = reader
            .recent(10)
            .unwrap()
            .iter()
            .map(|e| e.service().to_string())
            .collect();
        assert_eq!(services, vec!["c", "b"]);
    }
}
