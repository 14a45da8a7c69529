//! Storage
//!
//! Two tiers:
//! - Fast store (`KeyValueStore`): bounded lists, awareness, snapshots,
//!   inboxes, counters. Values may carry a TTL.
//! - Durable store (sled): the append-only trace log and the recovery
//!   audit trail. Survives restarts.

pub mod kv;
mod recovery_log;
mod service_state;
mod trace_log;
mod trace_store;

pub use kv::{keys, InMemoryStore, KeyValueStore, KeyValueStoreExt, StoreError};
pub use recovery_log::RecoveryLog;
pub use service_state::{KvServiceState, ServiceStateStore};
pub use trace_log::TraceLog;
pub use trace_store::TraceStore;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Durable storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Open (or create) the durable database.
pub fn open_db(path: &Path) -> Result<sled::Db, StorageError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let db = sled::open(path)?;
    tracing::info!(path = %path.display(), "Durable store opened");
    Ok(db)
}

/// Periodically purge expired fast-store values until cancelled.
pub async fn run_sweeper(
    kv: Arc<dyn KeyValueStore>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let purged = kv.purge_expired();
                if purged > 0 {
                    tracing::debug!(purged, backend = kv.backend_name(), "Expired keys purged");
                }
            }
        }
    }
}
