//! Fire-and-forget trace ingest
//!
//! The request path calls [`TraceIngest::submit`], which never blocks and
//! never fails: the record goes onto a bounded channel drained by the
//! [`IngestWriter`] task. When the channel is full the fast-store write is
//! skipped and a blocking task persists only the durable log and awareness.
//! Those overflow writes are capped; past the cap the record is dropped.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::TraceCollector;
use crate::types::TraceRecord;

/// Concurrent durable-only writes allowed while the queue is full
const OVERFLOW_WRITERS: usize = 32;

/// What happened to a submitted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Queued for the writer
    Queued,
    /// Queue full; durable-only write dispatched
    Degraded,
    /// Writer gone, or queue and overflow writers both saturated; record dropped
    Dropped,
}

#[derive(Debug, Default)]
struct Counters {
    queued: AtomicU64,
    written: AtomicU64,
    degraded: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

/// Snapshot of ingest counters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct IngestStats {
    pub queued: u64,
    pub written: u64,
    pub degraded: u64,
    pub dropped: u64,
    pub failed: u64,
}

// ============================================================================
// Handle
// ============================================================================

/// Cloneable submit handle
#[derive(Clone)]
pub struct TraceIngest {
    tx: mpsc::Sender<TraceRecord>,
    collector: TraceCollector,
    counters: Arc<Counters>,
    overflow: Arc<Semaphore>,
}

impl TraceIngest {
    /// Create the handle and its writer. The writer must be spawned.
    pub fn channel(collector: TraceCollector, capacity: usize) -> (Self, IngestWriter) {
        Self::with_overflow_writers(collector, capacity, OVERFLOW_WRITERS)
    }

    /// Like [`TraceIngest::channel`] with an explicit overflow-writer cap.
    pub fn with_overflow_writers(
        collector: TraceCollector,
        capacity: usize,
        overflow_writers: usize,
    ) -> (Self, IngestWriter) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let counters = Arc::new(Counters::default());
        let handle = Self {
            tx,
            collector: collector.clone(),
            counters: counters.clone(),
            overflow: Arc::new(Semaphore::new(overflow_writers)),
        };
        let writer = IngestWriter {
            rx,
            collector,
            counters,
        };
        (handle, writer)
    }

    pub fn collector(&self) -> &TraceCollector {
        &self.collector
    }

    /// Non-blocking enqueue. Errors are logged, never returned.
    pub fn submit(&self, record: TraceRecord) -> SubmitOutcome {
        match self.tx.try_send(record) {
            Ok(()) => {
                self.counters.queued.fetch_add(1, Ordering::Relaxed);
                SubmitOutcome::Queued
            }
            Err(mpsc::error::TrySendError::Full(record)) => self.write_overflow(record),
            Err(mpsc::error::TrySendError::Closed(record)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                error!(
                    service = %record.service_name,
                    span_id = %record.span_id,
                    "Ingest writer stopped: trace dropped"
                );
                SubmitOutcome::Dropped
            }
        }
    }

    /// Durable-only write on the blocking pool, bounded by the overflow cap.
    fn write_overflow(&self, record: TraceRecord) -> SubmitOutcome {
        let Ok(permit) = self.overflow.clone().try_acquire_owned() else {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            error!(
                service = %record.service_name,
                span_id = %record.span_id,
                "Ingest overloaded: trace dropped"
            );
            return SubmitOutcome::Dropped;
        };

        self.counters.degraded.fetch_add(1, Ordering::Relaxed);
        warn!(
            service = %record.service_name,
            span_id = %record.span_id,
            "Ingest queue full: skipping fast store"
        );
        let collector = self.collector.clone();
        let counters = self.counters.clone();
        let persist = move || {
            let _permit = permit;
            if let Err(e) = collector.write_durable(&record) {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(error = %e, span_id = %record.span_id, "Degraded trace write failed");
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                rt.spawn_blocking(persist);
            }
            Err(_) => persist(),
        }
        SubmitOutcome::Degraded
    }

    pub fn stats(&self) -> IngestStats {
        IngestStats {
            queued: self.counters.queued.load(Ordering::Relaxed),
            written: self.counters.written.load(Ordering::Relaxed),
            degraded: self.counters.degraded.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// Writer
// ============================================================================

/// Background task draining the ingest queue.
pub struct IngestWriter {
    rx: mpsc::Receiver<TraceRecord>,
    collector: TraceCollector,
    counters: Arc<Counters>,
}

impl IngestWriter {
    /// Run until cancelled, then drain what is already queued.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("Ingest writer started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                next = self.rx.recv() => match next {
                    Some(record) => self.persist(record),
                    None => break,
                },
            }
        }

        self.rx.close();
        let mut drained = 0usize;
        while let Ok(record) = self.rx.try_recv() {
            self.persist(record);
            drained += 1;
        }
        info!(drained, "Ingest writer stopped");
    }

    fn persist(&self, record: TraceRecord) {
        match self.collector.write(&record) {
            Ok(()) => {
                self.counters.written.fetch_add(1, Ordering::Relaxed);
                debug!(service = %record.service_name, span_id = %record.span_id, "Trace written");
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(error = %e, service = %record.service_name, "Trace write failed");
            }
        }
    }
}
