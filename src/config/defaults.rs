//! System-wide default constants.
//!
//! Every value here can be overridden from the TOML config; these only apply
//! when a key is absent. Grouped by subsystem for easy discovery.

// ============================================================================
// Server
// ============================================================================

/// Default HTTP bind address.
pub const SERVER_ADDR: &str = "0.0.0.0:4998";

/// Maximum accepted request body (bytes). Trace payloads carry request and
/// response bodies, so this is generous.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

// ============================================================================
// Storage
// ============================================================================

/// Directory holding the sled database.
pub const DATA_DIR: &str = "./data";

/// Per-service fast-store trace list capacity (most recent first).
pub const TRACE_CACHE_CAPACITY: usize = 1_000;

/// Neighbour awareness entry lifetime (seconds).
pub const AWARENESS_TTL_SECS: u64 = 3_600;

/// Warm-cache entry lifetime (seconds).
pub const CACHE_TTL_SECS: u64 = 3_600;

/// Bounded ingest queue between the request path and the trace writer.
pub const INGEST_QUEUE_CAPACITY: usize = 4_096;

/// Notifications retained per service inbox.
pub const INBOX_CAPACITY: usize = 100;

/// Escalated issues retained in the critical issue list.
pub const CRITICAL_ISSUE_CAPACITY: usize = 1_000;

/// Events retained in the event journal.
pub const EVENT_JOURNAL_CAPACITY: usize = 500;

/// How often expired key-value entries are swept (seconds).
pub const STORE_SWEEP_INTERVAL_SECS: u64 = 60;

// ============================================================================
// Snapshots
// ============================================================================

/// Scheduled capture interval (seconds). 900 = 15 minutes.
pub const SNAPSHOT_INTERVAL_SECS: u64 = 900;

/// Snapshots retained per service in the ring buffer.
pub const SNAPSHOT_RETENTION: usize = 50;

/// Recent traces embedded in each snapshot.
pub const SNAPSHOT_RECENT_TRACES: usize = 100;

/// Snapshot payload lifetime (seconds). 604 800 = 7 days.
pub const SNAPSHOT_TTL_SECS: u64 = 604_800;

// ============================================================================
// Health Monitor
// ============================================================================

/// Polling cadence (seconds).
pub const POLL_INTERVAL_SECS: u64 = 30;

/// Per-probe timeout (seconds).
pub const PROBE_TIMEOUT_SECS: u64 = 5;

/// Consecutive failures before the heal pipeline runs.
pub const FAILURE_THRESHOLD: u32 = 3;

/// Wait after a supervisor restart before re-probing (seconds).
pub const RESTART_GRACE_SECS: u64 = 10;

// ============================================================================
// Failure analysis
// ============================================================================

/// Durable-log interactions sampled per analysis.
pub const ANALYSIS_SAMPLE_SIZE: usize = 50;

/// Neighbours carried by a `reconnect_neighbors` step.
pub const TOP_NEIGHBORS: usize = 5;

/// Successful operations replayed by a `warm_cache` step.
pub const REPLAY_OPERATIONS: usize = 5;

/// Interactions returned by the history endpoint when no limit is given.
pub const INTERACTIONS_DEFAULT_LIMIT: usize = 100;
