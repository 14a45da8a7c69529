//! Shared fixtures for unit tests.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use crate::api::ApiState;
use crate::app::{Adapters, Components};
use crate::collector::TraceCollector;
use crate::config::{EngineConfig, SnapshotConfig};
use crate::events::EventBus;
use crate::monitor::{CommandSupervisor, LivenessProbe, LogAlertSink, ProbeError};
use crate::recovery::{FailureAnalyzer, RecoveryEngine, RecoveryExecutor, StoreInbox};
use crate::snapshot::SnapshotManager;
use crate::storage::{
    InMemoryStore, KeyValueStore, KvServiceState, RecoveryLog, ServiceStateStore, StoreError,
    TraceLog, TraceStore,
};
use crate::topology::{ServiceEntry, TopologyRegistry};

/// `payments` (critical) with neighbors `ledger` and `wallet`.
pub(crate) fn payments_topology() -> Arc<TopologyRegistry> {
    Arc::new(TopologyRegistry::new(payments_services()))
}

pub(crate) fn payments_services() -> BTreeMap<String, ServiceEntry> {
    let mut services = BTreeMap::new();
    let mut payments = ServiceEntry::new("http://127.0.0.1:9101", &["ledger", "wallet"], true);
    payments.container = Some("payments-container".into());
    services.insert("payments".to_string(), payments);
    services.insert(
        "ledger".to_string(),
        ServiceEntry::new("http://127.0.0.1:9102", &["payments"], false),
    );
    services.insert(
        "wallet".to_string(),
        ServiceEntry::new("http://127.0.0.1:9103", &["payments"], false),
    );
    services
}

/// Probe with per-service scripted health (healthy unless set otherwise).
#[derive(Default)]
pub(crate) struct ScriptedProbe {
    health: Mutex<HashMap<String, bool>>,
    hanging: Mutex<HashSet<String>>,
    calls: AtomicUsize,
}

impl ScriptedProbe {
    pub fn set(&self, service: &str, healthy: bool) {
        if let Ok(mut health) = self.health.lock() {
            health.insert(service.to_string(), healthy);
        }
    }

    /// Make every probe of `service` block for a minute.
    pub fn hang(&self, service: &str) {
        if let Ok(mut hanging) = self.hanging.lock() {
            hanging.insert(service.to_string());
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LivenessProbe for ScriptedProbe {
    async fn probe(&self, service: &str, _entry: &ServiceEntry) -> Result<Duration, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let hangs = self
            .hanging
            .lock()
            .map(|h| h.contains(service))
            .unwrap_or(false);
        if hangs {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        let healthy = self
            .health
            .lock()
            .map(|h| h.get(service).copied().unwrap_or(true))
            .unwrap_or(true);
        if healthy {
            Ok(Duration::from_millis(1))
        } else {
            Err(ProbeError::Unreachable("connection refused".into()))
        }
    }
}

/// State store whose config writes always fail.
struct FailingConfig(KvServiceState);

impl ServiceStateStore for FailingConfig {
    fn read_state(&self, service: &str) -> Result<Option<Value>, StoreError> {
        self.0.read_state(service)
    }
    fn read_config(&self, service: &str) -> Result<Option<Value>, StoreError> {
        self.0.read_config(service)
    }
    fn write_state(&self, service: &str, state: &Value) -> Result<(), StoreError> {
        self.0.write_state(service, state)
    }
    fn write_config(&self, _service: &str, _config: &Value) -> Result<(), StoreError> {
        Err(StoreError::Backend("config store unavailable".into()))
    }
}

pub(crate) fn failing_config_store(kv: Arc<dyn KeyValueStore>) -> Arc<dyn ServiceStateStore> {
    Arc::new(FailingConfig(KvServiceState::new(kv)))
}

/// Fully wired components over a temporary database.
pub(crate) struct Harness {
    _dir: TempDir,
    pub kv: Arc<dyn KeyValueStore>,
    pub topology: Arc<TopologyRegistry>,
    pub traces: TraceStore,
    pub collector: TraceCollector,
    pub states: Arc<dyn ServiceStateStore>,
    pub recovery_log: RecoveryLog,
    pub inbox: StoreInbox,
    pub probe: Arc<ScriptedProbe>,
    pub events: EventBus,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path().join("db")).unwrap();
        let kv: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        let topology = payments_topology();
        let traces = TraceStore::new(kv.clone(), TraceLog::open(&db).unwrap(), 1000);
        let collector = TraceCollector::new(
            traces.clone(),
            kv.clone(),
            topology.clone(),
            Duration::from_secs(3600),
        );
        Self {
            _dir: dir,
            kv: kv.clone(),
            topology,
            traces,
            collector,
            states: Arc::new(KvServiceState::new(kv.clone())),
            recovery_log: RecoveryLog::open(&db).unwrap(),
            inbox: StoreInbox::new(kv, 100),
            probe: Arc::new(ScriptedProbe::default()),
            events: EventBus::new(64),
        }
    }

    pub fn snapshots(&self, retention: usize) -> SnapshotManager {
        let config = SnapshotConfig {
            retention,
            ..SnapshotConfig::default()
        };
        SnapshotManager::new(
            self.kv.clone(),
            self.states.clone(),
            self.traces.clone(),
            self.topology.clone(),
            self.events.clone(),
            &config,
        )
    }

    pub fn engine(&self) -> RecoveryEngine {
        self.engine_with_states(self.states.clone())
    }

    pub fn engine_with_states(&self, states: Arc<dyn ServiceStateStore>) -> RecoveryEngine {
        let analyzer = FailureAnalyzer::new(
            self.traces.clone(),
            self.kv.clone(),
            self.topology.clone(),
            Arc::new(self.snapshots(50)),
            50,
            5,
        );
        let executor = RecoveryExecutor::new(
            self.kv.clone(),
            self.topology.clone(),
            states,
            Arc::new(self.inbox.clone()),
            self.probe.clone(),
            self.recovery_log.clone(),
            self.events.clone(),
            Duration::from_secs(3600),
            Duration::from_millis(200),
        );
        RecoveryEngine::new(analyzer, executor)
    }
}

/// API state over the payments topology with a scripted probe.
pub(crate) struct TestApp {
    _dir: TempDir,
    pub state: ApiState,
}

impl TestApp {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path().join("db")).unwrap();
        let mut config = EngineConfig::default();
        config.topology.services = payments_services();

        let adapters = Adapters {
            probe: Arc::new(ScriptedProbe::default()),
            supervisor: Arc::new(CommandSupervisor::new(None)),
            alerts: Arc::new(LogAlertSink),
        };
        let (components, _workers) = Components::build_with(config, &db, adapters).unwrap();
        Self {
            _dir: dir,
            state: Arc::new(components),
        }
    }
}
