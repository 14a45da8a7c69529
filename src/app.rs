//! Component wiring
//!
//! Builds every engine component from an [`EngineConfig`] and an open sled
//! database. The binary spawns the returned [`BackgroundWorkers`]; tests use
//! [`Components::build_with`] to inject their own probe and supervisor.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tracing::info;

use crate::collector::{IngestWriter, TraceCollector, TraceIngest};
use crate::config::{defaults, EngineConfig};
use crate::events::{EngineEvent, EventBus, EventJournal};
use crate::monitor::{
    AlertError, AlertSink, CommandSupervisor, Healers, HealthMonitor, HttpProbe, LivenessProbe,
    LogAlertSink, RestartSupervisor, WebhookAlertSink,
};
use crate::recovery::{FailureAnalyzer, RecoveryEngine, RecoveryExecutor, StoreInbox};
use crate::snapshot::SnapshotManager;
use crate::storage::{
    InMemoryStore, KeyValueStore, KvServiceState, RecoveryLog, ServiceStateStore, StorageError,
    TraceLog, TraceStore,
};
use crate::topology::TopologyRegistry;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Alert(#[from] AlertError),
}

/// External collaborators of the heal pipeline.
pub struct Adapters {
    pub probe: Arc<dyn LivenessProbe>,
    pub supervisor: Arc<dyn RestartSupervisor>,
    pub alerts: Arc<dyn AlertSink>,
}

impl Adapters {
    /// HTTP probe, command supervisor and webhook (or log) alerts from config.
    pub fn from_config(config: &EngineConfig) -> Result<Self, BuildError> {
        let probe = HttpProbe::new(config.monitor.probe_timeout())?;
        let alerts: Arc<dyn AlertSink> = match &config.alerts.webhook_url {
            Some(url) => Arc::new(WebhookAlertSink::new(url)?),
            None => Arc::new(LogAlertSink),
        };
        Ok(Self {
            probe: Arc::new(probe),
            supervisor: Arc::new(CommandSupervisor::new(
                config.supervisor.restart_command.clone(),
            )),
            alerts,
        })
    }
}

/// Shared handles to every component.
pub struct Components {
    pub config: Arc<EngineConfig>,
    pub kv: Arc<dyn KeyValueStore>,
    pub topology: Arc<TopologyRegistry>,
    pub events: EventBus,
    pub collector: TraceCollector,
    pub ingest: TraceIngest,
    pub states: Arc<dyn ServiceStateStore>,
    pub snapshots: Arc<SnapshotManager>,
    pub engine: Arc<RecoveryEngine>,
    pub monitor: Arc<HealthMonitor>,
    pub inbox: StoreInbox,
    pub journal: EventJournal,
    pub started_at: Instant,
}

/// Tasks the caller must spawn.
pub struct BackgroundWorkers {
    pub ingest_writer: IngestWriter,
    /// Subscribed at build time so no event is missed before the journal runs
    pub journal_rx: broadcast::Receiver<EngineEvent>,
}

impl Components {
    pub fn build(
        config: EngineConfig,
        db: &sled::Db,
    ) -> Result<(Self, BackgroundWorkers), BuildError> {
        let adapters = Adapters::from_config(&config)?;
        Self::build_with(config, db, adapters)
    }

    pub fn build_with(
        config: EngineConfig,
        db: &sled::Db,
        adapters: Adapters,
    ) -> Result<(Self, BackgroundWorkers), BuildError> {
        let config = Arc::new(config);
        let storage = &config.storage;

        let kv: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        let topology = Arc::new(TopologyRegistry::from_config(&config.topology));
        let events = EventBus::default();
        let journal = EventJournal::new(kv.clone(), storage.event_journal_capacity);
        let journal_rx = events.subscribe();

        let traces = TraceStore::new(
            kv.clone(),
            TraceLog::open(db)?,
            storage.trace_cache_capacity,
        );
        let collector = TraceCollector::new(
            traces.clone(),
            kv.clone(),
            topology.clone(),
            storage.awareness_ttl(),
        );
        let (ingest, ingest_writer) =
            TraceIngest::channel(collector.clone(), storage.ingest_queue_capacity);

        let states: Arc<dyn ServiceStateStore> = Arc::new(KvServiceState::new(kv.clone()));
        let snapshots = Arc::new(SnapshotManager::new(
            kv.clone(),
            states.clone(),
            traces.clone(),
            topology.clone(),
            events.clone(),
            &config.snapshot,
        ));

        let inbox = StoreInbox::new(kv.clone(), storage.inbox_capacity);
        let analyzer = FailureAnalyzer::new(
            traces,
            kv.clone(),
            topology.clone(),
            snapshots.clone(),
            config.analysis.sample_size,
            defaults::REPLAY_OPERATIONS,
        );
        let executor = RecoveryExecutor::new(
            kv.clone(),
            topology.clone(),
            states.clone(),
            Arc::new(inbox.clone()),
            adapters.probe.clone(),
            RecoveryLog::open(db)?,
            events.clone(),
            storage.cache_ttl(),
            config.monitor.probe_timeout(),
        );
        let engine = Arc::new(RecoveryEngine::new(analyzer, executor));

        let monitor = Arc::new(HealthMonitor::new(
            topology.clone(),
            adapters.probe,
            Healers {
                engine: engine.clone(),
                supervisor: adapters.supervisor,
                alerts: adapters.alerts,
            },
            kv.clone(),
            events.clone(),
            config.monitor.clone(),
            storage.critical_issue_capacity,
        ));

        info!(
            services = topology.len(),
            backend = kv.backend_name(),
            "Engine components built"
        );

        let components = Self {
            config,
            kv,
            topology,
            events,
            collector,
            ingest,
            states,
            snapshots,
            engine,
            monitor,
            inbox,
            journal,
            started_at: Instant::now(),
        };
        Ok((
            components,
            BackgroundWorkers {
                ingest_writer,
                journal_rx,
            },
        ))
    }
}
