//! Engine Configuration - every tunable of the collector, monitor and recovery engine
//!
//! Each section implements `Default` with the values in [`super::defaults`],
//! so a missing file or a partial file behaves exactly like the built-ins.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::defaults;
use crate::topology::TopologyConfig;

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "MESH_HEALER_CONFIG";

/// Config file picked up from the working directory when nothing else is set.
pub const LOCAL_CONFIG_FILE: &str = "mesh_healer.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration.
///
/// Load with `EngineConfig::load()` which searches:
/// 1. an explicit path (the `--config` flag)
/// 2. `$MESH_HEALER_CONFIG`
/// 3. `./mesh_healer.toml`
/// 4. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub snapshot: SnapshotConfig,

    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub analysis: AnalysisConfig,

    #[serde(default)]
    pub supervisor: SupervisorConfig,

    #[serde(default)]
    pub alerts: AlertConfig,

    /// Service mesh registry
    #[serde(default)]
    pub topology: TopologyConfig,
}

/// Where the effective configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Defaults,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::File(path) => write!(f, "{}", path.display()),
            ConfigSource::Defaults => write!(f, "built-in defaults"),
        }
    }
}

impl EngineConfig {
    /// Load configuration using the standard search order, then apply
    /// environment overrides.
    ///
    /// An explicit path that fails to load is an error. A broken file found
    /// through the env var or the working directory is logged and skipped.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, ConfigSource), ConfigError> {
        if let Some(path) = explicit {
            let mut config = Self::load_from_file(path)?;
            config.apply_env_overrides();
            info!(path = %path.display(), "Loaded engine config");
            return Ok((config, ConfigSource::File(path.to_path_buf())));
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(mut config) => {
                        config.apply_env_overrides();
                        info!(path = %p.display(), "Loaded engine config from {}", CONFIG_ENV_VAR);
                        return Ok((config, ConfigSource::File(p)));
                    }
                    Err(e) => {
                        warn!(
                            path = %p.display(),
                            error = %e,
                            "Failed to load config from {}, falling back",
                            CONFIG_ENV_VAR
                        );
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(mut config) => {
                    config.apply_env_overrides();
                    info!("Loaded engine config from ./{}", LOCAL_CONFIG_FILE);
                    return Ok((config, ConfigSource::File(local)));
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        info!("No {} found, using built-in defaults", LOCAL_CONFIG_FILE);
        let mut config = Self::default();
        config.apply_env_overrides();
        Ok((config, ConfigSource::Defaults))
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config = Self::from_toml(&contents)
            .map_err(|e| match e {
                ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
                other => other,
            })?;
        Ok(config)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Apply `MESH_HEALER_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("MESH_HEALER_ADDR") {
            if !addr.is_empty() {
                self.server.addr = addr;
            }
        }
        if let Ok(dir) = std::env::var("MESH_HEALER_DATA_DIR") {
            if !dir.is_empty() {
                self.storage.data_dir = PathBuf::from(dir);
            }
        }
        if let Ok(origins) = std::env::var("MESH_HEALER_CORS_ORIGINS") {
            self.server.cors_origins = origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }
        if let Ok(url) = std::env::var("MESH_HEALER_ALERT_WEBHOOK") {
            if !url.is_empty() {
                self.alerts.webhook_url = Some(url);
            }
        }
    }

    /// Validate all settings for internal consistency.
    ///
    /// Collects every problem instead of stopping at the first one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if self.server.addr.trim().is_empty() {
            errors.push("server.addr must not be empty".to_string());
        }

        let s = &self.storage;
        Self::check_positive(
            s.trace_cache_capacity as u64,
            "storage.trace_cache_capacity",
            &mut errors,
        );
        Self::check_positive(
            s.ingest_queue_capacity as u64,
            "storage.ingest_queue_capacity",
            &mut errors,
        );
        Self::check_positive(s.awareness_ttl_secs, "storage.awareness_ttl_secs", &mut errors);
        Self::check_positive(s.cache_ttl_secs, "storage.cache_ttl_secs", &mut errors);
        Self::check_positive(s.inbox_capacity as u64, "storage.inbox_capacity", &mut errors);
        Self::check_positive(s.sweep_interval_secs, "storage.sweep_interval_secs", &mut errors);

        let snap = &self.snapshot;
        Self::check_positive(snap.interval_secs, "snapshot.interval_secs", &mut errors);
        Self::check_positive(snap.retention as u64, "snapshot.retention", &mut errors);
        Self::check_positive(snap.ttl_secs, "snapshot.ttl_secs", &mut errors);

        let m = &self.monitor;
        Self::check_positive(m.poll_interval_secs, "monitor.poll_interval_secs", &mut errors);
        Self::check_positive(m.probe_timeout_secs, "monitor.probe_timeout_secs", &mut errors);
        Self::check_positive(
            u64::from(m.failure_threshold),
            "monitor.failure_threshold",
            &mut errors,
        );
        if m.probe_timeout_secs >= m.poll_interval_secs && m.poll_interval_secs > 0 {
            errors.push(format!(
                "monitor.probe_timeout_secs ({}) must be less than poll_interval_secs ({})",
                m.probe_timeout_secs, m.poll_interval_secs
            ));
        }

        let a = &self.analysis;
        Self::check_positive(a.sample_size as u64, "analysis.sample_size", &mut errors);

        if let Some(cmd) = &self.supervisor.restart_command {
            if cmd.is_empty() || cmd[0].trim().is_empty() {
                errors.push("supervisor.restart_command must name a program".to_string());
            }
        }

        if self.topology.services.is_empty() {
            errors.push("topology.services must register at least one service".to_string());
        }
        for (name, entry) in &self.topology.services {
            if entry.address.trim().is_empty() {
                errors.push(format!("topology.services.{name}.address must not be empty"));
            }
            for neighbor in &entry.neighbors {
                if neighbor == name {
                    errors.push(format!("topology.services.{name} lists itself as a neighbor"));
                } else if !self.topology.services.contains_key(neighbor) {
                    warn!(
                        service = %name,
                        neighbor = %neighbor,
                        "Neighbor is not registered in the topology"
                    );
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    fn check_positive(value: u64, name: &str, errors: &mut Vec<String>) {
        if value == 0 {
            errors.push(format!("{name} must be > 0"));
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config I/O error ({path}): {err}", path = .0.display(), err = .1)]
    Io(PathBuf, std::io::Error),
    #[error("Config parse error ({path}): {err}", path = .0.display(), err = .1)]
    Parse(PathBuf, toml::de::Error),
    #[error("Config serialization error: {0}")]
    Serialize(toml::ser::Error),
    #[error("Config validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
}

// ============================================================================
// Sections
// ============================================================================

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub addr: String,
    /// Allowed CORS origins (empty = same-origin only)
    pub cors_origins: Vec<String>,
    /// Maximum request body in bytes
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: defaults::SERVER_ADDR.to_string(),
            cors_origins: Vec::new(),
            max_body_bytes: defaults::MAX_BODY_BYTES,
        }
    }
}

/// Storage and retention configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the durable sled database
    pub data_dir: PathBuf,
    /// Per-service fast-store trace cap
    pub trace_cache_capacity: usize,
    pub awareness_ttl_secs: u64,
    pub cache_ttl_secs: u64,
    pub ingest_queue_capacity: usize,
    pub inbox_capacity: usize,
    pub critical_issue_capacity: usize,
    pub event_journal_capacity: usize,
    pub sweep_interval_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(defaults::DATA_DIR),
            trace_cache_capacity: defaults::TRACE_CACHE_CAPACITY,
            awareness_ttl_secs: defaults::AWARENESS_TTL_SECS,
            cache_ttl_secs: defaults::CACHE_TTL_SECS,
            ingest_queue_capacity: defaults::INGEST_QUEUE_CAPACITY,
            inbox_capacity: defaults::INBOX_CAPACITY,
            critical_issue_capacity: defaults::CRITICAL_ISSUE_CAPACITY,
            event_journal_capacity: defaults::EVENT_JOURNAL_CAPACITY,
            sweep_interval_secs: defaults::STORE_SWEEP_INTERVAL_SECS,
        }
    }
}

impl StorageConfig {
    pub fn awareness_ttl(&self) -> Duration {
        Duration::from_secs(self.awareness_ttl_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Path of the sled database inside the data directory.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("mesh_healer.db")
    }
}

/// Snapshot scheduling and retention
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    /// Ring buffer size per service
    pub retention: usize,
    /// Traces embedded per snapshot
    pub recent_traces: usize,
    pub ttl_secs: u64,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: defaults::SNAPSHOT_INTERVAL_SECS,
            retention: defaults::SNAPSHOT_RETENTION,
            recent_traces: defaults::SNAPSHOT_RECENT_TRACES,
            ttl_secs: defaults::SNAPSHOT_TTL_SECS,
        }
    }
}

impl SnapshotConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Health monitor cadence and escalation thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub enabled: bool,
    pub poll_interval_secs: u64,
    pub probe_timeout_secs: u64,
    pub failure_threshold: u32,
    pub restart_grace_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: defaults::POLL_INTERVAL_SECS,
            probe_timeout_secs: defaults::PROBE_TIMEOUT_SECS,
            failure_threshold: defaults::FAILURE_THRESHOLD,
            restart_grace_secs: defaults::RESTART_GRACE_SECS,
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn restart_grace(&self) -> Duration {
        Duration::from_secs(self.restart_grace_secs)
    }
}

/// Failure analysis sampling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Durable-log interactions sampled per analysis
    pub sample_size: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sample_size: defaults::ANALYSIS_SAMPLE_SIZE,
        }
    }
}

/// External supervisor restart contract
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Program and arguments; `{container}` and `{service}` are substituted.
    /// Unset means no supervisor is available and failed recoveries escalate.
    pub restart_command: Option<Vec<String>>,
}

/// Critical alert delivery
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// JSON webhook receiving critical alerts; alerts are only logged when unset
    pub webhook_url: Option<String>,
}
