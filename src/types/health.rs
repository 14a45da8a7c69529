//! Per-service health tracking and escalation records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Liveness state of a monitored service.
///
/// `Unknown` only before the first probe; afterwards the service moves
/// between `Healthy` and `Down`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    #[default]
    Unknown,
    Healthy,
    Down,
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceState::Unknown => write!(f, "UNKNOWN"),
            ServiceState::Healthy => write!(f, "HEALTHY"),
            ServiceState::Down => write!(f, "DOWN"),
        }
    }
}

/// Health status of one service. Mutated only by the health monitor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: ServiceState,
    pub last_check: Option<DateTime<Utc>>,
    /// Reset to 0 on any successful probe
    pub consecutive_failures: u32,
    /// Times the service came back from `Down`
    pub recoveries: u32,
    /// Latency of the last successful probe
    pub last_latency_ms: Option<u64>,
}

/// An issue the heal pipeline could not resolve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriticalIssue {
    pub service: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    /// Whether the topology flags the service critical (alert raised)
    pub critical: bool,
}

/// How the monitor brought a service back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealMethod {
    GuidedRecovery,
    SupervisorRestart,
}

impl std::fmt::Display for HealMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealMethod::GuidedRecovery => write!(f, "guided_recovery"),
            HealMethod::SupervisorRestart => write!(f, "supervisor_restart"),
        }
    }
}

/// Entry in the `healings` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealingRecord {
    pub service: String,
    pub method: HealMethod,
    pub timestamp: DateTime<Utc>,
}

/// Entry in the `recoveries` list: a service that came back on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryNotice {
    pub service: String,
    pub timestamp: DateTime<Utc>,
    /// Failed probes before it came back
    pub failures_before: u32,
}
