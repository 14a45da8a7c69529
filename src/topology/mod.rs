//! Topology Registry
//!
//! Static service mesh map: `service → {address, health path, neighbors,
//! critical, container}`. Loaded once at startup from the `[topology]`
//! config section and read-only afterwards. Neighbor lists scope awareness
//! propagation; the critical flag decides whether an escalation raises an
//! external alert.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One registered service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEntry {
    /// Base URL, e.g. `http://localhost:4004`
    pub address: String,
    /// Liveness path appended to `address`
    #[serde(default = "default_health_path")]
    pub health_path: String,
    /// Topologically adjacent services
    #[serde(default)]
    pub neighbors: Vec<String>,
    /// Critical services raise alerts when escalated
    #[serde(default)]
    pub critical: bool,
    /// Supervisor name for the restart contract (defaults to the service name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
}

fn default_health_path() -> String {
    "/health".to_string()
}

impl ServiceEntry {
    pub fn new(address: impl Into<String>, neighbors: &[&str], critical: bool) -> Self {
        Self {
            address: address.into(),
            health_path: default_health_path(),
            neighbors: neighbors.iter().map(|n| (*n).to_string()).collect(),
            critical,
            container: None,
        }
    }

    /// Full liveness URL.
    pub fn health_url(&self) -> String {
        let base = self.address.trim_end_matches('/');
        if self.health_path.starts_with('/') {
            format!("{}{}", base, self.health_path)
        } else {
            format!("{}/{}", base, self.health_path)
        }
    }
}

/// `[topology]` config section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyConfig {
    #[serde(default)]
    pub services: BTreeMap<String, ServiceEntry>,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self::reference_mesh()
    }
}

/// name, port, neighbors, critical
const REFERENCE_MESH: &[(&str, u16, &[&str], bool)] = &[
    ("auth", 4004, &["ai-orchestrator", "onboarding", "security-core"], true),
    ("ai-orchestrator", 4001, &["auth", "conversation", "hr-ai-deputy", "analytics"], true),
    ("onboarding", 4070, &["auth", "compliance", "ai-orchestrator"], false),
    ("compliance", 4081, &["onboarding", "document-vault", "security-core"], true),
    ("hr-ai-deputy", 4091, &["ai-orchestrator", "auth", "onboarding"], true),
    ("coin", 4092, &["auth", "blockchain", "payment"], true),
    ("conversation", 4011, &["ai-orchestrator", "auth"], false),
    ("security-core", 4022, &["auth", "compliance", "document-vault"], true),
    ("document-vault", 4087, &["compliance", "security-core"], false),
    ("analytics", 4080, &["ai-orchestrator"], false),
    ("payment", 4050, &["coin", "blockchain", "auth"], true),
];

impl TopologyConfig {
    /// The twelve-service mesh used when no topology is configured.
    pub fn reference_mesh() -> Self {
        let local = |port: u16| format!("http://localhost:{port}");
        let mut services = BTreeMap::new();

        for (name, port, neighbors, critical) in REFERENCE_MESH {
            services.insert(
                (*name).to_string(),
                ServiceEntry::new(local(*port), neighbors, *critical),
            );
        }

        let mut blockchain = ServiceEntry::new(local(8545), &["coin", "payment"], true);
        blockchain.health_path = "/".to_string();
        services.insert("blockchain".into(), blockchain);

        Self { services }
    }
}

/// Read-only registry handed to every component.
#[derive(Debug, Clone)]
pub struct TopologyRegistry {
    services: BTreeMap<String, ServiceEntry>,
}

impl TopologyRegistry {
    pub fn new(services: BTreeMap<String, ServiceEntry>) -> Self {
        Self { services }
    }

    pub fn from_config(config: &TopologyConfig) -> Self {
        Self::new(config.services.clone())
    }

    pub fn get(&self, service: &str) -> Option<&ServiceEntry> {
        self.services.get(service)
    }

    pub fn contains(&self, service: &str) -> bool {
        self.services.contains_key(service)
    }

    /// Neighbors of `service`; empty for unknown services.
    pub fn neighbors(&self, service: &str) -> &[String] {
        self.services
            .get(service)
            .map(|e| e.neighbors.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_critical(&self, service: &str) -> bool {
        self.services.get(service).is_some_and(|e| e.critical)
    }

    /// Registered service names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ServiceEntry)> {
        self.services.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
