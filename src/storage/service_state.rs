//! Declared service state and configuration
//!
//! Services publish their current state and configuration here; the
//! snapshot manager reads them and the recovery executor writes them back.

use serde_json::Value;
use std::sync::Arc;

use super::kv::{keys, KeyValueStore, StoreError};

/// Read/write access to a service's declared state and configuration.
pub trait ServiceStateStore: Send + Sync {
    fn read_state(&self, service: &str) -> Result<Option<Value>, StoreError>;
    fn read_config(&self, service: &str) -> Result<Option<Value>, StoreError>;
    fn write_state(&self, service: &str, state: &Value) -> Result<(), StoreError>;
    fn write_config(&self, service: &str, config: &Value) -> Result<(), StoreError>;
}

/// Stores state under `service:{name}:state` and config under
/// `service:{name}:config` in the shared fast store.
#[derive(Clone)]
pub struct KvServiceState {
    kv: Arc<dyn KeyValueStore>,
}

impl KvServiceState {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }
}

impl ServiceStateStore for KvServiceState {
    fn read_state(&self, service: &str) -> Result<Option<Value>, StoreError> {
        self.kv.get(&keys::service_state(service))
    }

    fn read_config(&self, service: &str) -> Result<Option<Value>, StoreError> {
        self.kv.get(&keys::service_config(service))
    }

    fn write_state(&self, service: &str, state: &Value) -> Result<(), StoreError> {
        self.kv.set(&keys::service_state(service), state.clone(), None)
    }

    fn write_config(&self, service: &str, config: &Value) -> Result<(), StoreError> {
        self.kv.set(&keys::service_config(service), config.clone(), None)
    }
}
