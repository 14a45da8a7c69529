//! Liveness probing
//!
//! The same probe serves the polling loop and the recovery executor's
//! `verify_health` step.

use async_trait::async_trait;
use std::time::{Duration, Instant};

use crate::topology::ServiceEntry;

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("service unreachable: {0}")]
    Unreachable(String),
    #[error("liveness endpoint returned status {0}")]
    Unhealthy(u16),
}

/// Checks whether a service is alive. Returns the observed latency.
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    async fn probe(&self, service: &str, entry: &ServiceEntry) -> Result<Duration, ProbeError>;
}

/// Bound any probe by `timeout` so a hanging service can't stall the caller.
pub async fn probe_with_timeout(
    probe: &dyn LivenessProbe,
    service: &str,
    entry: &ServiceEntry,
    timeout: Duration,
) -> Result<Duration, ProbeError> {
    match tokio::time::timeout(timeout, probe.probe(service, entry)).await {
        Ok(result) => result,
        Err(_) => Err(ProbeError::Timeout(timeout)),
    }
}

/// `GET {address}{health_path}`; any 2xx is alive.
#[derive(Clone)]
pub struct HttpProbe {
    http: reqwest::Client,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, timeout })
    }
}

#[async_trait]
impl LivenessProbe for HttpProbe {
    async fn probe(&self, _service: &str, entry: &ServiceEntry) -> Result<Duration, ProbeError> {
        let started = Instant::now();
        let resp = self.http.get(entry.health_url()).send().await.map_err(|e| {
            if e.is_timeout() {
                ProbeError::Timeout(self.timeout)
            } else {
                ProbeError::Unreachable(e.to_string())
            }
        })?;

        let status = resp.status();
        if status.is_success() {
            Ok(started.elapsed())
        } else {
            Err(ProbeError::Unhealthy(status.as_u16()))
        }
    }
}
