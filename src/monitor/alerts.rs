//! Critical alerts
//!
//! Raised when a critical service escalates. Without a webhook the alert
//! is only logged.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub service: String,
    pub severity: &'static str,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn critical(service: &str, message: impl Into<String>) -> Self {
        Self {
            service: service.to_string(),
            severity: "critical",
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Webhook returned status {0}")]
    Status(reqwest::StatusCode),
}

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn raise(&self, alert: &Alert) -> Result<(), AlertError>;
}

/// Logs alerts at error level.
#[derive(Debug, Clone, Default)]
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn raise(&self, alert: &Alert) -> Result<(), AlertError> {
        tracing::error!(
            service = %alert.service,
            severity = alert.severity,
            message = %alert.message,
            "CRITICAL ALERT"
        );
        Ok(())
    }
}

/// POSTs the alert as JSON and logs it.
#[derive(Clone)]
pub struct WebhookAlertSink {
    http: reqwest::Client,
    url: String,
}

impl WebhookAlertSink {
    pub fn new(url: &str) -> Result<Self, AlertError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl AlertSink for WebhookAlertSink {
    async fn raise(&self, alert: &Alert) -> Result<(), AlertError> {
        LogAlertSink.raise(alert).await?;
        let resp = self.http.post(&self.url).json(alert).send().await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(AlertError::Status(resp.status()))
        }
    }
}
