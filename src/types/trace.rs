//! Trace records and neighbor awareness.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

fn default_status_code() -> u16 {
    200
}

/// One span reported by an instrumented service.
///
/// Never mutated after creation. `span_id` is always generated by the
/// collector; `trace_id` groups a causally related call chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub trace_id: String,
    pub span_id: String,
    #[serde(default)]
    pub parent_span_id: Option<String>,
    pub service_name: String,
    pub operation: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default = "default_status_code")]
    pub status_code: u16,
    #[serde(default = "empty_object")]
    pub request: Value,
    #[serde(default = "empty_object")]
    pub response: Value,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default = "empty_object")]
    pub metadata: Value,
    /// Neighbors this span called out to
    #[serde(default)]
    pub neighbors_invoked: Vec<String>,
}

impl TraceRecord {
    /// Status below 400.
    pub fn is_success(&self) -> bool {
        self.status_code < 400
    }
}

/// Body of `POST /api/trace`: a trace record without `span_id`.
///
/// `service_name` and `operation` are required; everything else has the
/// same defaults as [`TraceRecord`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceInput {
    #[serde(default)]
    pub trace_id: Option<String>,
    #[serde(default)]
    pub parent_span_id: Option<String>,
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub operation: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub request: Option<Value>,
    #[serde(default)]
    pub response: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub neighbors_invoked: Vec<String>,
}

impl TraceInput {
    pub fn new(service_name: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            operation: operation.into(),
            ..Self::default()
        }
    }

    /// Materialize a record with the given generated ids.
    pub fn into_record(self, trace_id: String, span_id: String) -> TraceRecord {
        TraceRecord {
            trace_id: self.trace_id.filter(|t| !t.trim().is_empty()).unwrap_or(trace_id),
            span_id,
            parent_span_id: self.parent_span_id,
            service_name: self.service_name,
            operation: self.operation,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            duration_ms: self.duration_ms,
            status_code: self.status_code.unwrap_or_else(default_status_code),
            request: self.request.unwrap_or_else(empty_object),
            response: self.response.unwrap_or_else(empty_object),
            error: self.error,
            metadata: self.metadata.unwrap_or_else(empty_object),
            neighbors_invoked: self.neighbors_invoked,
        }
    }
}

/// Last observed interaction of `observed` as seen by `observer`.
///
/// Stored under `awareness:{observer}:{observed}` with a TTL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborAwareness {
    pub last_seen: DateTime<Utc>,
    pub last_operation: String,
    pub last_status: u16,
    pub trace_id: String,
}

impl NeighborAwareness {
    pub fn from_trace(trace: &TraceRecord) -> Self {
        Self {
            last_seen: trace.timestamp,
            last_operation: trace.operation.clone(),
            last_status: trace.status_code,
            trace_id: trace.trace_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_defaults_fill_record() {
        let record = TraceInput::new("payments", "charge").into_record("t-1".into(), "s-1".into());
        assert_eq!(record.trace_id, "t-1");
        assert_eq!(record.status_code, 200);
        assert_eq!(record.duration_ms, 0);
        assert!(record.request.is_object());
        assert!(record.metadata.is_object());
        assert!(record.is_success());
    }

    #[test]
    fn test_supplied_trace_id_wins() {
        let mut input = TraceInput::new("payments", "charge");
        input.trace_id = Some("caller-trace".into());
        let record = input.into_record("generated".into(), "s-1".into());
        assert_eq!(record.trace_id, "caller-trace");
    }

    #[test]
    fn test_input_parses_minimal_json() {
        let json = r#"{"service_name":"ledger","operation":"post","status_code":503}"#;
        let input: TraceInput = serde_json::from_str(json).unwrap();
        let record = input.into_record("t".into(), "s".into());
        assert_eq!(record.status_code, 503);
        assert!(!record.is_success());
    }
}
