//! Raw span envelope, as received from producers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use super::{SpanKind, StatusCode};
use crate::utils::time::{deserialize_opt_timestamp, deserialize_timestamp};

/// Vendor-neutral span envelope. Attribute keys may follow any supported
/// vocabulary, or the canonical `ag.*` one directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSpan {
    pub trace_id: String,
    pub span_id: String,
    #[serde(default, alias = "parent_span_id")]
    pub parent_id: Option<String>,
    #[serde(default, alias = "kind")]
    pub span_kind: SpanKind,
    #[serde(alias = "name")]
    pub span_name: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub start_time: DateTime<Utc>,
    #[serde(default, deserialize_with = "deserialize_opt_timestamp")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status_code: StatusCode,
    #[serde(default)]
    pub status_message: Option<String>,
    #[serde(default)]
    pub attributes: Map<String, JsonValue>,
    #[serde(default)]
    pub events: Vec<RawEvent>,
    #[serde(default)]
    pub links: Vec<RawLink>,
}

impl RawSpan {
    /// Parent id with empty strings treated as absent.
    pub fn parent(&self) -> Option<&str> {
        self.parent_id.as_deref().filter(|p| !p.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_opt_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attributes: Map<String, JsonValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawLink {
    pub trace_id: String,
    pub span_id: String,
    #[serde(default)]
    pub attributes: Map<String, JsonValue>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_raw_span_minimal() {
        let span: RawSpan = serde_json::from_value(json!({
            "trace_id": "t1",
            "span_id": "s1",
            "name": "root",
            "start_time": 1_700_000_000_000_000_000u64
        }))
        .unwrap();
        assert_eq!(span.span_kind, SpanKind::Internal);
        assert_eq!(span.status_code, StatusCode::Unset);
        assert!(span.end_time.is_none());
        assert!(span.parent().is_none());
    }

    #[test]
    fn test_raw_span_empty_parent_is_absent() {
        let span: RawSpan = serde_json::from_value(json!({
            "trace_id": "t1",
            "span_id": "s1",
            "parent_span_id": "",
            "span_name": "root",
            "span_kind": "SPAN_KIND_SERVER",
            "status_code": "STATUS_CODE_ERROR",
            "start_time": "2024-01-01T00:00:00Z",
            "end_time": "2024-01-01T00:00:01"
        }))
        .unwrap();
        assert!(span.parent().is_none());
        assert_eq!(span.span_kind, SpanKind::Server);
        assert_eq!(span.status_code, StatusCode::Error);
        assert!(span.end_time.is_some());
    }

    #[test]
    fn test_raw_span_rejects_bad_timestamp() {
        let result: Result<RawSpan, _> = serde_json::from_value(json!({
            "trace_id": "t1",
            "span_id": "s1",
            "name": "root",
            "start_time": "yesterday"
        }));
        assert!(result.is_err());
    }
}
