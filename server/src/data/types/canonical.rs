//! Canonical span types
//!
//! `CanonicalAttributes` is the normalized form of one span. Feature groups
//! are stored nested; [`CanonicalAttributes::to_wire`] produces the dotted
//! `ag.*` form used for storage and transport. `SpanNode` adds the
//! cost/token/duration accumulators filled in during aggregation.

use std::ops::{Add, AddAssign};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue, json};

use super::{CANONICAL_PREFIX, SpanKind, SpanType, StatusCode, TraceType};
use crate::utils::json::{flatten, flatten_into, get_path, unflatten};

// ============================================================================
// Metric paths (relative to the metrics group)
// ============================================================================

pub mod metric_paths {
    pub const PROMPT_TOKENS: &str = "tokens.incremental.prompt";
    pub const COMPLETION_TOKENS: &str = "tokens.incremental.completion";
    pub const TOTAL_TOKENS: &str = "tokens.incremental.total";
    pub const REPORTED_COST: &str = "costs.incremental.total";
}

/// Meta paths checked, in order, for the model identifier.
pub const MODEL_META_PATHS: &[&str] = &["response.model", "request.model"];

// ============================================================================
// Canonical attributes
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SpanTypes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<TraceType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<SpanType>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExceptionRecord {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stacktrace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkRecord {
    pub trace_id: String,
    pub span_id: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalAttributes {
    pub trace_id: String,
    pub span_id: String,
    pub parent_id: Option<String>,
    pub span_kind: SpanKind,
    pub span_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status_code: StatusCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    #[serde(rename = "type")]
    pub types: SpanTypes,
    pub data: Map<String, JsonValue>,
    pub metrics: Map<String, JsonValue>,
    pub meta: Map<String, JsonValue>,
    pub refs: Map<String, JsonValue>,
    pub tags: Map<String, JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<ExceptionRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<LinkRecord>,
}

impl CanonicalAttributes {
    /// Flatten every feature group into dotted `ag.*` keys.
    pub fn to_wire(&self) -> Map<String, JsonValue> {
        let mut out = Map::new();
        if let Some(trace) = self.types.trace {
            out.insert(format!("{}type.trace", CANONICAL_PREFIX), json!(trace.as_str()));
        }
        if let Some(span) = self.types.span {
            out.insert(format!("{}type.span", CANONICAL_PREFIX), json!(span.as_str()));
        }
        for (group, values) in [
            ("data", &self.data),
            ("metrics", &self.metrics),
            ("meta", &self.meta),
            ("refs", &self.refs),
            ("tags", &self.tags),
        ] {
            for (key, value) in values {
                flatten_into(
                    &mut out,
                    &format!("{}{}.{}", CANONICAL_PREFIX, group, key),
                    value,
                );
            }
        }
        if let Some(exception) = &self.exception
            && let Ok(value) = serde_json::to_value(exception)
        {
            flatten_into(&mut out, &format!("{}exception", CANONICAL_PREFIX), &value);
        }
        for (index, link) in self.links.iter().enumerate() {
            if let Ok(value) = serde_json::to_value(link) {
                flatten_into(
                    &mut out,
                    &format!("{}links.{}", CANONICAL_PREFIX, index),
                    &value,
                );
            }
        }
        out
    }

    pub fn duration_ms(&self) -> f64 {
        let micros = (self.end_time - self.start_time)
            .num_microseconds()
            .unwrap_or(0)
            .max(0);
        micros as f64 / 1000.0
    }

    pub fn is_error(&self) -> bool {
        self.status_code == StatusCode::Error || self.exception.is_some()
    }

    /// Model identifier, response model first.
    pub fn model(&self) -> Option<&str> {
        MODEL_META_PATHS
            .iter()
            .filter_map(|path| get_path(&self.meta, path))
            .filter_map(JsonValue::as_str)
            .find(|model| !model.is_empty())
    }

    pub fn metric_u64(&self, path: &str) -> Option<u64> {
        let value = get_path(&self.metrics, path)?;
        value
            .as_u64()
            .or_else(|| value.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
    }

    pub fn metric_f64(&self, path: &str) -> Option<f64> {
        get_path(&self.metrics, path)?.as_f64()
    }
}

// ============================================================================
// Aggregation accumulators
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub prompt: u64,
    pub completion: u64,
    pub total: u64,
}

impl Add for TokenUsage {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            prompt: self.prompt.saturating_add(rhs.prompt),
            completion: self.completion.saturating_add(rhs.completion),
            total: self.total.saturating_add(rhs.total),
        }
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

/// Own contribution plus everything below it in the tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Accumulated<T> {
    pub incremental: T,
    pub cumulative: T,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpanNode {
    #[serde(flatten)]
    pub span: CanonicalAttributes,
    pub cost: Accumulated<f64>,
    pub tokens: Accumulated<TokenUsage>,
    pub duration: Accumulated<f64>,
}

impl From<CanonicalAttributes> for SpanNode {
    fn from(span: CanonicalAttributes) -> Self {
        Self {
            span,
            cost: Accumulated::default(),
            tokens: Accumulated::default(),
            duration: Accumulated::default(),
        }
    }
}

impl SpanNode {
    pub fn span_id(&self) -> &str {
        &self.span.span_id
    }

    pub fn trace_id(&self) -> &str {
        &self.span.trace_id
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.span.parent_id.as_deref()
    }

    /// Write the accumulators into the metrics group, keeping any other
    /// metrics already present.
    pub fn commit_metrics(&mut self) {
        let mut flat = flatten(&self.span.metrics);
        for (stage, cost, tokens, duration) in [
            (
                "incremental",
                self.cost.incremental,
                self.tokens.incremental,
                self.duration.incremental,
            ),
            (
                "cumulative",
                self.cost.cumulative,
                self.tokens.cumulative,
                self.duration.cumulative,
            ),
        ] {
            flat.insert(format!("costs.{}.total", stage), json!(cost));
            flat.insert(format!("tokens.{}.prompt", stage), json!(tokens.prompt));
            flat.insert(
                format!("tokens.{}.completion", stage),
                json!(tokens.completion),
            );
            flat.insert(format!("tokens.{}.total", stage), json!(tokens.total));
            flat.insert(format!("duration.{}", stage), json!(duration));
        }
        self.span.metrics = unflatten(&flat);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_span(span_id: &str, parent_id: Option<&str>) -> CanonicalAttributes {
        let start = DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default();
        CanonicalAttributes {
            trace_id: "trace-1".to_string(),
            span_id: span_id.to_string(),
            parent_id: parent_id.map(str::to_string),
            span_kind: SpanKind::Internal,
            span_name: span_id.to_string(),
            start_time: start,
            end_time: start + chrono::Duration::milliseconds(1500),
            status_code: StatusCode::Unset,
            status_message: None,
            types: SpanTypes::default(),
            data: Map::new(),
            metrics: Map::new(),
            meta: Map::new(),
            refs: Map::new(),
            tags: Map::new(),
            exception: None,
            links: Vec::new(),
        }
    }

    #[test]
    fn test_to_wire_uses_canonical_root() {
        let mut span = sample_span("s1", None);
        span.types.span = Some(SpanType::Chat);
        span.data.insert("inputs".into(), json!({"prompt": [{"role": "user"}]}));
        span.meta.insert("request".into(), json!({"top_k": 5}));
        span.links.push(LinkRecord {
            trace_id: "t2".into(),
            span_id: "s9".into(),
            attributes: Map::new(),
        });

        let wire = span.to_wire();
        assert_eq!(wire.get("ag.type.span"), Some(&json!("chat")));
        assert_eq!(wire.get("ag.data.inputs.prompt.0.role"), Some(&json!("user")));
        assert_eq!(wire.get("ag.meta.request.top_k"), Some(&json!(5)));
        assert_eq!(wire.get("ag.links.0.span_id"), Some(&json!("s9")));
        assert!(wire.keys().all(|k| k.starts_with("ag.")));
    }

    #[test]
    fn test_model_prefers_response() {
        let mut span = sample_span("s1", None);
        span.meta.insert(
            "request".into(),
            json!({"model": "gpt-4"}),
        );
        assert_eq!(span.model(), Some("gpt-4"));
        span.meta.insert(
            "response".into(),
            json!({"model": "gpt-4-0613"}),
        );
        assert_eq!(span.model(), Some("gpt-4-0613"));
    }

    #[test]
    fn test_duration_ms() {
        assert_eq!(sample_span("s1", None).duration_ms(), 1500.0);
    }

    #[test]
    fn test_commit_metrics_keeps_existing_keys() {
        let mut span = sample_span("s1", None);
        span.metrics.insert("custom".into(), json!({"score": 0.5}));
        let mut node = SpanNode::from(span);
        node.cost = Accumulated {
            incremental: 0.25,
            cumulative: 0.75,
        };
        node.tokens.incremental = TokenUsage {
            prompt: 2,
            completion: 1,
            total: 3,
        };
        node.commit_metrics();

        let metrics = &node.span.metrics;
        assert_eq!(get_path(metrics, "custom.score"), Some(&json!(0.5)));
        assert_eq!(get_path(metrics, "costs.cumulative.total"), Some(&json!(0.75)));
        assert_eq!(get_path(metrics, "tokens.incremental.total"), Some(&json!(3)));
    }

    #[test]
    fn test_token_usage_add() {
        let a = TokenUsage {
            prompt: 1,
            completion: 2,
            total: 3,
        };
        let mut b = a;
        b += a;
        assert_eq!(b, a + a);
        assert_eq!(b.total, 6);
    }
}
