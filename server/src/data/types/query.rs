//! Query request and result types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use super::{SpanNode, TokenUsage};
use crate::utils::time::deserialize_opt_timestamp;

// ============================================================================
// Request
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryRequest {
    /// Filter expression, validated before it reaches storage
    #[serde(default)]
    pub filter: Option<JsonValue>,
    #[serde(default)]
    pub grouping: Grouping,
    #[serde(default)]
    pub windowing: Windowing,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Grouping {
    #[serde(default)]
    pub focus: Focus,
}

/// Result shape. Anything other than `node` yields trace forests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Focus {
    #[default]
    #[serde(alias = "span")]
    Node,
    #[serde(other)]
    Trace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

/// Time window, sampling and bucketing parameters.
///
/// `oldest` is inclusive and `newest` exclusive. `interval` is the bucket
/// width in minutes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Windowing {
    #[serde(default, deserialize_with = "deserialize_opt_timestamp")]
    pub newest: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_opt_timestamp")]
    pub oldest: Option<DateTime<Utc>>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub order: Option<SortOrder>,
    #[serde(default)]
    pub interval: Option<i64>,
    #[serde(default)]
    pub rate: Option<f64>,
    #[serde(default)]
    pub timezone: Option<String>,
}

// ============================================================================
// Results
// ============================================================================

/// Root-level view of one trace: root span id to hydrated subtree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceView {
    pub trace_id: String,
    pub roots: Map<String, JsonValue>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "focus", content = "items", rename_all = "lowercase")]
pub enum QueryOutput {
    Node(Vec<SpanNode>),
    Trace(Vec<TraceView>),
}

impl QueryOutput {
    pub fn len(&self) -> usize {
        match self {
            Self::Node(spans) => spans.len(),
            Self::Trace(traces) => traces.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One analytics row: counters over spans starting in
/// `[timestamp, timestamp + interval)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bucket {
    pub timestamp: DateTime<Utc>,
    pub interval_minutes: i64,
    pub count: u64,
    pub error_count: u64,
    pub cost: f64,
    pub tokens: TokenUsage,
    pub duration_ms: f64,
    pub avg_duration_ms: f64,
}

impl Bucket {
    pub fn empty(timestamp: DateTime<Utc>, interval_minutes: i64) -> Self {
        Self {
            timestamp,
            interval_minutes,
            count: 0,
            error_count: 0,
            cost: 0.0,
            tokens: TokenUsage::default(),
            duration_ms: 0.0,
            avg_duration_ms: 0.0,
        }
    }

    /// Add one span's own (incremental) contribution.
    pub fn record(&mut self, node: &SpanNode) {
        self.count += 1;
        if node.span.is_error() {
            self.error_count += 1;
        }
        self.cost += node.cost.incremental;
        self.tokens += node.tokens.incremental;
        self.duration_ms += node.duration.incremental;
        self.avg_duration_ms = self.duration_ms / self.count as f64;
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}
