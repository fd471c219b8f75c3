//! Classification enums for span data
//!
//! Wire spellings follow OTLP conventions; every variant also accepts the
//! protobuf enum name (`SPAN_KIND_CLIENT`) and the short upper-case form.

use serde::{Deserialize, Serialize};

// ============================================================================
// STRUCTURAL ENUMS
// ============================================================================

/// OTLP span kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SpanKind {
    #[default]
    #[serde(
        alias = "INTERNAL",
        alias = "SPAN_KIND_INTERNAL",
        alias = "unspecified",
        alias = "UNSPECIFIED",
        alias = "SPAN_KIND_UNSPECIFIED"
    )]
    Internal,
    #[serde(alias = "SERVER", alias = "SPAN_KIND_SERVER")]
    Server,
    #[serde(alias = "CLIENT", alias = "SPAN_KIND_CLIENT")]
    Client,
    #[serde(alias = "PRODUCER", alias = "SPAN_KIND_PRODUCER")]
    Producer,
    #[serde(alias = "CONSUMER", alias = "SPAN_KIND_CONSUMER")]
    Consumer,
}

impl SpanKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Internal => "internal",
            Self::Server => "server",
            Self::Client => "client",
            Self::Producer => "producer",
            Self::Consumer => "consumer",
        }
    }

    /// Map an OTLP protobuf enum value. Unspecified and unknown are internal.
    pub fn from_otlp(value: i32) -> Self {
        match value {
            2 => Self::Server,
            3 => Self::Client,
            4 => Self::Producer,
            5 => Self::Consumer,
            _ => Self::Internal,
        }
    }
}

/// OTLP status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StatusCode {
    #[default]
    #[serde(alias = "UNSET", alias = "STATUS_CODE_UNSET")]
    Unset,
    #[serde(alias = "OK", alias = "STATUS_CODE_OK")]
    Ok,
    #[serde(alias = "ERROR", alias = "STATUS_CODE_ERROR")]
    Error,
}

impl StatusCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unset => "unset",
            Self::Ok => "ok",
            Self::Error => "error",
        }
    }

    pub fn from_otlp(value: i32) -> Self {
        match value {
            1 => Self::Ok,
            2 => Self::Error,
            _ => Self::Unset,
        }
    }
}

// ============================================================================
// CLASSIFICATION ENUMS
// ============================================================================

/// Trace-level classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceType {
    Invocation,
    Annotation,
}

impl TraceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invocation => "invocation",
            Self::Annotation => "annotation",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "invocation" => Some(Self::Invocation),
            "annotation" => Some(Self::Annotation),
            _ => None,
        }
    }
}

/// Span-level classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanType {
    Agent,
    Workflow,
    Chain,
    Task,
    Tool,
    Embedding,
    Query,
    Completion,
    Chat,
    Rerank,
    Guardrail,
    Evaluator,
    Unknown,
}

impl SpanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Workflow => "workflow",
            Self::Chain => "chain",
            Self::Task => "task",
            Self::Tool => "tool",
            Self::Embedding => "embedding",
            Self::Query => "query",
            Self::Completion => "completion",
            Self::Chat => "chat",
            Self::Rerank => "rerank",
            Self::Guardrail => "guardrail",
            Self::Evaluator => "evaluator",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a canonical span type name (case-insensitive).
    pub fn parse(value: &str) -> Option<Self> {
        let parsed = match value.trim().to_ascii_lowercase().as_str() {
            "agent" => Self::Agent,
            "workflow" => Self::Workflow,
            "chain" => Self::Chain,
            "task" => Self::Task,
            "tool" => Self::Tool,
            "embedding" => Self::Embedding,
            "query" => Self::Query,
            "completion" => Self::Completion,
            "chat" => Self::Chat,
            "rerank" => Self::Rerank,
            "guardrail" => Self::Guardrail,
            "evaluator" => Self::Evaluator,
            "unknown" => Self::Unknown,
            _ => return None,
        };
        Some(parsed)
    }
}

// ============================================================================
// FEATURE GROUPS
// ============================================================================

/// Top-level buckets canonical attributes are routed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureGroup {
    Data,
    Metrics,
    Meta,
    Refs,
    Tags,
    Type,
}

impl FeatureGroup {
    pub const ALL: [FeatureGroup; 6] = [
        Self::Data,
        Self::Metrics,
        Self::Meta,
        Self::Refs,
        Self::Tags,
        Self::Type,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::Metrics => "metrics",
            Self::Meta => "meta",
            Self::Refs => "refs",
            Self::Tags => "tags",
            Self::Type => "type",
        }
    }

    /// Split a canonical key (`ag.<group>.<path>`) into its group and path.
    /// The path is empty when the key names the group itself.
    pub fn split_key(key: &str) -> Option<(Self, &str)> {
        let rest = key.strip_prefix(super::CANONICAL_PREFIX)?;
        let (group, path) = rest.split_once('.').unwrap_or((rest, ""));
        let group = Self::ALL.into_iter().find(|g| g.as_str() == group)?;
        Some((group, path))
    }
}
