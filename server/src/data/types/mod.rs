//! Shared data types
//!
//! Raw spans as received, their canonical normalized form, aggregation
//! nodes and query shapes.

mod canonical;
mod enums;
mod query;
mod raw;

/// Root of the canonical attribute namespace.
pub const CANONICAL_PREFIX: &str = "ag.";

// Re-export enum types
pub use enums::{FeatureGroup, SpanKind, SpanType, StatusCode, TraceType};

// Re-export raw (ingestion input) types
pub use raw::{RawEvent, RawLink, RawSpan};

// Re-export canonical types
pub use canonical::{
    Accumulated, CanonicalAttributes, ExceptionRecord, LinkRecord, MODEL_META_PATHS, SpanNode,
    SpanTypes, TokenUsage, metric_paths,
};

// Re-export query types
pub use query::{
    Bucket, Focus, Grouping, QueryOutput, QueryRequest, SortOrder, TraceView, Windowing,
};
