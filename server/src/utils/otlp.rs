//! OTLP utility functions
//!
//! Converts OTLP protobuf trace exports into `RawSpan` envelopes:
//! - Attribute conversion preserving native JSON types
//! - Hex encoding of trace/span ids
//! - Status and kind mapping

use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::common::v1::{AnyValue, KeyValue, any_value};
use opentelemetry_proto::tonic::trace::v1::{Span, span};
use prost::Message;
use serde_json::{Map, Value as JsonValue};

use crate::data::types::{RawEvent, RawLink, RawSpan, SpanKind, StatusCode};
use crate::utils::time::nanos_to_datetime;

// ============================================================================
// DECODING
// ============================================================================

/// Decode a protobuf-encoded `ExportTraceServiceRequest`.
pub fn decode_trace_request(bytes: &[u8]) -> Result<ExportTraceServiceRequest, prost::DecodeError> {
    ExportTraceServiceRequest::decode(bytes)
}

/// Flatten every span of an export request into raw envelopes, in the
/// order they appear in the request.
pub fn raw_spans_from_request(request: &ExportTraceServiceRequest) -> Vec<RawSpan> {
    request
        .resource_spans
        .iter()
        .flat_map(|rs| rs.scope_spans.iter())
        .flat_map(|ss| ss.spans.iter())
        .map(raw_span_from_otlp)
        .collect()
}

fn raw_span_from_otlp(span: &Span) -> RawSpan {
    let (status_code, status_message) = match &span.status {
        Some(status) => (
            StatusCode::from_otlp(status.code),
            Some(status.message.clone()).filter(|m| !m.is_empty()),
        ),
        None => (StatusCode::Unset, None),
    };
    let end_time =
        (span.end_time_unix_nano > 0).then(|| nanos_to_datetime(span.end_time_unix_nano));

    RawSpan {
        trace_id: hex::encode(&span.trace_id),
        span_id: hex::encode(&span.span_id),
        parent_id: (!span.parent_span_id.is_empty()).then(|| hex::encode(&span.parent_span_id)),
        span_kind: SpanKind::from_otlp(span.kind),
        span_name: span.name.clone(),
        start_time: nanos_to_datetime(span.start_time_unix_nano),
        end_time,
        status_code,
        status_message,
        attributes: build_attributes_map(&span.attributes),
        events: span.events.iter().map(raw_event_from_otlp).collect(),
        links: span.links.iter().map(raw_link_from_otlp).collect(),
    }
}

fn raw_event_from_otlp(event: &span::Event) -> RawEvent {
    RawEvent {
        name: event.name.clone(),
        timestamp: (event.time_unix_nano > 0).then(|| nanos_to_datetime(event.time_unix_nano)),
        attributes: build_attributes_map(&event.attributes),
    }
}

fn raw_link_from_otlp(link: &span::Link) -> RawLink {
    RawLink {
        trace_id: hex::encode(&link.trace_id),
        span_id: hex::encode(&link.span_id),
        attributes: build_attributes_map(&link.attributes),
    }
}

// ============================================================================
// JSON-PRESERVING ATTRIBUTE EXTRACTION
// ============================================================================

/// Convert AnyValue to JSON value (preserves native types)
pub fn any_value_to_json(value: &AnyValue) -> JsonValue {
    match &value.value {
        Some(any_value::Value::StringValue(s)) => serde_json::json!(s),
        Some(any_value::Value::BoolValue(b)) => serde_json::json!(b),
        Some(any_value::Value::IntValue(i)) => serde_json::json!(i),
        Some(any_value::Value::DoubleValue(d)) => serde_json::json!(d),
        Some(any_value::Value::ArrayValue(arr)) => {
            serde_json::json!(arr.values.iter().map(any_value_to_json).collect::<Vec<_>>())
        }
        Some(any_value::Value::KvlistValue(kvlist)) => {
            JsonValue::Object(build_attributes_map(&kvlist.values))
        }
        Some(any_value::Value::BytesValue(b)) => serde_json::json!(hex::encode(b)),
        None => JsonValue::Null,
    }
}

/// Build a JSON object from raw KeyValue attributes (preserves types)
pub fn build_attributes_map(attrs: &[KeyValue]) -> Map<String, JsonValue> {
    attrs
        .iter()
        .filter_map(|kv| {
            kv.value
                .as_ref()
                .map(|v| (kv.key.clone(), any_value_to_json(v)))
        })
        .collect()
}
