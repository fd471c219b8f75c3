//! Span normalization
//!
//! `RawSpan` → `CanonicalAttributes`. Structural fields are copied, the
//! attribute bag runs through the adapter chain, the first `exception`
//! event becomes the exception record and links are copied as-is.

use serde_json::{Map, Value as JsonValue};

use super::adapters::{SpanAdapter, default_chain};
use super::features::SpanFeatures;
use crate::data::types::{CanonicalAttributes, ExceptionRecord, LinkRecord, RawEvent, RawSpan};
use crate::domain::semconv::{SemconvCodex, SemconvError, codex};

/// Reserved event name carrying error details.
pub const EXCEPTION_EVENT: &str = "exception";

const TYPE_FIELDS: &[&str] = &["exception.type", "type"];
const MESSAGE_FIELDS: &[&str] = &["exception.message", "message"];
const STACKTRACE_FIELDS: &[&str] = &["exception.stacktrace", "stacktrace"];

pub struct SpanNormalizer {
    adapters: Vec<Box<dyn SpanAdapter>>,
    version: &'static str,
}

impl SpanNormalizer {
    pub fn new(codex: &'static SemconvCodex) -> Self {
        let adapters = default_chain(codex);
        tracing::trace!(
            version = codex.version(),
            adapters = ?adapters.iter().map(|a| a.name()).collect::<Vec<_>>(),
            "Built adapter chain"
        );
        Self {
            adapters,
            version: codex.version(),
        }
    }

    /// Normalizer for a specific semconv table version.
    pub fn for_version(version: &str) -> Result<Self, SemconvError> {
        Ok(Self::new(codex(version)?))
    }

    pub fn version(&self) -> &'static str {
        self.version
    }

    pub fn normalize(&self, raw: &RawSpan) -> CanonicalAttributes {
        let mut features = SpanFeatures::new();
        for adapter in &self.adapters {
            adapter.process(raw, &mut features);
        }
        if features.dropped() > 0 {
            tracing::debug!(
                span_id = %raw.span_id,
                dropped = features.dropped(),
                "Normalized span with dropped attributes"
            );
        }
        let groups = features.finish();

        CanonicalAttributes {
            trace_id: raw.trace_id.clone(),
            span_id: raw.span_id.clone(),
            parent_id: raw.parent().map(str::to_string),
            span_kind: raw.span_kind,
            span_name: raw.span_name.clone(),
            start_time: raw.start_time,
            end_time: raw.end_time.unwrap_or(raw.start_time),
            status_code: raw.status_code,
            status_message: raw.status_message.clone(),
            types: groups.types,
            data: groups.data,
            metrics: groups.metrics,
            meta: groups.meta,
            refs: groups.refs,
            tags: groups.tags,
            exception: extract_exception(raw),
            links: raw
                .links
                .iter()
                .map(|link| LinkRecord {
                    trace_id: link.trace_id.clone(),
                    span_id: link.span_id.clone(),
                    attributes: link.attributes.clone(),
                })
                .collect(),
        }
    }

    pub fn normalize_batch(&self, raws: &[RawSpan]) -> Vec<CanonicalAttributes> {
        raws.iter().map(|raw| self.normalize(raw)).collect()
    }
}

fn extract_exception(raw: &RawSpan) -> Option<ExceptionRecord> {
    let mut exceptions = raw.events.iter().filter(|e| e.name == EXCEPTION_EVENT);
    let first = exceptions.next()?;
    let ignored = exceptions.count();
    if ignored > 0 {
        tracing::debug!(span_id = %raw.span_id, ignored, "Ignoring additional exception events");
    }
    Some(exception_record(first))
}

fn exception_record(event: &RawEvent) -> ExceptionRecord {
    let mut attributes: Map<String, JsonValue> = event.attributes.clone();
    ExceptionRecord {
        kind: take_field(&mut attributes, TYPE_FIELDS),
        message: take_field(&mut attributes, MESSAGE_FIELDS),
        stacktrace: take_field(&mut attributes, STACKTRACE_FIELDS),
        timestamp: event.timestamp,
        attributes,
    }
}

/// Remove every alias of a well-known field, returning the first present.
fn take_field(attributes: &mut Map<String, JsonValue>, aliases: &[&str]) -> Option<String> {
    let mut found = None;
    for alias in aliases {
        if let Some(value) = attributes.remove(*alias)
            && found.is_none()
        {
            found = Some(match value {
                JsonValue::String(s) => s,
                other => other.to_string(),
            });
        }
    }
    found
}

#[cfg(test)]
#[path = "normalize_tests.rs"]
mod tests;
