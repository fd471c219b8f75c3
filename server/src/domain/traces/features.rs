//! Per-span feature accumulator
//!
//! One `SpanFeatures` is created per span and passed by reference through
//! the adapter chain. Adapters hand it canonical `(key, value)` pairs and it
//! routes each pair into its feature group by namespace prefix.

use serde_json::{Map, Number, Value as JsonValue};

use crate::data::types::{FeatureGroup, SpanType, SpanTypes, TraceType};
use crate::utils::json::{decode_json_string, flatten_into, unflatten};

/// Groups are kept flat (dotted paths relative to the group) while adapters
/// write, and unflattened once at the end.
#[derive(Debug, Default)]
pub struct SpanFeatures {
    data: Map<String, JsonValue>,
    metrics: Map<String, JsonValue>,
    meta: Map<String, JsonValue>,
    refs: Map<String, JsonValue>,
    tags: Map<String, JsonValue>,
    types: SpanTypes,
    dropped: usize,
}

/// Nested feature groups produced by [`SpanFeatures::finish`].
#[derive(Debug, Default)]
pub struct FeatureGroups {
    pub data: Map<String, JsonValue>,
    pub metrics: Map<String, JsonValue>,
    pub meta: Map<String, JsonValue>,
    pub refs: Map<String, JsonValue>,
    pub tags: Map<String, JsonValue>,
    pub types: SpanTypes,
}

impl SpanFeatures {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route one canonical attribute into its group. Malformed values are
    /// dropped and logged.
    pub fn absorb(&mut self, key: &str, value: JsonValue) {
        let Some((group, path)) = FeatureGroup::split_key(key) else {
            tracing::debug!(key, "Dropping attribute outside canonical feature groups");
            self.dropped += 1;
            return;
        };

        let accepted = match group {
            FeatureGroup::Data => match &value {
                JsonValue::String(s) => match decode_json_string(s) {
                    Some(decoded) => insert_group(&mut self.data, path, &decoded),
                    None => insert_group(&mut self.data, path, &value),
                },
                _ => insert_group(&mut self.data, path, &value),
            },
            FeatureGroup::Metrics => self.absorb_metrics(key, path, &value),
            FeatureGroup::Meta => insert_group(&mut self.meta, path, &value),
            FeatureGroup::Refs => insert_group(&mut self.refs, path, &value),
            FeatureGroup::Tags => insert_group(&mut self.tags, path, &value),
            FeatureGroup::Type => self.absorb_type(path, &value),
        };

        if !accepted {
            tracing::warn!(key, value = %value, "Dropping malformed attribute");
            self.dropped += 1;
        }
    }

    /// Number of attributes dropped so far.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn finish(self) -> FeatureGroups {
        FeatureGroups {
            data: unflatten(&self.data),
            metrics: unflatten(&self.metrics),
            meta: unflatten(&self.meta),
            refs: unflatten(&self.refs),
            tags: unflatten(&self.tags),
            types: self.types,
        }
    }

    fn absorb_metrics(&mut self, key: &str, path: &str, value: &JsonValue) -> bool {
        let mut leaves = Map::new();
        if !insert_group(&mut leaves, path, value) {
            return false;
        }
        // Numeric leaves are kept even when a sibling is rejected
        let mut accepted = true;
        for (leaf, raw) in leaves {
            match coerce_number(&raw) {
                Some(number) => {
                    self.metrics.insert(leaf, number);
                }
                None => {
                    tracing::debug!(key, metric = %leaf, "Non-numeric metric leaf");
                    accepted = false;
                }
            }
        }
        accepted
    }

    fn absorb_type(&mut self, path: &str, value: &JsonValue) -> bool {
        let Some(raw) = value.as_str() else {
            return false;
        };
        match path {
            "trace" => TraceType::parse(raw).map(|t| self.types.trace = Some(t)).is_some(),
            "span" => SpanType::parse(raw).map(|t| self.types.span = Some(t)).is_some(),
            _ => false,
        }
    }
}

/// Flatten `value` under `path` into a group. A bare group key only
/// accepts an object, whose fields become top-level paths.
fn insert_group(target: &mut Map<String, JsonValue>, path: &str, value: &JsonValue) -> bool {
    if !path.is_empty() {
        flatten_into(target, path, value);
        return true;
    }
    match value {
        JsonValue::Object(fields) => {
            for (field, child) in fields {
                flatten_into(target, field, child);
            }
            true
        }
        _ => false,
    }
}

/// Numbers pass through; numeric strings are parsed, integers preferred.
fn coerce_number(value: &JsonValue) -> Option<JsonValue> {
    match value {
        JsonValue::Number(_) => Some(value.clone()),
        JsonValue::String(s) => {
            let s = s.trim();
            if let Ok(int) = s.parse::<u64>() {
                return Some(JsonValue::Number(int.into()));
            }
            if let Ok(int) = s.parse::<i64>() {
                return Some(JsonValue::Number(int.into()));
            }
            s.parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(JsonValue::Number)
        }
        _ => None,
    }
}
