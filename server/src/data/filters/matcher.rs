//! In-memory evaluation of parsed filter expressions

use std::cmp::Ordering;

use serde_json::Value as JsonValue;

use super::types::{Condition, FilterExpr, FilterField, FilterOp, GroupOp};
use crate::data::types::{CanonicalAttributes, FeatureGroup, SpanNode};
use crate::utils::json::get_path;

impl FilterExpr {
    pub fn matches(&self, node: &SpanNode) -> bool {
        self.matches_span(&node.span)
    }

    pub fn matches_span(&self, span: &CanonicalAttributes) -> bool {
        match self {
            FilterExpr::Group {
                operator,
                conditions,
            } => match operator {
                GroupOp::And => conditions.iter().all(|c| c.matches_span(span)),
                GroupOp::Or => conditions.iter().any(|c| c.matches_span(span)),
                GroupOp::Not => !conditions.iter().all(|c| c.matches_span(span)),
            },
            FilterExpr::Condition(condition) => condition.matches_span(span),
        }
    }
}

impl Condition {
    fn matches_span(&self, span: &CanonicalAttributes) -> bool {
        let actual = resolve(self.field, self.key.as_deref(), span).filter(|v| !v.is_null());

        let Some(actual) = actual else {
            return matches!(
                self.operator,
                FilterOp::NotExists | FilterOp::IsNot | FilterOp::NotIn
            );
        };
        let Some(expected) = self.value.as_ref() else {
            return self.operator == FilterOp::Exists;
        };

        match self.operator {
            FilterOp::Exists => true,
            FilterOp::NotExists => false,
            FilterOp::Is => values_equal(&actual, expected),
            FilterOp::IsNot => !values_equal(&actual, expected),
            FilterOp::In => in_list(&actual, expected),
            FilterOp::NotIn => !in_list(&actual, expected),
            FilterOp::Contains => match (&actual, expected) {
                (JsonValue::String(a), JsonValue::String(e)) => a.contains(e.as_str()),
                (JsonValue::Array(items), e) => items.iter().any(|item| values_equal(item, e)),
                _ => false,
            },
            FilterOp::Startswith => text_pair(&actual, expected).is_some_and(|(a, e)| a.starts_with(e)),
            FilterOp::Endswith => text_pair(&actual, expected).is_some_and(|(a, e)| a.ends_with(e)),
            FilterOp::Gt => compare(&actual, expected) == Some(Ordering::Greater),
            FilterOp::Gte => matches!(
                compare(&actual, expected),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FilterOp::Lt => compare(&actual, expected) == Some(Ordering::Less),
            FilterOp::Lte => matches!(
                compare(&actual, expected),
                Some(Ordering::Less | Ordering::Equal)
            ),
        }
    }
}

/// Field value of a span. Timestamps resolve to epoch nanoseconds.
fn resolve(field: FilterField, key: Option<&str>, span: &CanonicalAttributes) -> Option<JsonValue> {
    match field {
        FilterField::TraceId => Some(JsonValue::from(span.trace_id.as_str())),
        FilterField::SpanId => Some(JsonValue::from(span.span_id.as_str())),
        FilterField::ParentId => span.parent_id.as_deref().map(JsonValue::from),
        FilterField::SpanName => Some(JsonValue::from(span.span_name.as_str())),
        FilterField::SpanKind => Some(JsonValue::from(span.span_kind.as_str())),
        FilterField::StatusCode => Some(JsonValue::from(span.status_code.as_str())),
        FilterField::StartTime => span.start_time.timestamp_nanos_opt().map(JsonValue::from),
        FilterField::EndTime => span.end_time.timestamp_nanos_opt().map(JsonValue::from),
        FilterField::Attributes => attribute(span, key?),
    }
}

fn attribute(span: &CanonicalAttributes, key: &str) -> Option<JsonValue> {
    let Some((group, path)) = FeatureGroup::split_key(key) else {
        // exception and links only exist in wire form
        return span.to_wire().get(key).cloned();
    };
    let values = match group {
        FeatureGroup::Type => {
            return match path {
                "span" => span.types.span.map(|t| JsonValue::from(t.as_str())),
                "trace" => span.types.trace.map(|t| JsonValue::from(t.as_str())),
                _ => None,
            };
        }
        FeatureGroup::Data => &span.data,
        FeatureGroup::Metrics => &span.metrics,
        FeatureGroup::Meta => &span.meta,
        FeatureGroup::Refs => &span.refs,
        FeatureGroup::Tags => &span.tags,
    };
    if path.is_empty() {
        return (!values.is_empty()).then(|| JsonValue::Object(values.clone()));
    }
    get_path(values, path).cloned()
}

fn values_equal(actual: &JsonValue, expected: &JsonValue) -> bool {
    compare(actual, expected) == Some(Ordering::Equal) || actual == expected
}

fn in_list(actual: &JsonValue, expected: &JsonValue) -> bool {
    expected
        .as_array()
        .is_some_and(|items| items.iter().any(|item| values_equal(actual, item)))
}

fn text_pair<'a>(actual: &'a JsonValue, expected: &'a JsonValue) -> Option<(&'a str, &'a str)> {
    Some((actual.as_str()?, expected.as_str()?))
}

/// Numbers compare numerically, strings lexicographically; mixed types are
/// unordered.
fn compare(actual: &JsonValue, expected: &JsonValue) -> Option<Ordering> {
    match (actual, expected) {
        (JsonValue::Number(a), JsonValue::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
        },
        (JsonValue::String(a), JsonValue::String(b)) => Some(a.cmp(b)),
        (JsonValue::Bool(a), JsonValue::Bool(b)) if a == b => Some(Ordering::Equal),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::super::parse_filter;
    use super::*;
    use crate::domain::semconv::LATEST_VERSION;
    use crate::domain::traces::normalize::SpanNormalizer;
    use serde_json::json;

    fn span() -> SpanNode {
        let raw = serde_json::from_value(json!({
            "trace_id": "trace-1",
            "span_id": "span-1",
            "parent_id": "span-0",
            "kind": "client",
            "name": "openai.chat",
            "start_time": "2024-03-01T12:00:00Z",
            "end_time": "2024-03-01T12:00:02Z",
            "status_code": "error",
            "attributes": {
                "gen_ai.request.model": "gpt-4o",
                "gen_ai.usage.input_tokens": 120,
                "openinference.span.kind": "LLM",
                "ag.tags.labels": ["prod", "beta"]
            },
            "events": [{"name": "exception", "attributes": {"exception.type": "Timeout"}}]
        }))
        .unwrap();
        let normalizer = SpanNormalizer::for_version(LATEST_VERSION).unwrap();
        SpanNode::from(normalizer.normalize(&raw))
    }

    fn check(filter: JsonValue) -> bool {
        parse_filter(&filter).unwrap().matches(&span())
    }

    #[test]
    fn test_structural_fields() {
        assert!(check(json!({"field": "span_name", "operator": "startswith", "value": "openai"})));
        assert!(check(json!({"field": "span_kind", "operator": "is", "value": "SPAN_KIND_CLIENT"})));
        assert!(check(json!({"field": "status_code", "operator": "in", "value": ["error", "ok"]})));
        assert!(check(json!({"field": "parent_id", "operator": "exists"})));
        assert!(!check(json!({"field": "trace_id", "operator": "is_not", "value": "trace-1"})));
    }

    #[test]
    fn test_timestamps() {
        assert!(check(json!({"field": "start_time", "operator": "gte", "value": "2024-03-01T12:00:00Z"})));
        assert!(check(json!({"field": "end_time", "operator": "lt", "value": "2024-03-01T12:00:03"})));
        assert!(!check(json!({"field": "start_time", "operator": "gt", "value": "2024-03-01T12:00:00Z"})));
    }

    #[test]
    fn test_attributes() {
        let attr = |key: &str, operator: &str, value: JsonValue| {
            check(json!({"field": "attributes", "key": key, "operator": operator, "value": value}))
        };
        assert!(attr("ag.meta.request.model", "is", json!("gpt-4o")));
        assert!(attr("ag.metrics.tokens.incremental.prompt", "gt", json!(100)));
        assert!(attr("ag.metrics.tokens.incremental.prompt", "lte", json!(120.0)));
        assert!(attr("ag.type.span", "is", json!("chat")));
        assert!(attr("ag.tags.labels", "contains", json!("beta")));
        assert!(attr("ag.exception.type", "is", json!("Timeout")));
        assert!(!attr("ag.meta.request.model", "endswith", json!("mini")));
    }

    #[test]
    fn test_missing_attribute() {
        let missing = |operator: &str| {
            let mut filter = json!({"field": "attributes", "key": "ag.refs.session.id", "operator": operator});
            if operator != "exists" && operator != "not_exists" {
                filter["value"] = json!("s");
            }
            check(filter)
        };
        assert!(missing("not_exists"));
        assert!(missing("is_not"));
        assert!(!missing("exists"));
        assert!(!missing("is"));
        assert!(!missing("gt"));
    }

    #[test]
    fn test_groups() {
        assert!(check(json!({
            "operator": "and",
            "conditions": [
                {"field": "status_code", "operator": "is", "value": "error"},
                {"operator": "or", "conditions": [
                    {"field": "span_name", "operator": "is", "value": "nope"},
                    {"field": "attributes", "key": "ag.meta", "operator": "exists"}
                ]}
            ]
        })));
        assert!(!check(json!({
            "operator": "not",
            "conditions": [{"field": "span_id", "operator": "is", "value": "span-1"}]
        })));
        assert!(check(json!({"operator": "and", "conditions": []})));
        assert!(!check(json!({"operator": "or", "conditions": []})));
    }
}
